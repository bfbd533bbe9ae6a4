//! Best-effort coercion of user input into a field kind's canonical value.

use super::field::{FieldDefinition, FieldKind, is_valid_month_day, parse_bool};
use crate::core::Value;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot use '{input}' for {field} ({kind}): {reason}")]
pub struct Unmassageable {
    pub field: String,
    pub kind: String,
    pub input: String,
    pub reason: String,
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const MONTHS: &[&str] = &[
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Parses the date spellings users commonly type, plus RFC 3339 timestamps.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

fn month_number(token: &str) -> Option<i64> {
    let token = token.trim_end_matches('.').to_ascii_lowercase();
    if token.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(&token))
        .map(|i| i as i64 + 1)
}

fn day_number(token: &str) -> Option<i64> {
    let digits = token
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim_end_matches('.');
    digits.parse::<i64>().ok()
}

/// Combines month and day into `MMDD` when both are in range.
fn month_day(month: i64, day: i64) -> Option<i64> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let mmdd = month * 100 + day;
    is_valid_month_day(mmdd).then_some(mmdd)
}

/// Reads `M-D`, `M/D`, `January 26`, `26 Jan`, an `MMDD` integer or any
/// full date into the `MMDD` encoding.
pub fn parse_month_day(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(mmdd) = text.parse::<i64>() {
        return is_valid_month_day(mmdd).then_some(mmdd);
    }

    for separator in ['-', '/'] {
        let parts: Vec<&str> = text.split(separator).collect();
        if let [month, day] = parts.as_slice() {
            if let (Ok(month), Ok(day)) = (month.trim().parse::<i64>(), day.trim().parse::<i64>()) {
                return month_day(month, day);
            }
        }
    }

    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() == 2 {
        let named = month_number(tokens[0])
            .zip(day_number(tokens[1]))
            .or_else(|| month_number(tokens[1]).zip(day_number(tokens[0])));
        if let Some((month, day)) = named {
            return month_day(month, day);
        }
    }

    parse_date(text).map(|d| d.month() as i64 * 100 + d.day() as i64)
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(_) => value.as_i64(),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(|f| Value::Float(f).as_i64()))
        }
        _ => None,
    }
}

fn split_list(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            item.strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .or_else(|| item.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')))
                .unwrap_or(item)
                .to_string()
        })
        .collect()
}

impl FieldKind {
    /// Coerces `input` into this kind's canonical value. `None` means the
    /// input cannot reasonably be read as this kind.
    pub fn massage_value(&self, input: &Value) -> Option<Value> {
        if input.is_null() {
            return Some(Value::Null);
        }

        match self {
            FieldKind::Text { .. } => {
                let text = Value::Text(input.to_literal());
                self.check(&text).then_some(text)
            }
            FieldKind::Email | FieldKind::Uri { .. } => {
                let text = Value::Text(input.to_literal().trim().to_string());
                self.check(&text).then_some(text)
            }
            FieldKind::Boolean => match input {
                Value::Boolean(_) => Some(input.clone()),
                other => parse_bool(&other.to_literal()).map(Value::Boolean),
            },
            FieldKind::Integer => parse_integer(input).map(Value::Integer),
            FieldKind::Increment { .. } => parse_integer(input)
                .filter(|i| *i >= 0)
                .map(Value::Integer),
            FieldKind::Number => match input {
                Value::Integer(i) => Some(Value::Float(*i as f64)),
                Value::Float(_) => Some(input.clone()),
                other => other.to_literal().trim().parse::<f64>().ok().map(Value::Float),
            },
            FieldKind::Date => match input {
                Value::Date(_) => Some(input.clone()),
                other => parse_date(&other.to_literal()).map(Value::Date),
            },
            FieldKind::MonthDay => match input {
                Value::Date(d) => Some(Value::Integer(d.month() as i64 * 100 + d.day() as i64)),
                Value::Integer(i) => is_valid_month_day(*i).then_some(Value::Integer(*i)),
                other => parse_month_day(&other.to_literal()).map(Value::Integer),
            },
            FieldKind::Enum { values } => {
                if self.check(input) {
                    let literal = input.to_literal();
                    return values
                        .iter()
                        .find(|v| *v == input || v.to_literal() == literal)
                        .cloned()
                        .or_else(|| Some(input.clone()));
                }
                let literal = input.to_literal();
                let trimmed = literal.trim();
                values
                    .iter()
                    .find(|v| v.to_literal() == trimmed)
                    .or_else(|| {
                        values
                            .iter()
                            .find(|v| v.to_literal().eq_ignore_ascii_case(trimmed))
                    })
                    .cloned()
            }
            FieldKind::Array { items, .. } => {
                let raw: Vec<Value> = match input {
                    Value::Array(elements) => return Some(Value::Array(elements.clone())),
                    Value::Text(s) => split_list(s).into_iter().map(Value::Text).collect(),
                    other => vec![other.clone()],
                };
                match items {
                    Some(kind) => raw
                        .iter()
                        .map(|item| kind.massage_value(item))
                        .collect::<Option<Vec<_>>>()
                        .map(Value::Array),
                    None => Some(Value::Array(raw)),
                }
            }
            FieldKind::Ref { .. } | FieldKind::SchemaRef => {
                Some(Value::Text(input.to_literal().trim().to_string()))
            }
            FieldKind::Calculated { .. } => Some(input.clone()),
        }
    }
}

impl FieldDefinition {
    /// Coerces user input for this field; empty input becomes `Null`.
    pub fn massage(&self, input: &Value) -> Result<Value, Unmassageable> {
        if input.is_empty() {
            return Ok(Value::Null);
        }
        self.kind.massage_value(input).ok_or_else(|| Unmassageable {
            field: self.name.clone(),
            kind: self.kind.describe(false),
            input: input.to_literal(),
            reason: format!("not a valid {}", self.kind.describe(true)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: FieldKind) -> FieldDefinition {
        FieldDefinition::new("F", kind)
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 26);
        for text in ["2024-01-26", "01/26/2024", "January 26, 2024", "26 Jan 2024", "2024-01-26T08:30:00"] {
            assert_eq!(parse_date(text), expected, "{}", text);
        }
        assert_eq!(parse_date("someday"), None);
    }

    #[test]
    fn test_parse_month_day_spellings() {
        for text in ["1/26", "1-26", "January 26", "jan 26th", "26 Jan", "0126", "2024-01-26"] {
            assert_eq!(parse_month_day(text), Some(126), "{}", text);
        }
        assert_eq!(parse_month_day("2/30"), None);
        assert_eq!(parse_month_day("Feb 29"), Some(229));
    }

    #[test]
    fn test_month_day_out_of_range_parts() {
        assert_eq!(parse_month_day("Jan 9223372036854775807"), None);
        assert_eq!(parse_month_day("9223372036854775807/1"), None);
        assert_eq!(parse_month_day("2-101"), None);
        assert_eq!(parse_month_day("-1/5"), None);

        let field = FieldDefinition::new("Birthday", FieldKind::MonthDay);
        assert!(field.massage(&Value::from("Jan 9223372036854775807")).is_err());
    }

    #[test]
    fn test_reasonable_literals_massage_to_valid_values() {
        let cases = vec![
            (FieldKind::text(), "hello"),
            (FieldKind::Integer, "42"),
            (FieldKind::Number, "2.5"),
            (FieldKind::Boolean, "TRUE"),
            (FieldKind::Email, " a@b.com "),
            (FieldKind::uri(), "https://example.com/x"),
            (FieldKind::Date, "2024-03-01"),
            (FieldKind::MonthDay, "1/26"),
            (FieldKind::increment(), "7"),
            (FieldKind::enumeration(["a", "b", "c"]), "b"),
            (FieldKind::array(), "a,b,c"),
            (FieldKind::array_of(FieldKind::Integer), "[1, 2, 3]"),
        ];
        for (kind, input) in cases {
            let definition = field(kind);
            let massaged = definition.massage(&Value::from(input)).unwrap();
            assert!(definition.check(&massaged), "{:?} from {}", definition.kind, input);
        }
    }

    #[test]
    fn test_integer_widths() {
        let f = field(FieldKind::Integer);
        assert_eq!(f.massage(&Value::from("42")).unwrap(), Value::Integer(42));
        assert_eq!(f.massage(&Value::from("42.0")).unwrap(), Value::Integer(42));
        assert_eq!(f.massage(&Value::Float(3.0)).unwrap(), Value::Integer(3));
        assert!(f.massage(&Value::from("forty")).is_err());
        assert!(f.massage(&Value::Float(3.5)).is_err());
    }

    #[test]
    fn test_array_splitting() {
        let f = field(FieldKind::array());
        assert_eq!(
            f.massage(&Value::from(r#"["x", 'y', z]"#)).unwrap(),
            Value::Array(vec![Value::from("x"), Value::from("y"), Value::from("z")])
        );
        let native = Value::Array(vec![Value::Integer(1)]);
        assert_eq!(f.massage(&native).unwrap(), native);
        assert_eq!(f.massage(&Value::from("[]")).unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn test_enum_maps_onto_declared_value() {
        let numeric = field(FieldKind::enumeration([1, 2, 3]));
        assert_eq!(numeric.massage(&Value::from("2")).unwrap(), Value::Integer(2));
        assert!(numeric.massage(&Value::from("9")).is_err());

        let words = field(FieldKind::enumeration(["Open", "Closed"]));
        assert_eq!(words.massage(&Value::from("closed")).unwrap(), Value::from("Closed"));
    }

    #[test]
    fn test_uncoercible_kinds_revalidate() {
        let email = field(FieldKind::Email);
        let err = email.massage(&Value::from("nope")).unwrap_err();
        assert_eq!(err.field, "F");
        assert!(field(FieldKind::Boolean).massage(&Value::from("maybe")).is_err());
    }

    #[test]
    fn test_references_pass_through_trimmed() {
        let f = field(FieldKind::SchemaRef);
        assert_eq!(f.massage(&Value::from("  Person ")).unwrap(), Value::from("Person"));
    }
}
