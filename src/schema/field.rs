use super::pattern::is_match as matches_pattern;
use crate::core::{Result, ThingError, Value};
use crate::formula::Formula;
use crate::storage::Stores;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use url::Url;
use uuid::Uuid;

/// Enforced by `Uri` fields that declare no pattern of their own.
pub const DEFAULT_URI_PATTERN: &str = r"^(https?|ftp)://";

lazy_static! {
    static ref ADDR_SPEC: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$"
    )
    .expect("address pattern compiles");
    static ref NAMED_MAILBOX: Regex =
        Regex::new(r"^[^<>]*<\s*([^<>\s]+)\s*>$").expect("mailbox pattern compiles");
}

/// The closed set of field kinds a schema may declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Integer,
    Number,
    Boolean,
    Email,
    Uri {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Date,
    /// Month and day encoded as the integer `MMDD`.
    MonthDay,
    Increment {
        next: u64,
    },
    Enum {
        values: Vec<Value>,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
        #[serde(default)]
        unique_items: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Box<FieldKind>>,
    },
    Ref {
        schema_id: Uuid,
    },
    SchemaRef,
    Calculated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula: Option<String>,
    },
}

impl FieldKind {
    pub fn text() -> Self {
        FieldKind::Text {
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    pub fn uri() -> Self {
        FieldKind::Uri { pattern: None }
    }

    pub fn increment() -> Self {
        FieldKind::Increment { next: 1 }
    }

    pub fn enumeration<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FieldKind::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array() -> Self {
        FieldKind::Array {
            min_items: None,
            max_items: None,
            unique_items: false,
            items: None,
        }
    }

    pub fn array_of(items: FieldKind) -> Self {
        FieldKind::Array {
            min_items: None,
            max_items: None,
            unique_items: false,
            items: Some(Box::new(items)),
        }
    }

    pub fn reference(schema_id: Uuid) -> Self {
        FieldKind::Ref { schema_id }
    }

    pub fn calculated(formula: impl Into<String>) -> Self {
        FieldKind::Calculated {
            formula: Some(formula.into()),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Ref { .. } | FieldKind::SchemaRef)
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self, FieldKind::Calculated { .. })
    }

    /// Checks a present value against every rule that does not need storage.
    /// Reference kinds only check that the value reads as an id here.
    pub fn check(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text {
                min_length,
                max_length,
                pattern,
            } => {
                let text = value.to_literal();
                let length = text.chars().count();
                min_length.is_none_or(|min| length >= min)
                    && max_length.is_none_or(|max| length <= max)
                    && pattern.as_deref().is_none_or(|p| matches_pattern(p, &text))
            }
            FieldKind::Integer => value.to_literal().trim().parse::<i64>().is_ok(),
            FieldKind::Number => value.to_literal().trim().parse::<f64>().is_ok(),
            FieldKind::Boolean => match value {
                Value::Boolean(_) => true,
                other => parse_bool(&other.to_literal()).is_some(),
            },
            FieldKind::Email => is_mailbox(&value.to_literal()),
            FieldKind::Uri { pattern } => {
                let text = value.to_literal();
                Url::parse(text.trim()).is_ok()
                    && matches_pattern(
                        pattern.as_deref().unwrap_or(DEFAULT_URI_PATTERN),
                        text.trim(),
                    )
            }
            FieldKind::Date => match value {
                Value::Date(_) => true,
                Value::Text(s) => super::massage::parse_date(s).is_some(),
                _ => false,
            },
            FieldKind::MonthDay => value
                .to_literal()
                .trim()
                .parse::<i64>()
                .is_ok_and(is_valid_month_day),
            FieldKind::Increment { .. } => value.to_literal().trim().parse::<u64>().is_ok(),
            FieldKind::Enum { values } => enum_matches(values, value),
            FieldKind::Array {
                min_items,
                max_items,
                unique_items,
                items,
            } => {
                let Value::Array(elements) = value else {
                    return false;
                };
                if min_items.is_some_and(|min| elements.len() < min)
                    || max_items.is_some_and(|max| elements.len() > max)
                {
                    return false;
                }
                if *unique_items
                    && elements
                        .iter()
                        .enumerate()
                        .any(|(i, e)| elements[i + 1..].contains(e))
                {
                    return false;
                }
                match items {
                    Some(kind) => elements.iter().all(|e| e.is_empty() || kind.check(e)),
                    None => true,
                }
            }
            FieldKind::Ref { .. } | FieldKind::SchemaRef => as_id(value).is_some(),
            FieldKind::Calculated { formula } => formula_parses(formula.as_deref()),
        }
    }

    pub fn describe(&self, verbose: bool) -> String {
        match self {
            FieldKind::Text {
                min_length,
                max_length,
                pattern,
            } => {
                let mut parts = Vec::new();
                if verbose {
                    if let Some(min) = min_length {
                        parts.push(format!("min {}", min));
                    }
                    if let Some(max) = max_length {
                        parts.push(format!("max {}", max));
                    }
                    if let Some(p) = pattern {
                        parts.push(format!("pattern {}", p));
                    }
                }
                with_details("text", &parts)
            }
            FieldKind::Integer => "integer".to_string(),
            FieldKind::Number => "number".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Email => "email".to_string(),
            FieldKind::Uri { pattern } => match pattern {
                Some(p) if verbose => format!("uri (pattern {})", p),
                _ => "uri".to_string(),
            },
            FieldKind::Date => "date".to_string(),
            FieldKind::MonthDay => "month-day".to_string(),
            FieldKind::Increment { next } => {
                if verbose {
                    format!("increment (next={})", next)
                } else {
                    "increment".to_string()
                }
            }
            FieldKind::Enum { values } => {
                if verbose {
                    let literals: Vec<String> = values.iter().map(Value::to_literal).collect();
                    format!("enum [{}]", literals.join(","))
                } else {
                    "enum".to_string()
                }
            }
            FieldKind::Array {
                min_items,
                max_items,
                unique_items,
                items,
            } => {
                let base = match items {
                    Some(kind) if verbose => format!("array of {}", kind.describe(false)),
                    _ => "array".to_string(),
                };
                let mut parts = Vec::new();
                if verbose {
                    if let Some(min) = min_items {
                        parts.push(format!("min {}", min));
                    }
                    if let Some(max) = max_items {
                        parts.push(format!("max {}", max));
                    }
                    if *unique_items {
                        parts.push("unique".to_string());
                    }
                }
                with_details(&base, &parts)
            }
            FieldKind::Ref { schema_id } => {
                if verbose {
                    format!("ref to {}", schema_id)
                } else {
                    "ref".to_string()
                }
            }
            FieldKind::SchemaRef => "schema".to_string(),
            FieldKind::Calculated { formula } => match formula.as_deref() {
                Some(f) if verbose => format!("calculated: {}", f),
                _ => "calculated".to_string(),
            },
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe(false))
    }
}

fn with_details(base: &str, parts: &[String]) -> String {
    if parts.is_empty() {
        base.to_string()
    } else {
        format!("{} ({})", base, parts.join(", "))
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Storage-free validity: absent values are valid iff the field is
    /// optional, everything else is checked by the kind.
    pub fn check(&self, value: &Value) -> bool {
        if let FieldKind::Calculated { formula } = &self.kind {
            return formula_parses(formula.as_deref());
        }
        if value.is_empty() {
            return !self.required;
        }
        self.kind.check(value)
    }

    /// Full validity, including that referenced schemas and things exist.
    pub async fn validate(&self, value: &Value, stores: &Stores) -> bool {
        if !self.check(value) {
            return false;
        }
        if value.is_empty() {
            return true;
        }

        match &self.kind {
            FieldKind::Ref { schema_id } => {
                let Some(target) = as_id(value) else {
                    return false;
                };
                match stores.schemas.exists_by_id(*schema_id).await {
                    Ok(true) => {}
                    Ok(false) => return false,
                    Err(e) => {
                        warn!(field = %self.name, error = %e, "schema lookup failed during validation");
                        return false;
                    }
                }
                match stores.things.load(target).await {
                    Ok(Some(thing)) => thing.has_schema(*schema_id),
                    Ok(None) => false,
                    Err(e) => {
                        warn!(field = %self.name, error = %e, "thing lookup failed during validation");
                        false
                    }
                }
            }
            FieldKind::SchemaRef => {
                let Some(target) = as_id(value) else {
                    return false;
                };
                stores.schemas.exists_by_id(target).await.unwrap_or_else(|e| {
                    warn!(field = %self.name, error = %e, "schema lookup failed during validation");
                    false
                })
            }
            _ => true,
        }
    }

    pub fn describe(&self, verbose: bool) -> String {
        let kind = self.kind.describe(verbose);
        if verbose && self.required {
            format!("{}, required", kind)
        } else {
            kind
        }
    }

    /// Returns the next increment value and advances the counter.
    /// `None` for every other kind. Stamped values are integers, so the
    /// counter is exhausted past `i64::MAX`.
    pub fn take_next_increment(&mut self) -> Result<Option<i64>> {
        let FieldKind::Increment { next } = &mut self.kind else {
            return Ok(None);
        };
        let exhausted = || ThingError::Invariant(format!("Increment field {} is exhausted", self.name));
        let current = (*next).max(1);
        let stamped = i64::try_from(current).map_err(|_| exhausted())?;
        *next = current.checked_add(1).ok_or_else(exhausted)?;
        Ok(Some(stamped))
    }
}

fn formula_parses(formula: Option<&str>) -> bool {
    match formula {
        Some(source) if !source.trim().is_empty() => Formula::parse(source).is_ok(),
        _ => false,
    }
}

pub(crate) fn as_id(value: &Value) -> Option<Uuid> {
    match value {
        Value::Text(s) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    }
}

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Accepts `local@domain` and `Display Name <local@domain>`.
pub(crate) fn is_mailbox(text: &str) -> bool {
    let text = text.trim();
    match NAMED_MAILBOX.captures(text) {
        Some(captures) => captures
            .get(1)
            .is_some_and(|addr| ADDR_SPEC.is_match(addr.as_str())),
        None => ADDR_SPEC.is_match(text),
    }
}

/// Whether `mmdd` names a real calendar day; February 29 is allowed.
pub(crate) fn is_valid_month_day(mmdd: i64) -> bool {
    let (month, day) = (mmdd / 100, mmdd % 100);
    if !(1..=12).contains(&month) || day < 1 {
        return false;
    }
    // 2000 is a leap year, so every month has its longest length.
    NaiveDate::from_ymd_opt(2000, month as u32, day as u32).is_some()
}

fn is_text(value: &Value) -> bool {
    matches!(value, Value::Text(_))
}

/// Enum membership: strict value equality, plus literal comparison when the
/// declared set mixes text and non-text values.
pub(crate) fn enum_matches(declared: &[Value], candidate: &Value) -> bool {
    if declared.iter().any(|d| d == candidate) {
        return true;
    }
    let mixed = declared.iter().any(is_text)
        && declared.iter().any(|d| !is_text(d) && !d.is_null());
    if !mixed {
        return false;
    }
    let literal = candidate.to_literal();
    declared.iter().any(|d| d.to_literal() == literal)
}
