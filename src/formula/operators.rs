use super::ast::{BinaryOp, UnaryOp};
use super::{ExpressionError, ExpressionResult};
use crate::core::Value;
use crate::schema::massage::parse_date;
use chrono::TimeDelta;
use std::cmp::Ordering;

pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> ExpressionResult {
    match op {
        BinaryOp::Concat => Ok(Value::Text(format!(
            "{}{}",
            left.to_literal(),
            right.to_literal()
        ))),
        op if op.is_comparison() => compare(op, left, right).map(Value::Boolean),
        op => arithmetic(op, left, right),
    }
}

pub fn apply_unary(op: UnaryOp, value: &Value) -> ExpressionResult {
    match op {
        UnaryOp::Minus => match value {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| ExpressionError::BadValue("Integer overflow".into())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => match coerce_number(other) {
                Some(f) => Ok(Value::Float(-f)),
                None => Err(ExpressionError::BadValue(format!(
                    "Cannot negate {} '{}'",
                    other.type_name(),
                    other
                ))),
            },
        },
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    if left.is_null() || right.is_null() {
        return Ok(false);
    }

    let ordering = left
        .compare(right)
        .or_else(|| coerced_ordering(left, right))
        .ok_or_else(|| {
            ExpressionError::BadValue(format!(
                "Cannot compare {} '{}' with {} '{}'",
                left.type_name(),
                left,
                right.type_name(),
                right
            ))
        })?;

    Ok(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => unreachable!("non-comparison operator {}", op),
    })
}

/// Text stored in a property bag often holds numbers or dates; compare them
/// in the other operand's shape when the text parses.
fn coerced_ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Text(_), other) | (other, Value::Text(_)) if other.is_numeric() => {
            let l = coerce_number(left)?;
            let r = coerce_number(right)?;
            Value::Float(l).compare(&Value::Float(r))
        }
        (Value::Text(t), Value::Date(d)) => parse_date(t).map(|parsed| parsed.cmp(d)),
        (Value::Date(d), Value::Text(t)) => parse_date(t).map(|parsed| d.cmp(&parsed)),
        (Value::Boolean(b), Value::Text(t)) => parse_bool(t).map(|parsed| b.cmp(&parsed)),
        (Value::Text(t), Value::Boolean(b)) => parse_bool(t).map(|parsed| parsed.cmp(b)),
        _ => None,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> ExpressionResult {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    // Date arithmetic: date - date = days, date +/- days = date
    match (left, op, right) {
        (Value::Date(a), BinaryOp::Subtract, Value::Date(b)) => {
            return Ok(Value::Integer((*a - *b).num_days()));
        }
        (Value::Date(d), BinaryOp::Add, Value::Integer(days))
        | (Value::Integer(days), BinaryOp::Add, Value::Date(d)) => {
            return TimeDelta::try_days(*days)
                .and_then(|delta| d.checked_add_signed(delta))
                .map(Value::Date)
                .ok_or_else(|| ExpressionError::BadValue("Date out of range".into()));
        }
        (Value::Date(d), BinaryOp::Subtract, Value::Integer(days)) => {
            return TimeDelta::try_days(*days)
                .and_then(|delta| d.checked_sub_signed(delta))
                .map(Value::Date)
                .ok_or_else(|| ExpressionError::BadValue("Date out of range".into()));
        }
        _ => {}
    }

    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        let result = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Subtract => a.checked_sub(*b),
            BinaryOp::Multiply => a.checked_mul(*b),
            BinaryOp::Divide => {
                if *b == 0 {
                    return Err(ExpressionError::BadValue("Division by zero".into()));
                }
                match a.checked_rem(*b) {
                    Some(0) => a.checked_div(*b),
                    Some(_) => return Ok(Value::Float(*a as f64 / *b as f64)),
                    None => None,
                }
            }
            _ => unreachable!("non-arithmetic operator {}", op),
        };
        return result
            .map(Value::Integer)
            .ok_or_else(|| ExpressionError::BadValue("Integer overflow".into()));
    }

    let (Some(a), Some(b)) = (coerce_number(left), coerce_number(right)) else {
        return Err(ExpressionError::BadValue(format!(
            "Cannot apply '{}' to {} '{}' and {} '{}'",
            op,
            left.type_name(),
            left,
            right.type_name(),
            right
        )));
    };

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => {
            if b == 0.0 {
                return Err(ExpressionError::BadValue("Division by zero".into()));
            }
            a / b
        }
        _ => unreachable!("non-arithmetic operator {}", op),
    };
    Ok(Value::Float(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_comparisons_coerce_numeric_text() {
        assert_eq!(
            apply_binary(BinaryOp::Gt, &Value::Text("20".into()), &Value::Integer(18)).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            apply_binary(BinaryOp::Eq, &Value::Null, &Value::Integer(1)).unwrap(),
            Value::Boolean(false)
        );
        assert!(apply_binary(BinaryOp::Lt, &Value::Text("abc".into()), &Value::Integer(1)).is_err());
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(
            apply_binary(BinaryOp::Divide, &Value::Integer(6), &Value::Integer(3)).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            apply_binary(BinaryOp::Divide, &Value::Integer(7), &Value::Integer(2)).unwrap(),
            Value::Float(3.5)
        );
        assert!(apply_binary(BinaryOp::Divide, &Value::Integer(1), &Value::Integer(0)).is_err());
        assert_eq!(
            apply_binary(BinaryOp::Add, &Value::Null, &Value::Integer(1)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_integer_overflow_is_bad_value() {
        let min = Value::Integer(i64::MIN);
        assert!(matches!(
            apply_binary(BinaryOp::Divide, &min, &Value::Integer(-1)),
            Err(ExpressionError::BadValue(_))
        ));
        assert!(matches!(
            apply_binary(BinaryOp::Multiply, &Value::Integer(i64::MAX), &Value::Integer(2)),
            Err(ExpressionError::BadValue(_))
        ));
        assert_eq!(
            apply_binary(BinaryOp::Divide, &min, &Value::Integer(1)).unwrap(),
            min
        );
    }

    #[test]
    fn test_date_offset_out_of_range_is_bad_value() {
        let day = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let huge = Value::Integer(1_000_000_000_000_000);
        assert!(matches!(
            apply_binary(BinaryOp::Add, &day, &huge),
            Err(ExpressionError::BadValue(_))
        ));
        assert!(matches!(
            apply_binary(BinaryOp::Subtract, &day, &huge),
            Err(ExpressionError::BadValue(_))
        ));
        assert!(matches!(
            apply_binary(BinaryOp::Add, &day, &Value::Integer(i64::MIN)),
            Err(ExpressionError::BadValue(_))
        ));
    }

    #[test]
    fn test_date_arithmetic_and_concat() {
        let a = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(
            apply_binary(BinaryOp::Subtract, &Value::Date(a), &Value::Date(b)).unwrap(),
            Value::Integer(29)
        );
        assert_eq!(
            apply_binary(BinaryOp::Concat, &Value::from("n="), &Value::Integer(3)).unwrap(),
            Value::from("n=3")
        );
    }
}
