//! Property and schema name rules.
//!
//! Names with spaces are written in brackets (`[First Name]`) wherever a user
//! refers to them; the helpers here escape, unescape and compare names in
//! that convention.

use super::{Result, ThingError};

/// The reserved property that maps onto a thing's display name.
pub const NAME_PROPERTY: &str = "Name";

/// Never matched through full or simple display names.
pub const PLURAL_WORD: &str = "plural";

/// System names that can never be used as property names.
pub const DEFAULT_RESERVED_NAMES: &[&str] = &[
    "Guid",
    "SchemaIds",
    "CreatedOn",
    "LastModified",
    "LastAccessed",
];

/// Validates the syntactic form of a user supplied property reference.
///
/// Accepts plain names (`Email`), bracketed names (`[First Name]`) and
/// schema-qualified references (`Person.[First Name]`).
pub fn validate_property_name(name: &str, reserved: &[String]) -> Result<()> {
    let trimmed = name.trim();
    let Some(first) = trimmed.chars().next() else {
        return Err(ThingError::InvalidName(
            "Property name cannot be empty".to_string(),
        ));
    };

    if first.is_ascii_digit() {
        return Err(ThingError::InvalidName(format!(
            "Property name '{}' cannot start with a digit",
            trimmed
        )));
    }

    if !(first.is_alphabetic() || first == '_' || first == '[') {
        return Err(ThingError::InvalidName(format!(
            "Property name '{}' cannot start with a symbol",
            trimmed
        )));
    }

    let mut depth = 0usize;
    for ch in trimmed.chars() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ThingError::InvalidName(format!(
                        "Property name '{}' has an unmatched ']'",
                        trimmed
                    ))
                })?;
            }
            c if c.is_whitespace() && depth == 0 => {
                return Err(ThingError::InvalidName(format!(
                    "Property name '{}' contains a space; wrap it in brackets like [{}]",
                    trimmed, trimmed
                )));
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ThingError::InvalidName(format!(
            "Property name '{}' has an unmatched '['",
            trimmed
        )));
    }

    if reserved.iter().any(|r| fold(r) == fold(&unescape(trimmed))) {
        return Err(ThingError::InvalidName(format!(
            "'{}' is a reserved system name",
            trimmed
        )));
    }

    Ok(())
}

/// Validates a schema or thing display name: non-empty and starting with a
/// letter or underscore.
pub fn validate_display_name(kind: &str, name: &str) -> Result<()> {
    let trimmed = name.trim();
    match trimmed.chars().next() {
        None => Err(ThingError::InvalidName(format!(
            "{} name cannot be empty",
            kind
        ))),
        Some(c) if c.is_alphabetic() || c == '_' => Ok(()),
        Some(_) => Err(ThingError::InvalidName(format!(
            "{} name '{}' must start with a letter",
            kind, trimmed
        ))),
    }
}

pub fn is_bracketed(name: &str) -> bool {
    name.len() >= 2 && name.starts_with('[') && name.ends_with(']')
}

/// Brackets a name that contains a space, unless it already is bracketed.
pub fn escape(name: &str) -> String {
    if name.contains(' ') && !is_bracketed(name) {
        format!("[{}]", name)
    } else {
        name.to_string()
    }
}

/// Strips one surrounding bracket pair.
pub fn unescape(name: &str) -> String {
    if is_bracketed(name) {
        name[1..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

/// Case folding for name comparisons.
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive comparison that ignores surrounding brackets.
pub fn names_match(a: &str, b: &str) -> bool {
    fold(a) == fold(b) || fold(&unescape(a)) == fold(&unescape(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved() -> Vec<String> {
        DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_property_names() {
        assert!(validate_property_name("Email", &reserved()).is_ok());
        assert!(validate_property_name("[First Name]", &reserved()).is_ok());
        assert!(validate_property_name("Person.[First Name]", &reserved()).is_ok());
        assert!(validate_property_name("_hidden", &reserved()).is_ok());
    }

    #[test]
    fn test_invalid_property_names() {
        assert!(validate_property_name("", &reserved()).is_err());
        assert!(validate_property_name("9lives", &reserved()).is_err());
        assert!(validate_property_name("$cash", &reserved()).is_err());
        assert!(validate_property_name("First Name", &reserved()).is_err());
        assert!(validate_property_name("[Open", &reserved()).is_err());
        assert!(validate_property_name("guid", &reserved()).is_err());
    }

    #[test]
    fn test_escape_round_trip() {
        assert_eq!(escape("First Name"), "[First Name]");
        assert_eq!(escape("[First Name]"), "[First Name]");
        assert_eq!(escape("Email"), "Email");
        assert_eq!(unescape("[First Name]"), "First Name");
        assert!(names_match("[first name]", "First Name"));
    }

    #[test]
    fn test_display_names() {
        assert!(validate_display_name("Schema", "Person").is_ok());
        assert!(validate_display_name("Schema", "").is_err());
        assert!(validate_display_name("Schema", "1st").is_err());
        assert!(validate_display_name("Schema", "#tag").is_err());
    }
}
