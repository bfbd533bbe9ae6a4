use crate::core::names::escape;
use crate::schema::Schema;
use tracing::warn;

/// Display forms of one raw property key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarvedName {
    pub escaped_key: String,
    /// `Schema.[Field Name]` for schema-backed keys.
    pub full_display_name: String,
    pub simple_display_name: String,
}

impl CarvedName {
    fn bare(true_key: &str) -> Self {
        let escaped = escape(true_key);
        Self {
            escaped_key: escaped.clone(),
            full_display_name: escaped.clone(),
            simple_display_name: escaped,
        }
    }
}

fn strip_prefix_ignore_case<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let head = key.get(..prefix.len())?;
    if head.to_lowercase() == prefix.to_lowercase() {
        key.get(prefix.len()..)
    } else {
        None
    }
}

/// Splits a raw key into its escaped, full and simple display names.
///
/// A key qualified by `schema` (by id, or by the schema's escaped name) is
/// shown as `Schema.Field`. A qualified key whose field no longer exists on
/// the schema is shown as-is.
pub fn carve(true_key: &str, schema: Option<&Schema>) -> CarvedName {
    let Some(schema) = schema else {
        return CarvedName::bare(true_key);
    };

    let simple = strip_prefix_ignore_case(true_key, &format!("{}.", schema.id()))
        .or_else(|| strip_prefix_ignore_case(true_key, &format!("{}.", schema.escaped_name())));

    let Some(simple) = simple else {
        return CarvedName::bare(true_key);
    };

    if schema.field(simple).is_none() {
        warn!(
            key = true_key,
            schema = schema.name(),
            "property refers to a field that is no longer on the schema"
        );
        return CarvedName::bare(true_key);
    }

    let simple_display_name = escape(simple);
    CarvedName {
        escaped_key: escape(true_key),
        full_display_name: format!("{}.{}", schema.escaped_name(), simple_display_name),
        simple_display_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldKind};

    fn schema() -> Schema {
        let mut schema = Schema::new("Book Club").unwrap();
        schema
            .add_field(FieldDefinition::new("First Name", FieldKind::text()))
            .unwrap();
        schema
            .add_field(FieldDefinition::new("Email", FieldKind::Email))
            .unwrap();
        schema
    }

    #[test]
    fn test_qualified_key() {
        let schema = schema();
        let carved = carve(&schema.qualified_key("First Name"), Some(&schema));
        assert_eq!(carved.simple_display_name, "[First Name]");
        assert_eq!(carved.full_display_name, "[Book Club].[First Name]");
    }

    #[test]
    fn test_bare_key() {
        let carved = carve("Favourite Colour", None);
        assert_eq!(carved.simple_display_name, "[Favourite Colour]");
        assert_eq!(carved.full_display_name, "[Favourite Colour]");
        assert_eq!(carve("Nick", None).escaped_key, "Nick");
    }

    #[test]
    fn test_deleted_field_falls_back_to_whole_key() {
        let mut schema = schema();
        let key = schema.qualified_key("Email");
        schema.remove_field("Email");
        let carved = carve(&key, Some(&schema));
        assert_eq!(carved.simple_display_name, key);
        assert_eq!(carved.full_display_name, key);
    }

    #[test]
    fn test_carving_a_full_name_again_is_stable() {
        let schema = schema();
        for field in ["First Name", "Email"] {
            let first = carve(&schema.qualified_key(field), Some(&schema));
            let second = carve(&first.full_display_name, Some(&schema));
            assert_eq!(second.simple_display_name, first.simple_display_name);
            assert_eq!(second.full_display_name, first.full_display_name);
        }
    }
}
