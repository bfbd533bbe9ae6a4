//! Schemas: named, ordered sets of typed field definitions.

pub mod field;
pub mod massage;
pub mod pattern;

pub use field::{DEFAULT_URI_PATTERN, FieldDefinition, FieldKind};
pub use massage::Unmassageable;

use crate::core::names::{escape, unescape, validate_display_name};
use crate::core::{Result, ThingError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maps columns of an external source onto a schema's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMap {
    pub name: String,
    pub format: String,
    /// `(source column, field name)` pairs.
    pub field_map: Vec<(String, String)>,
}

impl ImportMap {
    pub fn new(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            field_map: Vec::new(),
        }
    }

    pub fn map(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.field_map.push((column.into(), field.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    id: Uuid,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plural: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    fields: Vec<FieldDefinition>,
    #[serde(default)]
    import_maps: Vec<ImportMap>,
}

impl Schema {
    pub fn new(name: &str) -> Result<Self> {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: Uuid, name: &str) -> Result<Self> {
        validate_display_name("Schema", name)?;
        Ok(Self {
            id,
            name: name.trim().to_string(),
            plural: None,
            description: None,
            fields: Vec::new(),
            import_maps: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        validate_display_name("Schema", name)?;
        self.name = name.trim().to_string();
        Ok(())
    }

    /// The name as written in a full display name, bracketed if it has a space.
    pub fn escaped_name(&self) -> String {
        escape(&self.name)
    }

    pub fn plural(&self) -> Option<&str> {
        self.plural.as_deref()
    }

    pub fn set_plural(&mut self, plural: Option<String>) {
        self.plural = plural;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Exact lookup by field name; surrounding brackets are ignored.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        let name = unescape(name);
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDefinition> {
        let name = unescape(name);
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn add_field(&mut self, field: FieldDefinition) -> Result<()> {
        validate_display_name("Field", &field.name)?;
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(ThingError::DuplicateField {
                schema: self.name.clone(),
                field: field.name,
            });
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> Option<FieldDefinition> {
        let name = unescape(name);
        let index = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(index))
    }

    /// The raw key under which a thing stores this schema's field.
    pub fn qualified_key(&self, field_name: &str) -> String {
        format!("{}.{}", self.id, unescape(field_name))
    }

    /// One `Name: kind` line per field, in declaration order.
    pub fn describe_fields(&self, verbose: bool) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| format!("{}: {}", escape(&f.name), f.describe(verbose)))
            .collect()
    }

    pub fn import_maps(&self) -> &[ImportMap] {
        &self.import_maps
    }

    pub fn add_import_map(&mut self, map: ImportMap) -> Result<()> {
        if let Some((_, missing)) = map
            .field_map
            .iter()
            .find(|(_, field)| self.field(field).is_none())
        {
            return Err(ThingError::InvalidName(format!(
                "Import map '{}' refers to unknown field '{}' on schema '{}'",
                map.name, missing, self.name
            )));
        }
        self.import_maps.retain(|m| m.name != map.name);
        self.import_maps.push(map);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Schema {
        let mut schema = Schema::new("Person").unwrap();
        schema
            .add_field(FieldDefinition::new("First Name", FieldKind::text()).required())
            .unwrap();
        schema
            .add_field(FieldDefinition::new("Email", FieldKind::Email))
            .unwrap();
        schema
    }

    #[test]
    fn test_name_rules() {
        assert!(Schema::new("").is_err());
        assert!(Schema::new("9Lives").is_err());
        assert!(Schema::new("#tag").is_err());
        assert_eq!(Schema::new("Book Club").unwrap().escaped_name(), "[Book Club]");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut schema = person();
        let err = schema
            .add_field(FieldDefinition::new("Email", FieldKind::text()))
            .unwrap_err();
        assert!(matches!(err, ThingError::DuplicateField { .. }));
        // ordinal: differently cased names are distinct fields
        assert!(schema.add_field(FieldDefinition::new("email", FieldKind::text())).is_ok());
    }

    #[test]
    fn test_field_lookup_and_removal() {
        let mut schema = person();
        assert!(schema.field("[First Name]").is_some());
        assert!(schema.field("first name").is_none());
        assert!(schema.remove_field("Email").is_some());
        assert!(schema.field("Email").is_none());
        assert_eq!(
            schema.qualified_key("[First Name]"),
            format!("{}.First Name", schema.id())
        );
    }

    #[test]
    fn test_describe_fields() {
        assert_eq!(
            person().describe_fields(true),
            vec!["[First Name]: text, required".to_string(), "Email: email".to_string()]
        );
    }

    #[test]
    fn test_import_map_must_reference_fields() {
        let mut schema = person();
        assert!(
            schema
                .add_import_map(ImportMap::new("csv", "csv").map("mail", "Email"))
                .is_ok()
        );
        assert!(
            schema
                .add_import_map(ImportMap::new("bad", "csv").map("x", "Phone"))
                .is_err()
        );
        assert_eq!(schema.import_maps().len(), 1);
    }

    #[test]
    fn test_serde_round_trip_keeps_field_order() {
        let schema = person();
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
        assert_eq!(back.fields()[0].name, "First Name");
    }
}
