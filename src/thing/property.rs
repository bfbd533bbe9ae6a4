use super::Thing;
use super::carve::{CarvedName, carve};
use crate::core::{CancelToken, Result, Value};
use crate::schema::{FieldDefinition, FieldKind, Schema};
use crate::storage::Stores;
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Display-ready view of one stored property. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingProperty {
    pub true_name: String,
    pub full_display_name: String,
    pub simple_display_name: String,
    pub schema_id: Option<Uuid>,
    pub schema_name: Option<String>,
    pub value: Value,
    pub valid: bool,
    pub required: bool,
    pub field: Option<FieldDefinition>,
}

impl ThingProperty {
    pub fn kind(&self) -> Option<&FieldKind> {
        self.field.as_ref().map(|f| &f.kind)
    }

    pub(crate) fn from_carved(key: &str, carved: CarvedName, value: Value) -> Self {
        Self {
            true_name: key.to_string(),
            full_display_name: carved.full_display_name,
            simple_display_name: carved.simple_display_name,
            schema_id: None,
            schema_name: None,
            value,
            valid: true,
            required: false,
            field: None,
        }
    }
}

/// A field declared by an associated schema that the thing has no value for.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingUnsetProperty {
    pub full_display_name: String,
    pub simple_display_name: String,
    pub schema_id: Uuid,
    pub schema_name: String,
    pub field: FieldDefinition,
}

impl ThingUnsetProperty {
    pub fn true_name(&self) -> String {
        format!("{}.{}", self.schema_id, self.field.name)
    }
}

/// Loads every schema the thing is associated with, once each, in
/// association order. Missing schemas are logged and skipped.
pub async fn load_schemas(
    thing: &Thing,
    stores: &Stores,
    cancel: &CancelToken,
) -> Result<Vec<Schema>> {
    let mut seen = HashSet::new();
    let mut schemas = Vec::new();
    for schema_id in thing.schema_ids() {
        if cancel.is_cancelled() {
            break;
        }
        if !seen.insert(*schema_id) {
            continue;
        }
        match stores.schemas.load(*schema_id).await? {
            Some(schema) => schemas.push(schema),
            None => warn!(
                thing = thing.name(),
                schema_id = %schema_id,
                "thing refers to a schema that does not exist"
            ),
        }
    }
    Ok(schemas)
}

fn owning_schema<'a>(key: &str, schemas: &'a [Schema]) -> Option<&'a Schema> {
    schemas.iter().find(|schema| {
        let prefix = format!("{}.", schema.id());
        key.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&prefix))
    })
}

/// One view per raw property, in property-bag order, validated against the
/// owning schema's field when there is one.
pub async fn enumerate_with(
    thing: &Thing,
    schemas: &[Schema],
    stores: &Stores,
    cancel: &CancelToken,
) -> Vec<ThingProperty> {
    let mut properties = Vec::with_capacity(thing.properties().len());
    for (key, value) in thing.properties() {
        if cancel.is_cancelled() {
            debug!(thing = thing.name(), "enumeration cancelled");
            break;
        }

        let owner = owning_schema(key, schemas);
        let mut property = ThingProperty::from_carved(key, carve(key, owner), value.clone());

        if let Some(schema) = owner {
            property.schema_id = Some(schema.id());
            property.schema_name = Some(schema.name().to_string());
            let field_name = &key[schema.id().to_string().len() + 1..];
            if let Some(field) = schema.field(field_name) {
                property.valid = field.validate(value, stores).await;
                property.required = field.required;
                property.field = Some(field.clone());
            }
        }

        properties.push(property);
    }
    properties
}

pub async fn enumerate(
    thing: &Thing,
    stores: &Stores,
    cancel: &CancelToken,
) -> Result<Vec<ThingProperty>> {
    let schemas = load_schemas(thing, stores, cancel).await?;
    Ok(enumerate_with(thing, &schemas, stores, cancel).await)
}

/// Declared fields with no schema-qualified value on the thing.
pub fn unset_with(thing: &Thing, schemas: &[Schema], cancel: &CancelToken) -> Vec<ThingUnsetProperty> {
    let mut unset = Vec::new();
    for schema in schemas {
        for field in schema.fields() {
            if cancel.is_cancelled() {
                return unset;
            }
            let key = schema.qualified_key(&field.name);
            if thing.property(&key).is_some() {
                continue;
            }
            let carved = carve(&key, Some(schema));
            unset.push(ThingUnsetProperty {
                full_display_name: carved.full_display_name,
                simple_display_name: carved.simple_display_name,
                schema_id: schema.id(),
                schema_name: schema.name().to_string(),
                field: field.clone(),
            });
        }
    }
    unset
}

pub async fn unset_properties(
    thing: &Thing,
    stores: &Stores,
    cancel: &CancelToken,
) -> Result<Vec<ThingUnsetProperty>> {
    let schemas = load_schemas(thing, stores, cancel).await?;
    Ok(unset_with(thing, &schemas, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (Stores, Schema, Thing) {
        let stores = Stores::in_memory();
        let mut schema = Schema::new("Person").unwrap();
        schema
            .add_field(FieldDefinition::new("Email", FieldKind::Email).required())
            .unwrap();
        schema
            .add_field(FieldDefinition::new("Age", FieldKind::Integer))
            .unwrap();
        stores.schemas.save(&schema).await.unwrap();

        let mut thing = Thing::new("Alice").unwrap();
        thing.associate(schema.id());
        thing.associate(schema.id());
        (stores, schema, thing)
    }

    #[tokio::test]
    async fn test_enumerate_validates_schema_properties() {
        let (stores, schema, mut thing) = fixture().await;
        thing.set_property(schema.qualified_key("Age"), Value::from("old"));
        thing.set_property("Nickname", Value::from("Al"));

        let properties = enumerate(&thing, &stores, &CancelToken::new()).await.unwrap();
        assert_eq!(properties.len(), 2);

        let age = properties.iter().find(|p| p.simple_display_name == "Age").unwrap();
        assert_eq!(age.full_display_name, "Person.Age");
        assert_eq!(age.schema_id, Some(schema.id()));
        assert!(!age.valid);

        let nick = properties.iter().find(|p| p.true_name == "Nickname").unwrap();
        assert!(nick.valid);
        assert!(nick.schema_id.is_none());
    }

    #[tokio::test]
    async fn test_unset_lists_each_declared_field_once() {
        let (stores, schema, mut thing) = fixture().await;
        let unset = unset_properties(&thing, &stores, &CancelToken::new()).await.unwrap();
        assert_eq!(unset.len(), 2);
        assert!(unset.iter().any(|u| u.field.name == "Email" && u.field.required));

        thing.set_property(schema.qualified_key("Email"), Value::from("a@b.com"));
        let unset = unset_properties(&thing, &stores, &CancelToken::new()).await.unwrap();
        assert_eq!(unset.len(), 1);
        assert_eq!(unset[0].full_display_name, "Person.Age");
    }

    #[tokio::test]
    async fn test_cancelled_enumeration_yields_nothing_more() {
        let (stores, _schema, mut thing) = fixture().await;
        thing.set_property("A", Value::from(1));
        thing.set_property("B", Value::from(2));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(enumerate(&thing, &stores, &cancel).await.unwrap().is_empty());
    }
}
