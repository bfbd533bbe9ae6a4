use crate::config::EngineConfig;
use crate::core::{CancelToken, Result, ThingError, Value};
use crate::result::OperationResult;
use crate::schema::Schema;
use crate::storage::{JsonFileStore, Stores};
use crate::thing::property::{self, ThingProperty, ThingUnsetProperty};
use crate::thing::recompute::recompute_calculated;
use crate::thing::resolve::{self, Chooser};
use crate::thing::Thing;
use tracing::{debug, info};
use uuid::Uuid;

/// The explicit context every public operation runs in: store handles,
/// configuration and a cancellation token.
///
/// # Examples
///
/// ```
/// use thingdb::{FieldDefinition, FieldKind, Schema, Value, Workspace};
///
/// # tokio_test::block_on(async {
/// let workspace = Workspace::in_memory();
/// let mut person = Schema::new("Person").unwrap();
/// person.add_field(FieldDefinition::new("Email", FieldKind::Email)).unwrap();
/// workspace.save_schema(&person).await.unwrap();
///
/// let mut alice = workspace.create_thing("Alice", &[person.id()]).await.unwrap();
/// let result = workspace
///     .set(&mut alice, "Email", Value::from("alice@example.com"), None)
///     .await
///     .unwrap();
/// assert!(result.success);
/// workspace.save_thing(&mut alice).await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct Workspace {
    stores: Stores,
    config: EngineConfig,
    cancel: CancelToken,
}

impl Workspace {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        Self {
            stores,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Stores::in_memory(), EngineConfig::new())
    }

    /// A workspace over the JSON store in `config.data_dir`.
    ///
    /// ```no_run
    /// # use thingdb::{EngineConfig, Workspace};
    /// # tokio_test::block_on(async {
    /// let workspace = Workspace::open(EngineConfig::new().data_dir("./things")).await.unwrap();
    /// # });
    /// ```
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let store = JsonFileStore::open(&config.data_dir).await?;
        info!(data_dir = %config.data_dir.display(), "workspace opened");
        Ok(Self::new(Stores::json_files(store), config))
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub async fn save_schema(&self, schema: &Schema) -> Result<bool> {
        self.stores.schemas.save(schema).await
    }

    pub async fn load_schema(&self, id: Uuid) -> Result<Schema> {
        self.stores
            .schemas
            .load(id)
            .await?
            .ok_or(ThingError::SchemaNotFound(id))
    }

    /// Creates and saves a thing under `schema_ids`, stamping each
    /// increment field with the schema's next number.
    pub async fn create_thing(&self, name: &str, schema_ids: &[Uuid]) -> Result<Thing> {
        let mut schemas = Vec::with_capacity(schema_ids.len());
        for id in schema_ids {
            schemas.push(self.load_schema(*id).await?);
        }

        let mut thing = Thing::new(name)?;
        for schema in &mut schemas {
            thing.associate(schema.id());
            let mut stamped = false;
            let names: Vec<String> = schema.fields().iter().map(|f| f.name.clone()).collect();
            for field_name in names {
                let key = schema.qualified_key(&field_name);
                let Some(field) = schema.field_mut(&field_name) else {
                    continue;
                };
                if let Some(next) = field.take_next_increment()? {
                    thing.set_property(key, Value::Integer(next));
                    stamped = true;
                }
            }
            if stamped {
                self.stores.schemas.save(schema).await?;
            }
        }

        self.save_thing(&mut thing).await?;
        debug!(thing = thing.name(), id = %thing.id(), "thing created");
        Ok(thing)
    }

    /// Loads a thing and records the access.
    pub async fn load_thing(&self, id: Uuid) -> Result<Thing> {
        let mut thing = self
            .stores
            .things
            .load(id)
            .await?
            .ok_or(ThingError::ThingNotFound(id))?;
        thing.touch();
        Ok(thing)
    }

    pub async fn save_thing(&self, thing: &mut Thing) -> Result<bool> {
        let saved = self.stores.things.save(thing).await?;
        if saved {
            thing.mark_saved();
        }
        Ok(saved)
    }

    pub async fn delete_thing(&self, id: Uuid) -> Result<bool> {
        self.stores.things.delete(id).await
    }

    pub async fn enumerate(&self, thing: &Thing) -> Result<Vec<ThingProperty>> {
        property::enumerate(thing, &self.stores, &self.cancel).await
    }

    pub async fn unset_properties(&self, thing: &Thing) -> Result<Vec<ThingUnsetProperty>> {
        property::unset_properties(thing, &self.stores, &self.cancel).await
    }

    /// Sets one property. The chooser is ignored unless the workspace is
    /// configured as interactive. Does not save.
    pub async fn set(
        &self,
        thing: &mut Thing,
        name: &str,
        value: Value,
        chooser: Option<&dyn Chooser>,
    ) -> Result<OperationResult> {
        self.set_many(thing, [(name, value)], chooser).await
    }

    pub async fn set_many<I, K>(
        &self,
        thing: &mut Thing,
        pairs: I,
        chooser: Option<&dyn Chooser>,
    ) -> Result<OperationResult>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let pairs: Vec<(String, Value)> = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        resolve::set(thing, &pairs, chooser, &self.stores, &self.config, &self.cancel).await
    }

    /// Recomputes calculated fields and saves the thing if anything changed.
    pub async fn recompute_calculated(&self, thing: &mut Thing) -> Result<OperationResult> {
        recompute_calculated(thing, &self.stores, &self.cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldKind};

    #[tokio::test]
    async fn test_create_thing_stamps_increments() -> Result<()> {
        let workspace = Workspace::in_memory();
        let mut ticket = Schema::new("Ticket")?;
        ticket.add_field(FieldDefinition::new("Number", FieldKind::increment()))?;
        workspace.save_schema(&ticket).await?;

        let first = workspace.create_thing("First", &[ticket.id()]).await?;
        let second = workspace.create_thing("Second", &[ticket.id()]).await?;
        let key = ticket.qualified_key("Number");
        assert_eq!(first.property(&key), Some(&Value::Integer(1)));
        assert_eq!(second.property(&key), Some(&Value::Integer(2)));
        assert!(!second.is_dirty());

        let stored = workspace.load_schema(ticket.id()).await?;
        assert_eq!(stored.field("Number").unwrap().describe(true), "increment (next=3)");
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_increment_refuses_new_things() -> Result<()> {
        let workspace = Workspace::in_memory();
        let mut ticket = Schema::new("Ticket")?;
        ticket.add_field(FieldDefinition::new(
            "Number",
            FieldKind::Increment { next: i64::MAX as u64 },
        ))?;
        workspace.save_schema(&ticket).await?;

        let last = workspace.create_thing("Last", &[ticket.id()]).await?;
        assert_eq!(
            last.property(&ticket.qualified_key("Number")),
            Some(&Value::Integer(i64::MAX))
        );
        assert!(matches!(
            workspace.create_thing("Overflow", &[ticket.id()]).await,
            Err(ThingError::Invariant(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_records_are_errors() {
        let workspace = Workspace::in_memory();
        let id = Uuid::new_v4();
        assert!(matches!(
            workspace.load_schema(id).await,
            Err(ThingError::SchemaNotFound(_))
        ));
        assert!(matches!(
            workspace.create_thing("Orphan", &[id]).await,
            Err(ThingError::SchemaNotFound(_))
        ));
        assert!(matches!(
            workspace.load_thing(id).await,
            Err(ThingError::ThingNotFound(_))
        ));
    }
}
