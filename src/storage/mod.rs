//! Storage collaborators.
//!
//! The resolution engine never touches storage media directly; it talks to a
//! [`SchemaStore`] and a [`ThingStore`]. Partial-name lookups are lazy
//! streams that callers may abandon at any point.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::{InMemorySchemaStore, InMemoryThingStore};

use crate::core::Result;
use crate::core::names::fold;
use crate::schema::Schema;
use crate::thing::Thing;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use uuid::Uuid;

/// One hit from a partial-name search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatch {
    pub id: Uuid,
    pub name: String,
}

impl NameMatch {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Create and persist an empty schema, returning its id.
    async fn create(&self, name: &str) -> Result<Uuid>;

    async fn load(&self, id: Uuid) -> Result<Option<Schema>>;

    async fn save(&self, schema: &Schema) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn exists_by_id(&self, id: Uuid) -> Result<bool>;

    fn find_by_partial_name<'a>(&'a self, text: &'a str) -> BoxStream<'a, NameMatch>;
}

#[async_trait]
pub trait ThingStore: Send + Sync {
    /// Create and persist a thing associated with `schema_ids`.
    async fn create(&self, name: &str, schema_ids: &[Uuid]) -> Result<Thing>;

    async fn load(&self, id: Uuid) -> Result<Option<Thing>>;

    async fn save(&self, thing: &Thing) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn exists_by_id(&self, id: Uuid) -> Result<bool>;

    fn find_by_partial_name<'a>(
        &'a self,
        schema_id: Uuid,
        text: &'a str,
    ) -> BoxStream<'a, NameMatch>;

    fn get_all_for_schema<'a>(&'a self, schema_id: Uuid) -> BoxStream<'a, Uuid>;
}

/// Handles to both collaborators, passed explicitly to every operation.
#[derive(Clone)]
pub struct Stores {
    pub schemas: Arc<dyn SchemaStore>,
    pub things: Arc<dyn ThingStore>,
}

impl Stores {
    pub fn new(schemas: Arc<dyn SchemaStore>, things: Arc<dyn ThingStore>) -> Self {
        Self { schemas, things }
    }

    pub fn in_memory() -> Self {
        Self {
            schemas: Arc::new(InMemorySchemaStore::new()),
            things: Arc::new(InMemoryThingStore::new()),
        }
    }

    /// Both collaborators backed by the same directory of JSON documents.
    pub fn json_files(store: JsonFileStore) -> Self {
        let store = Arc::new(store);
        Self {
            schemas: store.clone(),
            things: store,
        }
    }
}

/// Case-insensitive prefix match used by every partial-name search.
pub fn matches_partial_name(name: &str, text: &str) -> bool {
    fold(name).starts_with(&fold(text.trim()))
}
