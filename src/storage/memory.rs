use super::{NameMatch, SchemaStore, ThingStore, matches_partial_name};
use crate::core::Result;
use crate::schema::Schema;
use crate::thing::Thing;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

fn sorted(mut matches: Vec<NameMatch>) -> Vec<NameMatch> {
    matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    matches
}

pub struct InMemorySchemaStore {
    schemas: RwLock<HashMap<Uuid, Schema>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.schemas.read().await.len()
    }
}

impl Default for InMemorySchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn create(&self, name: &str) -> Result<Uuid> {
        let schema = Schema::new(name)?;
        let id = schema.id();
        self.schemas.write().await.insert(id, schema);
        Ok(id)
    }

    async fn load(&self, id: Uuid) -> Result<Option<Schema>> {
        Ok(self.schemas.read().await.get(&id).cloned())
    }

    async fn save(&self, schema: &Schema) -> Result<bool> {
        self.schemas.write().await.insert(schema.id(), schema.clone());
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.schemas.write().await.remove(&id).is_some())
    }

    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.schemas.read().await.contains_key(&id))
    }

    fn find_by_partial_name<'a>(&'a self, text: &'a str) -> BoxStream<'a, NameMatch> {
        stream::once(async move {
            let schemas = self.schemas.read().await;
            let matches = schemas
                .values()
                .filter(|s| matches_partial_name(s.name(), text))
                .map(|s| NameMatch::new(s.id(), s.name()))
                .collect();
            stream::iter(sorted(matches))
        })
        .flatten()
        .boxed()
    }
}

pub struct InMemoryThingStore {
    things: RwLock<HashMap<Uuid, Thing>>,
}

impl InMemoryThingStore {
    pub fn new() -> Self {
        Self {
            things: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.things.read().await.len()
    }
}

impl Default for InMemoryThingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThingStore for InMemoryThingStore {
    async fn create(&self, name: &str, schema_ids: &[Uuid]) -> Result<Thing> {
        let mut thing = Thing::new(name)?;
        for schema_id in schema_ids {
            thing.associate(*schema_id);
        }
        thing.mark_saved();
        self.things.write().await.insert(thing.id(), thing.clone());
        Ok(thing)
    }

    async fn load(&self, id: Uuid) -> Result<Option<Thing>> {
        Ok(self.things.read().await.get(&id).cloned())
    }

    async fn save(&self, thing: &Thing) -> Result<bool> {
        let mut stored = thing.clone();
        stored.mark_saved();
        self.things.write().await.insert(thing.id(), stored);
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.things.write().await.remove(&id).is_some())
    }

    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.things.read().await.contains_key(&id))
    }

    fn find_by_partial_name<'a>(
        &'a self,
        schema_id: Uuid,
        text: &'a str,
    ) -> BoxStream<'a, NameMatch> {
        stream::once(async move {
            let things = self.things.read().await;
            let matches = things
                .values()
                .filter(|t| t.has_schema(schema_id) && matches_partial_name(t.name(), text))
                .map(|t| NameMatch::new(t.id(), t.name()))
                .collect();
            stream::iter(sorted(matches))
        })
        .flatten()
        .boxed()
    }

    fn get_all_for_schema<'a>(&'a self, schema_id: Uuid) -> BoxStream<'a, Uuid> {
        stream::once(async move {
            let things = self.things.read().await;
            let mut ids: Vec<Uuid> = things
                .values()
                .filter(|t| t.has_schema(schema_id))
                .map(|t| t.id())
                .collect();
            ids.sort();
            stream::iter(ids)
        })
        .flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_store_crud() -> Result<()> {
        let store = InMemorySchemaStore::new();
        let id = store.create("Person").await?;
        assert!(store.exists_by_id(id).await?);

        let mut schema = store.load(id).await?.unwrap();
        schema.set_plural(Some("People".into()));
        assert!(store.save(&schema).await?);
        assert_eq!(store.load(id).await?.unwrap().plural(), Some("People"));

        assert!(store.delete(id).await?);
        assert!(!store.exists_by_id(id).await?);
        assert_eq!(store.len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_thing_partial_name_is_scoped_to_schema() -> Result<()> {
        let store = InMemoryThingStore::new();
        let person = Uuid::new_v4();
        let pet = Uuid::new_v4();
        store.create("Bob", &[person]).await?;
        store.create("Bobby", &[person]).await?;
        store.create("Bobo", &[pet]).await?;

        let names: Vec<String> = store
            .find_by_partial_name(person, "bob")
            .map(|m| m.name)
            .collect()
            .await;
        assert_eq!(names, vec!["Bob".to_string(), "Bobby".to_string()]);

        let all: Vec<Uuid> = store.get_all_for_schema(pet).collect().await;
        assert_eq!(all.len(), 1);
        Ok(())
    }
}
