use super::{NameMatch, SchemaStore, ThingStore, matches_partial_name};
use crate::core::{Result, ThingError};
use crate::schema::Schema;
use crate::thing::Thing;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const SCHEMA_DIR: &str = "schemas";
const THING_DIR: &str = "things";

/// Schemas and things as one pretty-printed JSON document per id.
///
/// ```text
/// <root>/schemas/<id>.json
/// <root>/things/<id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

enum Listing {
    Pending(PathBuf),
    Reading(fs::ReadDir),
}

impl JsonFileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [SCHEMA_DIR, THING_DIR] {
            fs::create_dir_all(root.join(dir))
                .await
                .map_err(|err| ThingError::Io(format!("create {}: {}", root.join(dir).display(), err)))?;
        }
        debug!(root = %root.display(), "opened json file store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, dir: &str, id: Uuid) -> PathBuf {
        self.root.join(dir).join(format!("{}.json", id))
    }

    async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ThingError::Io(format!("read {}: {}", path.display(), err))),
        };
        let document = serde_json::from_slice::<T>(&bytes).map_err(|err| {
            ThingError::Serialization(format!("parse {}: {}", path.display(), err))
        })?;
        Ok(Some(document))
    }

    /// Writes to a temporary sibling and renames it over the target.
    async fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(document).map_err(|err| {
            ThingError::Serialization(format!("serialize {}: {}", path.display(), err))
        })?;

        fs::write(&tmp_path, json)
            .await
            .map_err(|err| ThingError::Io(err.to_string()))?;

        fs::rename(&tmp_path, path)
            .await
            .map_err(|err| ThingError::Io(err.to_string()))?;

        Ok(())
    }

    async fn remove_document(path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ThingError::Io(format!("remove {}: {}", path.display(), err))),
        }
    }

    async fn document_exists(path: &Path) -> Result<bool> {
        fs::try_exists(path)
            .await
            .map_err(|err| ThingError::Io(err.to_string()))
    }

    /// Lazily reads every document in `dir`; unreadable files are skipped.
    fn documents<T>(dir: PathBuf) -> BoxStream<'static, T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        stream::unfold(Listing::Pending(dir), |listing| async move {
            let mut entries = match listing {
                Listing::Pending(dir) => match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        if err.kind() != ErrorKind::NotFound {
                            warn!(dir = %dir.display(), error = %err, "cannot list documents");
                        }
                        return None;
                    }
                },
                Listing::Reading(entries) => entries,
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => return None,
                    Err(err) => {
                        warn!(error = %err, "directory listing failed");
                        return None;
                    }
                };
                let path = entry.path();
                if path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                match Self::read_document::<T>(&path).await {
                    Ok(Some(document)) => return Some((document, Listing::Reading(entries))),
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable document");
                    }
                }
            }
        })
        .boxed()
    }
}

#[async_trait]
impl SchemaStore for JsonFileStore {
    async fn create(&self, name: &str) -> Result<Uuid> {
        let schema = Schema::new(name)?;
        SchemaStore::save(self, &schema).await?;
        Ok(schema.id())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Schema>> {
        Self::read_document(&self.path(SCHEMA_DIR, id)).await
    }

    async fn save(&self, schema: &Schema) -> Result<bool> {
        Self::write_document(&self.path(SCHEMA_DIR, schema.id()), schema).await?;
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Self::remove_document(&self.path(SCHEMA_DIR, id)).await
    }

    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        Self::document_exists(&self.path(SCHEMA_DIR, id)).await
    }

    fn find_by_partial_name<'a>(&'a self, text: &'a str) -> BoxStream<'a, NameMatch> {
        Self::documents::<Schema>(self.root.join(SCHEMA_DIR))
            .filter_map(move |schema| async move {
                matches_partial_name(schema.name(), text)
                    .then(|| NameMatch::new(schema.id(), schema.name()))
            })
            .boxed()
    }
}

#[async_trait]
impl ThingStore for JsonFileStore {
    async fn create(&self, name: &str, schema_ids: &[Uuid]) -> Result<Thing> {
        let mut thing = Thing::new(name)?;
        for schema_id in schema_ids {
            thing.associate(*schema_id);
        }
        ThingStore::save(self, &thing).await?;
        thing.mark_saved();
        Ok(thing)
    }

    async fn load(&self, id: Uuid) -> Result<Option<Thing>> {
        Self::read_document(&self.path(THING_DIR, id)).await
    }

    async fn save(&self, thing: &Thing) -> Result<bool> {
        Self::write_document(&self.path(THING_DIR, thing.id()), thing).await?;
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Self::remove_document(&self.path(THING_DIR, id)).await
    }

    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        Self::document_exists(&self.path(THING_DIR, id)).await
    }

    fn find_by_partial_name<'a>(
        &'a self,
        schema_id: Uuid,
        text: &'a str,
    ) -> BoxStream<'a, NameMatch> {
        Self::documents::<Thing>(self.root.join(THING_DIR))
            .filter_map(move |thing| async move {
                (thing.has_schema(schema_id) && matches_partial_name(thing.name(), text))
                    .then(|| NameMatch::new(thing.id(), thing.name()))
            })
            .boxed()
    }

    fn get_all_for_schema<'a>(&'a self, schema_id: Uuid) -> BoxStream<'a, Uuid> {
        Self::documents::<Thing>(self.root.join(THING_DIR))
            .filter_map(move |thing| async move { thing.has_schema(schema_id).then(|| thing.id()) })
            .boxed()
    }
}
