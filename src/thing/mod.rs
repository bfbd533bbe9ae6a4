//! Things: free-form property bags that may conform to any number of schemas.
//!
//! A raw property key is either a bare name (`Nickname`) or qualified by the
//! owning schema's id (`{schema id}.Email`). Display names for both forms are
//! produced by [`carve::carve`].

pub mod carve;
pub mod property;
pub mod recompute;
pub mod resolve;

pub use carve::{CarvedName, carve};
pub use property::{ThingProperty, ThingUnsetProperty};
pub use resolve::Chooser;

use crate::core::{Result, ThingError, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

fn check_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    match trimmed.chars().next() {
        None => Err(ThingError::InvalidName(
            "Thing name cannot be empty".to_string(),
        )),
        Some(c) if c.is_ascii_digit() => Err(ThingError::InvalidName(format!(
            "Thing name '{}' cannot start with a digit",
            trimmed
        ))),
        Some(_) => Ok(trimmed.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    id: Uuid,
    name: String,
    #[serde(default)]
    schema_ids: Vec<Uuid>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    created_on: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    /// Bumped once per logical modification.
    #[serde(default)]
    revision: u64,
    #[serde(skip)]
    dirty: bool,
}

impl Thing {
    /// A new, unsaved thing. It starts dirty.
    pub fn new(name: &str) -> Result<Self> {
        let name = check_name(name)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            schema_ids: Vec::new(),
            properties: BTreeMap::new(),
            created_on: now,
            last_modified: now,
            last_accessed: now,
            revision: 0,
            dirty: true,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let name = check_name(name)?;
        if name != self.name {
            self.name = name;
            self.mark_modified();
        }
        Ok(())
    }

    pub fn schema_ids(&self) -> &[Uuid] {
        &self.schema_ids
    }

    pub fn has_schema(&self, schema_id: Uuid) -> bool {
        self.schema_ids.contains(&schema_id)
    }

    /// Associates a schema; returns `false` if it already was.
    pub fn associate(&mut self, schema_id: Uuid) -> bool {
        if self.has_schema(schema_id) {
            return false;
        }
        self.schema_ids.push(schema_id);
        self.mark_modified();
        true
    }

    /// Drops a schema association. Properties stored under the schema stay
    /// in the bag and show up under their raw keys.
    pub fn dissociate(&mut self, schema_id: Uuid) -> bool {
        let before = self.schema_ids.len();
        self.schema_ids.retain(|id| *id != schema_id);
        let removed = self.schema_ids.len() != before;
        if removed {
            self.mark_modified();
        }
        removed
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        if self.write_property(key.into(), value) {
            self.mark_modified();
        }
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        let removed = self.properties.remove(key);
        if removed.is_some() {
            self.mark_modified();
        }
        removed
    }

    /// Raw write without touching timestamps; returns whether anything changed.
    pub(crate) fn write_property(&mut self, key: String, value: Value) -> bool {
        if value.is_empty() {
            return self.properties.remove(&key).is_some();
        }
        match self.properties.get(&key) {
            Some(existing) if *existing == value && existing.type_name() == value.type_name() => {
                false
            }
            _ => {
                self.properties.insert(key, value);
                true
            }
        }
    }

    pub(crate) fn erase_property(&mut self, key: &str) -> bool {
        self.properties.remove(key).is_some()
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now().max(self.last_accessed);
    }

    pub fn mark_modified(&mut self) {
        let now = Utc::now().max(self.last_modified).max(self.last_accessed);
        self.last_modified = now;
        self.last_accessed = now;
        self.revision += 1;
        self.dirty = true;
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rules() {
        assert!(Thing::new("").is_err());
        assert!(Thing::new("  ").is_err());
        assert!(Thing::new("7up").is_err());
        assert_eq!(Thing::new(" Alice ").unwrap().name(), "Alice");
    }

    #[test]
    fn test_dirty_lifecycle() {
        let mut thing = Thing::new("Alice").unwrap();
        assert!(thing.is_dirty());
        thing.mark_saved();
        assert!(!thing.is_dirty());

        thing.set_property("Nickname", Value::from("Al"));
        assert!(thing.is_dirty());
        assert_eq!(thing.revision(), 1);

        thing.mark_saved();
        thing.set_property("Nickname", Value::from("Al"));
        assert!(!thing.is_dirty(), "same value is not a modification");
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let mut thing = Thing::new("Alice").unwrap();
        let created = thing.created_on();
        thing.touch();
        thing.mark_modified();
        assert!(thing.last_modified() >= created);
        assert!(thing.last_accessed() >= thing.last_modified());
        let modified = thing.last_modified();
        thing.touch();
        assert!(thing.last_accessed() >= modified);
        assert_eq!(thing.last_modified(), modified);
    }

    #[test]
    fn test_schema_association_is_repeat_free() {
        let mut thing = Thing::new("Alice").unwrap();
        let schema = Uuid::new_v4();
        assert!(thing.associate(schema));
        assert!(!thing.associate(schema));
        assert_eq!(thing.schema_ids(), &[schema]);
        assert!(thing.dissociate(schema));
        assert!(thing.schema_ids().is_empty());
    }

    #[test]
    fn test_empty_write_removes() {
        let mut thing = Thing::new("Alice").unwrap();
        thing.set_property("Nickname", Value::from("Al"));
        thing.set_property("Nickname", Value::from(""));
        assert!(thing.property("Nickname").is_none());
    }
}
