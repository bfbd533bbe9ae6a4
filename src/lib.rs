// ============================================================================
// ThingDB Library
// ============================================================================

//! Schema-typed property bags.
//!
//! A [`Thing`] carries a free-form bag of properties and may conform to any
//! number of [`Schema`]s. The engine reconciles the two: it validates and
//! massages values per [`FieldKind`], resolves loosely written property names
//! to concrete keys, lists declared fields that are still unset, and keeps
//! calculated fields in step with the values they are computed from.
//!
//! All operations run inside a [`Workspace`], which carries the store
//! handles, configuration and a cancellation token.

pub mod config;
pub mod core;
pub mod facade;
pub mod formula;
pub mod result;
pub mod schema;
pub mod storage;
pub mod thing;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use crate::core::{CancelToken, Result, ThingError, Value};
pub use facade::Workspace;
pub use formula::{ExpressionError, ExpressionResult, Formula};
pub use result::OperationResult;
pub use schema::{FieldDefinition, FieldKind, ImportMap, Schema, Unmassageable};
pub use storage::{
    InMemorySchemaStore, InMemoryThingStore, JsonFileStore, NameMatch, SchemaStore, Stores,
    ThingStore,
};
pub use thing::{Chooser, Thing, ThingProperty, ThingUnsetProperty};
