use thiserror::Error;
use uuid::Uuid;

use crate::formula::ExpressionError;

#[derive(Error, Debug)]
pub enum ThingError {
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Schema '{0}' not found")]
    SchemaNotFound(Uuid),

    #[error("Thing '{0}' not found")]
    ThingNotFound(Uuid),

    #[error("Duplicate field '{field}' in schema '{schema}'")]
    DuplicateField { schema: String, field: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Formula error: {0}")]
    Formula(#[from] ExpressionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, ThingError>;

impl From<std::io::Error> for ThingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ThingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<uuid::Error> for ThingError {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidName(err.to_string())
    }
}
