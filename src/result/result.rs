use std::fmt;
use tracing::{error, info, warn};

/// Outcome of a public operation: overall success plus human-readable
/// messages. Expected domain problems land here instead of in `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub messages: Vec<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            messages: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let mut result = Self::ok();
        result.error(message);
        result
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.messages.push(message);
    }

    /// Non-fatal: recorded and logged, success is unchanged.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.messages.push(message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.messages.push(message);
        self.success = false;
    }

    pub fn merge(&mut self, other: OperationResult) {
        self.success &= other.success;
        self.messages.extend(other.messages);
    }

    pub fn has_message_containing(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }
}

impl Default for OperationResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.success { "ok" } else { "failed" })?;
        for message in &self.messages {
            write!(f, "\n  {}", message)?;
        }
        Ok(())
    }
}
