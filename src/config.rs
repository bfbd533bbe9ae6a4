use crate::core::names::DEFAULT_RESERVED_NAMES;
use crate::core::{Result, ThingError};
use std::path::PathBuf;

pub const ENV_DATA_DIR: &str = "THINGDB_DATA_DIR";
pub const ENV_INTERACTIVE: &str = "THINGDB_INTERACTIVE";
pub const ENV_LOG: &str = "THINGDB_LOG";

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Root directory of the JSON document store
    pub data_dir: PathBuf,

    /// Whether a chooser may be consulted to disambiguate references
    pub interactive: bool,

    /// Names that can never be used as property names
    pub reserved_names: Vec<String>,

    /// Default `tracing` filter directive
    pub log_filter: String,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            data_dir: PathBuf::from("./thingdb-data"),
            interactive: false,
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
            log_filter: "info".to_string(),
        }
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Allow or forbid interactive disambiguation
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Add a reserved name
    pub fn reserve(mut self, name: &str) -> Self {
        if !self.reserved_names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            self.reserved_names.push(name.to_string());
        }
        self
    }

    /// Set the log filter
    pub fn log_filter(mut self, filter: &str) -> Self {
        self.log_filter = filter.to_string();
        self
    }

    /// Defaults overlaid with `THINGDB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new().overlay(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            if dir.trim().is_empty() {
                return Err(ThingError::Config(format!("{} is empty", ENV_DATA_DIR)));
            }
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(flag) = lookup(ENV_INTERACTIVE) {
            self.interactive = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ThingError::Config(format!(
                        "{} must be a boolean, got '{}'",
                        ENV_INTERACTIVE, other
                    )));
                }
            };
        }

        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }

        Ok(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .data_dir("/tmp/things")
            .interactive(true)
            .reserve("Owner")
            .reserve("owner");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/things"));
        assert!(config.interactive);
        assert_eq!(config.reserved_names.len(), DEFAULT_RESERVED_NAMES.len() + 1);
    }

    #[test]
    fn test_overlay() {
        let vars: HashMap<&str, &str> = [(ENV_INTERACTIVE, "yes"), (ENV_LOG, "debug")].into();
        let config = EngineConfig::new()
            .overlay(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.interactive);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_overlay_rejects_garbage() {
        let err = EngineConfig::new()
            .overlay(|k| (k == ENV_INTERACTIVE).then(|| "sometimes".to_string()))
            .unwrap_err();
        assert!(matches!(err, ThingError::Config(_)));
    }
}
