// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runner configuration.
//!
//! Loaded from a RON file. The circuit path is resolved relative to the
//! configuration file.

use bitspace_circuit::Value;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default tracing directive for the runner's own crates
pub const DEFAULT_LOG_FILTER: &str = "bitspace=info";

/// Error when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// IO error
        source: std::io::Error,
    },

    /// File is not valid RON
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// RON error
        source: ron::error::SpannedError,
    },
}

/// A value assigned to an input after the circuit is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputOverride {
    /// Stable node id from the description
    pub node: String,
    /// Input key
    pub input: String,
    /// Value to assign
    pub value: Value,
}

/// Runner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Tracing directive added on top of `RUST_LOG`
    pub log_filter: String,
    /// Path of the circuit description
    pub circuit: PathBuf,
    /// Input assignments applied in order
    pub overrides: Vec<InputOverride>,
    /// Register a validation observer that logs failing wires
    pub report_validation_failures: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            circuit: PathBuf::from("circuit.ron"),
            overrides: Vec::new(),
            report_validation_failures: true,
        }
    }
}

impl RunnerConfig {
    /// Parse configuration from RON
    pub fn from_ron(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_ron(&source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.circuit.is_relative() {
            if let Some(dir) = path.parent() {
                config.circuit = dir.join(&config.circuit);
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(config.overrides.is_empty());
        assert!(config.report_validation_failures);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = RunnerConfig::from_ron(r#"(circuit: "sum.ron")"#).unwrap();
        assert_eq!(config.circuit, PathBuf::from("sum.ron"));
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_serialization() {
        let config = RunnerConfig {
            overrides: vec![InputOverride {
                node: "sum".to_string(),
                input: "a".to_string(),
                value: Value::from(2),
            }],
            ..RunnerConfig::default()
        };
        let ron_str = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let loaded = RunnerConfig::from_ron(&ron_str).unwrap();
        assert_eq!(loaded, config);
    }
}
