// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Tunables for a [`SourceRegistry`](crate::SourceRegistry). Every field has a default,
//! so a JSON config file only needs to name the fields it overrides:
//!
//! ```json
//! { "cache_capacity": 100, "abort_backoff": { "initial_delay_ms": 250 } }
//! ```

use std::{path::Path, time::Duration};

use miette::{IntoDiagnostic, WrapErr};
use serde::{Deserialize, Serialize};

use crate::AbortBackoff;

/// Number of resource keys whose last value and cursor are remembered after their loop
/// is closed.
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

/// Capacity of the per-loop broadcast channel.
///
/// When the buffer is full, the oldest event is dropped to make room for new ones, and
/// the slow subscriber is told how many events it missed. Events are only produced when
/// the server cursor advances, so this is generous.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub cache_capacity: usize,
    pub channel_capacity: usize,
    pub abort_backoff: AbortBackoffConfig,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            abort_backoff: AbortBackoffConfig::default(),
        }
    }
}

/// Serializable form of [`AbortBackoff`], with durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbortBackoffConfig {
    pub initial_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
}

impl From<&AbortBackoffConfig> for AbortBackoff {
    fn from(config: &AbortBackoffConfig) -> Self {
        AbortBackoff {
            initial_delay: config.initial_delay_ms.map(Duration::from_millis),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: config.max_delay_ms.map(Duration::from_millis),
        }
    }
}

impl DataSourceConfig {
    /// # Errors
    ///
    /// Returns an error if the file can't be read or isn't valid JSON for this struct.
    pub fn try_load_from_json_file(path: impl AsRef<Path>) -> miette::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        Self::try_parse_json(&content)
            .wrap_err_with(|| format!("Failed to parse config file {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error if `content` isn't valid JSON for this struct.
    pub fn try_parse_json(content: &str) -> miette::Result<Self> {
        serde_json::from_str(content).into_diagnostic()
    }

    #[must_use]
    pub fn abort_backoff(&self) -> AbortBackoff { AbortBackoff::from(&self.abort_backoff) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = DataSourceConfig::try_parse_json("{}").unwrap();
        assert_eq!(config, DataSourceConfig::default());
        assert_eq!(config.cache_capacity, 50);
        assert_eq!(config.abort_backoff(), AbortBackoff::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = DataSourceConfig::try_parse_json(
            r#"{ "cache_capacity": 10, "abort_backoff": { "initial_delay_ms": 250, "backoff_multiplier": 2.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(
            config.abort_backoff(),
            AbortBackoff {
                initial_delay: Some(Duration::from_millis(250)),
                backoff_multiplier: Some(2.0),
                max_delay: None,
            }
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(DataSourceConfig::try_parse_json("{ cache_capacity: }").is_err());
    }

    #[test]
    fn test_load_from_missing_file_is_an_error() {
        assert!(
            DataSourceConfig::try_load_from_json_file("/definitely/not/here.json").is_err()
        );
    }
}
