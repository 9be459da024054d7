//! Layered configuration for the engine's queue sizes and poll timing.
//!
//! Loading hierarchy: environment overrides file, file overrides built-in defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tunable constants governing queue sizing and puller timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of both the output queue and the work queue within a parallel region.
    pub queue_capacity: usize,
    /// Puller backoff before re-checking the output queue when it was last seen empty.
    #[serde(with = "micros")]
    pub backoff: Duration,
    /// Timeout for the puller's blocking peek of the output queue.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            backoff: Duration::from_micros(4),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl EngineConfig {
    /// Load configuration: defaults, then `path` if it exists, then `ENGINE_*` env overrides.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let mut config = Self::default();
        let path = path.as_ref();
        if path.exists() {
            let text = std::fs::read_to_string(path).map_err(EngineError::SpawnFailed)?;
            config = toml::from_str(&text)
                .map_err(|e| EngineError::DrainInvariant(format!("invalid config file: {e}")))?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `ENGINE_QUEUE_CAPACITY` / `ENGINE_BACKOFF_MICROS` / `ENGINE_POLL_INTERVAL_MILLIS`
    /// environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ENGINE_QUEUE_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.queue_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("ENGINE_BACKOFF_MICROS") {
            if let Ok(n) = v.parse() {
                self.backoff = Duration::from_micros(n);
            }
        }
        if let Ok(v) = std::env::var("ENGINE_POLL_INTERVAL_MILLIS") {
            if let Ok(n) = v.parse() {
                self.poll_interval = Duration::from_millis(n);
            }
        }
    }
}

mod micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_micros(u64::deserialize(d)?))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.backoff, Duration::from_micros(4));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load("/nonexistent/path/engine.toml").unwrap();
        assert_eq!(config.queue_capacity, 32);
    }
}
