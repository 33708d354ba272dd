//! Engine configuration.

use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Extraction pattern for equipment instance codes: capture group 1 is the
/// code, e.g. `RO03` in `"001-RO03-Acionamento"."Motor"`.
pub const DEFAULT_EQUIPMENT_PATTERN: &str = r"\d{3}-([A-Za-z]+\d+)-Acionamento";

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Browse depth used when the caller does not give one.
    pub browse_depth: u32,
    /// Sliding expiry of cached subtrees (seconds).
    pub cache_ttl_secs: u64,
    /// Lifetime of a tag selection after its last write (seconds).
    pub selection_ttl_secs: u64,
    /// Readiness gate polling interval (ms).
    pub gate_interval_ms: u64,
    /// Regex locating the equipment instance code inside a node id.
    pub equipment_pattern: String,
    /// Largest number of instances one replication request may create.
    pub max_replicas: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            browse_depth: 2,
            cache_ttl_secs: 60 * 60,
            selection_ttl_secs: 5 * 60,
            gate_interval_ms: 2_000,
            equipment_pattern: DEFAULT_EQUIPMENT_PATTERN.to_string(),
            max_replicas: 100,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn selection_ttl(&self) -> Duration {
        Duration::from_secs(self.selection_ttl_secs)
    }

    pub fn gate_interval(&self) -> Duration {
        Duration::from_millis(self.gate_interval_ms)
    }
}
