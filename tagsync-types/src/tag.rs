//! Monitored tag descriptors.

use crate::normalize::normalize;
use serde::{Deserialize, Serialize};

/// A selected, monitored node and the table it is materialized into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagDescriptor {
    /// Store-assigned id; 0 until the registry row exists.
    pub id: i64,
    /// Raw node identifier; the registry's unique key.
    pub node_id: String,
    /// Column name derived from `node_id`.
    pub normalized_name: String,
    /// Declared type reported by the source, e.g. `"Double"`.
    pub source_type: Option<String>,
    /// Display name reported by the source.
    pub display_name: Option<String>,
    /// Owning data table (normalized).
    pub table_name: String,
}

impl TagDescriptor {
    /// Creates an unpersisted descriptor, deriving the normalized name.
    pub fn new(node_id: impl Into<String>, table_name: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            id: 0,
            normalized_name: normalize(&node_id),
            node_id,
            source_type: None,
            display_name: None,
            table_name: table_name.into(),
        }
    }

    /// Sets the declared source type.
    #[must_use]
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Re-targets the descriptor at another table, re-deriving the
    /// normalized name and resetting the store id.
    #[must_use]
    pub fn retarget(&self, node_id: impl Into<String>, table_name: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            id: 0,
            normalized_name: normalize(&node_id),
            node_id,
            source_type: self.source_type.clone(),
            display_name: None,
            table_name: table_name.into(),
        }
    }

    /// Whether the registry has assigned an id.
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}
