//! Short-lived storage of the operator's tag selection.

use crate::error::{EngineError, EngineResult};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tagsync_types::TagDescriptor;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// The tags chosen for materialization and their target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub tags: Vec<TagDescriptor>,
    pub table_name: String,
}

#[derive(Debug)]
struct Stored {
    selection: Selection,
    expires_at: Instant,
}

/// Holds at most one selection, expiring a fixed time after it was written.
#[derive(Debug)]
pub struct SelectionStore {
    ttl: Duration,
    current: RwLock<Option<Stored>>,
}

impl SelectionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: RwLock::new(None),
        }
    }

    /// Replaces the selection. Tags repeating an earlier node id are dropped.
    pub async fn put(&self, tags: Vec<TagDescriptor>, table_name: &str) -> EngineResult<()> {
        let table_name = table_name.trim();
        if tags.is_empty() {
            return Err(EngineError::InvalidInput("no tags selected".into()));
        }
        if table_name.is_empty() {
            return Err(EngineError::InvalidInput("table name is required".into()));
        }

        let mut seen = HashSet::new();
        let tags: Vec<TagDescriptor> = tags
            .into_iter()
            .filter(|t| seen.insert(t.node_id.clone()))
            .collect();
        debug!("Stored selection of {} tags for {}", tags.len(), table_name);

        *self.current.write().await = Some(Stored {
            selection: Selection {
                tags,
                table_name: table_name.to_string(),
            },
            expires_at: Instant::now() + self.ttl,
        });
        Ok(())
    }

    /// Returns the live selection without consuming it.
    pub async fn take(&self) -> EngineResult<Selection> {
        let current = self.current.read().await;
        match current.as_ref() {
            Some(stored) if Instant::now() < stored.expires_at => Ok(stored.selection.clone()),
            _ => Err(EngineError::NoActiveSelection),
        }
    }

    pub async fn clear(&self) {
        *self.current.write().await = None;
    }

    /// Time left before the selection expires, if one is live.
    pub async fn expires_in(&self) -> Option<Duration> {
        let now = Instant::now();
        self.current
            .read()
            .await
            .as_ref()
            .filter(|s| now < s.expires_at)
            .map(|s| s.expires_at - now)
    }
}
