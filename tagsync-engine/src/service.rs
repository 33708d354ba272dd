//! Caller-facing operations.
//!
//! [`TagSyncService`] is what a transport layer (HTTP, IPC) calls into. It
//! checks readiness preconditions, then delegates to the cache, selection
//! store, schema synchronizer and replicator. Failures are plain
//! [`EngineError`]s; [`EngineError::to_failure`] turns them into payloads.

use crate::cache::NodeTreeCache;
use crate::config::EngineConfig;
use crate::error::{Endpoint, EngineError, EngineResult};
use crate::readiness::{ReadinessSnapshot, ReadinessState};
use crate::replicator::{EquipmentPattern, EquipmentReplicator};
use crate::schema::{MaterializeReport, SchemaSynchronizer, run_store};
use crate::selection::{Selection, SelectionStore};
use crate::source::NodeSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tagsync_storage::TagStore;
use tagsync_types::{NodeTreeEntry, TagDescriptor, TagValue};
use tracing::{debug, info, warn};

/// Browse parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrowseRequest {
    pub root_id: String,
    /// Falls back to the configured browse depth.
    pub depth: Option<u32>,
    pub force_refresh: bool,
    /// Marks leaves already registered for this table.
    pub annotate_for_table: Option<String>,
}

impl BrowseRequest {
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseResponse {
    pub root_id: String,
    pub entries: Vec<NodeTreeEntry>,
    pub from_cache: bool,
    /// Entries marked as already registered.
    pub selected: usize,
}

/// Process-lifetime state shared between service instances.
#[derive(Clone)]
pub struct SharedState {
    pub cache: Arc<NodeTreeCache>,
    pub selection: Arc<SelectionStore>,
    pub readiness: Arc<ReadinessState>,
}

impl SharedState {
    pub fn new(
        config: &EngineConfig,
        source: Arc<dyn NodeSource>,
        store: Arc<dyn TagStore>,
    ) -> Self {
        Self {
            cache: Arc::new(NodeTreeCache::new(source, store, config.cache_ttl())),
            selection: Arc::new(SelectionStore::new(config.selection_ttl())),
            readiness: Arc::new(ReadinessState::new()),
        }
    }
}

/// The tag sync service.
pub struct TagSyncService {
    config: EngineConfig,
    source: Arc<dyn NodeSource>,
    store: Arc<dyn TagStore>,
    shared: SharedState,
    synchronizer: Arc<SchemaSynchronizer>,
    replicator: EquipmentReplicator,
}

impl TagSyncService {
    /// Creates a service with fresh shared state.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn NodeSource>,
        store: Arc<dyn TagStore>,
    ) -> EngineResult<Self> {
        let shared = SharedState::new(&config, Arc::clone(&source), Arc::clone(&store));
        Self::with_shared(config, source, store, shared)
    }

    /// Creates a service over existing shared state.
    pub fn with_shared(
        config: EngineConfig,
        source: Arc<dyn NodeSource>,
        store: Arc<dyn TagStore>,
        shared: SharedState,
    ) -> EngineResult<Self> {
        let pattern = EquipmentPattern::new(&config.equipment_pattern)?;
        let synchronizer = Arc::new(SchemaSynchronizer::new(
            Arc::clone(&source),
            Arc::clone(&store),
        ));
        let replicator =
            EquipmentReplicator::new(Arc::clone(&synchronizer), pattern, config.max_replicas);
        Ok(Self {
            config,
            source,
            store,
            shared,
            synchronizer,
            replicator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn readiness(&self) -> ReadinessSnapshot {
        self.shared.readiness.snapshot()
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Connects to the protocol endpoint and records the outcome.
    pub async fn connect_source(&self, endpoint_url: &str) -> EngineResult<bool> {
        let url = endpoint_url.trim();
        if url.is_empty() {
            return Err(EngineError::InvalidInput("endpoint url is required".into()));
        }
        match self.source.connect(url).await {
            Ok(connected) => {
                self.shared.readiness.set_protocol_connected(connected);
                if !connected {
                    warn!("Endpoint {} refused the session", url);
                }
                Ok(connected)
            }
            Err(e) => {
                self.shared.readiness.set_protocol_connected(false);
                Err(e)
            }
        }
    }

    pub async fn disconnect_source(&self) -> EngineResult<()> {
        self.shared.readiness.set_protocol_connected(false);
        self.source.disconnect().await
    }

    /// Records the storage connection state. On connect the registry table
    /// is created if missing.
    pub async fn set_storage_connected(&self, connected: bool) -> EngineResult<()> {
        if connected {
            self.synchronizer.ensure_registry_table().await?;
        }
        self.shared.readiness.set_storage_connected(connected);
        Ok(())
    }

    // ========================================================================
    // Browsing and selection
    // ========================================================================

    pub async fn browse(&self, request: BrowseRequest) -> EngineResult<BrowseResponse> {
        let root_id = request.root_id.trim();
        if root_id.is_empty() {
            return Err(EngineError::InvalidInput("root node id is required".into()));
        }
        self.require(Endpoint::Protocol)?;

        let depth = request.depth.unwrap_or(self.config.browse_depth).max(1);
        let mut result = self
            .shared
            .cache
            .get(root_id, depth, request.force_refresh)
            .await?;

        let mut selected = 0;
        if let Some(table) = request
            .annotate_for_table
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            if self.shared.readiness.storage_connected() {
                selected = self.shared.cache.annotate(&mut result.entries, table).await;
            } else {
                debug!("Storage offline; not annotating {}", root_id);
            }
        }

        Ok(BrowseResponse {
            root_id: root_id.to_string(),
            entries: result.entries,
            from_cache: result.lookup.from_cache(),
            selected,
        })
    }

    /// Resolves every node id and stores the result as the selection.
    pub async fn select_tags(
        &self,
        node_ids: &[String],
        table_name: &str,
    ) -> EngineResult<Vec<TagDescriptor>> {
        if node_ids.is_empty() {
            return Err(EngineError::InvalidInput("no tags selected".into()));
        }
        if table_name.trim().is_empty() {
            return Err(EngineError::InvalidInput("table name is required".into()));
        }
        self.require(Endpoint::Protocol)?;

        let mut tags = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let node_id = node_id.trim();
            let source_type = self
                .source
                .resolve_declared_type(node_id)
                .await
                .ok_or_else(|| {
                    EngineError::InvalidInput(format!("could not resolve details for {node_id}"))
                })?;
            let mut tag =
                TagDescriptor::new(node_id, table_name.trim()).with_source_type(source_type);
            tag.display_name = self.source.resolve_display_name(node_id).await;
            tags.push(tag);
        }

        self.shared.selection.put(tags.clone(), table_name).await?;
        info!("Selected {} tags for {}", tags.len(), table_name.trim());
        Ok(tags)
    }

    /// Stores prebuilt descriptors as the selection.
    pub async fn put_selection(
        &self,
        tags: Vec<TagDescriptor>,
        table_name: &str,
    ) -> EngineResult<()> {
        self.shared.selection.put(tags, table_name).await
    }

    pub async fn current_selection(&self) -> EngineResult<Selection> {
        self.shared.selection.take().await
    }

    pub async fn clear_selection(&self) {
        self.shared.selection.clear().await;
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Materializes the selection and inserts one row of current values.
    /// Needs both storage and protocol. Clears the selection on success.
    pub async fn materialize_and_insert(&self) -> EngineResult<MaterializeReport> {
        self.require(Endpoint::Storage)?;
        self.require(Endpoint::Protocol)?;
        let selection = self.shared.selection.take().await?;
        let report = self
            .synchronizer
            .materialize_and_insert(&selection.tags, &selection.table_name)
            .await?;
        self.shared.selection.clear().await;
        Ok(report)
    }

    /// Creates the columns-only layout for the selection. Reads nothing, so
    /// only storage is required. Clears the selection on success.
    pub async fn materialize_columns_only(&self) -> EngineResult<MaterializeReport> {
        self.require(Endpoint::Storage)?;
        let selection = self.shared.selection.take().await?;
        let report = self
            .synchronizer
            .materialize_columns_only(&selection.tags, &selection.table_name)
            .await?;
        self.shared.selection.clear().await;
        Ok(report)
    }

    /// Replicates the selection over instances `start..=end`. Needs both
    /// storage and protocol. The selection stays in place.
    pub async fn replicate_equipment(&self, start: u32, end: u32) -> EngineResult<Vec<String>> {
        self.require(Endpoint::Storage)?;
        self.require(Endpoint::Protocol)?;
        let selection = self.shared.selection.take().await?;
        self.replicator
            .replicate(&selection.tags, &selection.table_name, start, end)
            .await
    }

    // ========================================================================
    // Passthroughs
    // ========================================================================

    pub async fn write_tag(&self, node_id: &str, value: TagValue) -> EngineResult<bool> {
        let node_id = node_id.trim();
        if node_id.is_empty() {
            return Err(EngineError::InvalidInput("node id is required".into()));
        }
        self.require(Endpoint::Protocol)?;
        let accepted = self.source.write_value(node_id, value).await?;
        if !accepted {
            warn!("Write to {} was not accepted", node_id);
        }
        Ok(accepted)
    }

    pub async fn list_tables(&self) -> EngineResult<Vec<String>> {
        self.require(Endpoint::Storage)?;
        run_store(&self.store, "list tables", |s| s.list_tables()).await
    }

    pub async fn list_databases(&self) -> EngineResult<Vec<String>> {
        self.require(Endpoint::Storage)?;
        run_store(&self.store, "list databases", |s| s.list_databases()).await
    }

    fn require(&self, endpoint: Endpoint) -> EngineResult<()> {
        let ready = match endpoint {
            Endpoint::Storage => self.shared.readiness.storage_connected(),
            Endpoint::Protocol => self.shared.readiness.protocol_connected(),
        };
        if ready {
            Ok(())
        } else {
            Err(EngineError::NotConnected(endpoint))
        }
    }
}
