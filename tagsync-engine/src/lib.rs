//! Tag sync and replication engine for tagsync.
//!
//! Browses an industrial endpoint's address space, lets an operator pick
//! tags, and materializes the picks as relational tables with a metadata
//! registry. A selection taken from one equipment instance can be replicated
//! across a numbered range of sibling instances.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Cache**: Per-root browse snapshots with a sliding expiry
//! - **Selection**: The operator's pending tag pick, short-lived
//! - **Schema**: Creates data tables and registry rows, captures values
//! - **Replicator**: Rewrites instance codes and fans a selection out
//! - **Readiness**: Starts and stops continuous capture on connection edges
//! - **Service**: Caller-facing operations with readiness preconditions
//!
//! The protocol endpoint and continuous capture are reached through the
//! [`NodeSource`] and [`CaptureControl`] traits; storage goes through
//! [`tagsync_storage::TagStore`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tagsync_engine::{EngineConfig, TagSyncService};
//! use tagsync_engine::source::mock::MockNodeSource;
//! use tagsync_storage::SqliteTagStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig {
//!     browse_depth: 3,
//!     ..Default::default()
//! };
//! let source = Arc::new(MockNodeSource::new());
//! let store = Arc::new(SqliteTagStore::open_in_memory()?);
//!
//! let service = TagSyncService::new(config, source, store)?;
//! assert!(!service.readiness().may_monitor);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod capture;
mod config;
mod error;
pub mod readiness;
pub mod replicator;
pub mod schema;
pub mod selection;
pub mod service;
pub mod source;

pub use cache::{CacheLookup, CachedBrowse, NodeTreeCache};
pub use capture::CaptureControl;
pub use config::{DEFAULT_EQUIPMENT_PATTERN, EngineConfig};
pub use error::{Endpoint, EngineError, EngineResult, ErrorStatus, Failure};
pub use readiness::{
    GateHandle, GateMachine, GateState, GateTransition, ReadinessGate, ReadinessSnapshot,
    ReadinessState,
};
pub use replicator::{
    EquipmentPattern, EquipmentReplicator, InstanceCode, ReplicaPlan, derive_table_name,
    substitute,
};
pub use schema::{MaterializeReport, RESERVED_SUFFIXES, SchemaSynchronizer, map_source_type};
pub use selection::{Selection, SelectionStore};
pub use service::{BrowseRequest, BrowseResponse, SharedState, TagSyncService};
pub use source::NodeSource;
