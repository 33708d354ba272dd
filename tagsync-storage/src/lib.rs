//! Relational storage layer for tagsync.
//!
//! The engine talks to the store only through [`TagStore`], so the concrete
//! driver can be swapped without touching callers. [`SqliteTagStore`] is the
//! bundled implementation.
//!
//! # Layout
//!
//! - A registry table (`tags_registry`) maps every monitored node id to its
//!   normalized column name, owning data table, declared source type and
//!   display name. `node_id` is unique; writes are upserts.
//! - One dynamically shaped data table per monitored tag set. Besides the
//!   tag columns, every data table carries `row__id` and `captured__at`.
//!   Normalized names never contain `__`, so tag columns cannot collide
//!   with them.

mod error;
mod sqlite;
mod store;

pub use error::{StorageError, StorageResult};
pub use sqlite::SqliteTagStore;
pub use store::{
    TagStore, CAPTURED_AT_COLUMN, DATA_TABLE_COLUMNS, REGISTRY_TABLE, ROW_ID_COLUMN,
};
