//! Storage collaborator trait.

use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tagsync_types::{ColumnSpec, TagDescriptor, TagValue};

/// Name of the metadata registry table.
pub const REGISTRY_TABLE: &str = "tags_registry";

/// Row key column of every data table.
pub const ROW_ID_COLUMN: &str = "row__id";

/// Capture timestamp column of every data table.
pub const CAPTURED_AT_COLUMN: &str = "captured__at";

/// Store-managed columns present in every data table. Normalized names never
/// contain a double underscore, so no tag column can shadow these.
pub const DATA_TABLE_COLUMNS: [&str; 2] = [ROW_ID_COLUMN, CAPTURED_AT_COLUMN];

/// Relational store used by the schema synchronizer.
///
/// Implementations are blocking; async callers run them on a blocking
/// thread. Every table and column name passed in is expected to be in
/// normalized form and implementations reject anything else.
pub trait TagStore: Send + Sync {
    /// Creates the registry table if it does not exist.
    fn ensure_registry_table(&self) -> StorageResult<()>;

    /// Returns whether a table with this name exists.
    fn table_exists(&self, name: &str) -> StorageResult<bool>;

    /// Creates a data table if it does not exist. Returns true if this call
    /// created it. Safe to race: a concurrent creator makes this a no-op.
    fn create_table(&self, name: &str, columns: &[ColumnSpec]) -> StorageResult<bool>;

    /// Adds every column of `columns` that `table` lacks and returns the
    /// names added, in order. Existing columns are left untouched.
    fn add_missing_columns(&self, table: &str, columns: &[ColumnSpec])
    -> StorageResult<Vec<String>>;

    /// Inserts or refreshes the registry row keyed by `tag.node_id` and
    /// returns its id. On conflict only the source type and display name
    /// are updated.
    fn upsert_registry_row(&self, tag: &TagDescriptor) -> StorageResult<i64>;

    /// Registry rows owned by `table`, in insertion order.
    fn registered_tags(&self, table: &str) -> StorageResult<Vec<TagDescriptor>>;

    /// Inserts one row of values keyed by column name.
    fn insert_row(
        &self,
        table: &str,
        values: &BTreeMap<String, TagValue>,
        captured_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Number of data rows in `table`.
    fn row_count(&self, table: &str) -> StorageResult<u64>;

    /// Lists user tables, sorted by name.
    fn list_tables(&self) -> StorageResult<Vec<String>>;

    /// Lists the databases reachable through this connection.
    fn list_databases(&self) -> StorageResult<Vec<String>>;
}
