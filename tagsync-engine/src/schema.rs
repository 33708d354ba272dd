//! Schema synchronization: turns a tag selection into a data table, its
//! registry rows and one captured row of values.

use crate::error::{EngineError, EngineResult};
use crate::source::NodeSource;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tagsync_storage::{REGISTRY_TABLE, StorageResult, TagStore};
use tagsync_types::{
    ColumnSpec, ColumnType, MAX_IDENTIFIER_LEN, TagDescriptor, TagValue, normalize,
};
use tracing::{debug, info, warn};

/// Column suffixes used by the columns-only layout.
pub const RESERVED_SUFFIXES: [&str; 3] = ["_value", "_displayname", "_type"];

/// Runs a blocking store call off the async runtime.
pub(crate) async fn run_store<T, F>(
    store: &Arc<dyn TagStore>,
    context: &str,
    op: F,
) -> EngineResult<T>
where
    F: FnOnce(&dyn TagStore) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?
        .map_err(|e| EngineError::storage(context, e))
}

/// Maps a declared source type to a store column type.
///
/// Accepts type names (`"Double"`) and numeric type ids (`"i=11"`, with or
/// without a namespace prefix). Unknown or absent types map to text.
pub fn map_source_type(source_type: Option<&str>) -> ColumnType {
    let Some(raw) = source_type else {
        return ColumnType::Text;
    };
    let name = raw.rsplit(';').next().unwrap_or(raw).trim().to_ascii_lowercase();
    match name.as_str() {
        "boolean" | "i=1" => ColumnType::Boolean,
        "sbyte" | "byte" | "int16" | "uint16" | "int32" | "i=2" | "i=3" | "i=4" | "i=5"
        | "i=6" => ColumnType::Integer,
        "uint32" | "int64" | "uint64" | "i=7" | "i=8" | "i=9" => ColumnType::BigInt,
        "float" | "i=10" => ColumnType::Real,
        "double" | "i=11" => ColumnType::Double,
        "datetime" | "utctime" | "i=13" => ColumnType::Timestamp,
        _ => ColumnType::Text,
    }
}

/// Outcome of one materialization.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializeReport {
    /// Normalized data table name.
    pub table_name: String,
    /// Whether this call created the table.
    pub created: bool,
    /// Columns this call added to an existing table.
    pub added_columns: Vec<String>,
    /// Columns requested for the table, excluding store-managed ones.
    pub columns: Vec<ColumnSpec>,
    /// Tags as registered; `id` is set when a registry row was written.
    pub tags: Vec<TagDescriptor>,
    /// Values inserted, keyed by column name. Empty for columns-only runs.
    pub inserted_values: BTreeMap<String, TagValue>,
    /// Node ids that were skipped, because the read failed or the name
    /// collides with the columns-only layout.
    pub skipped: Vec<String>,
}

/// Creates data tables and registry rows for tag selections.
pub struct SchemaSynchronizer {
    source: Arc<dyn NodeSource>,
    store: Arc<dyn TagStore>,
}

impl SchemaSynchronizer {
    pub fn new(source: Arc<dyn NodeSource>, store: Arc<dyn TagStore>) -> Self {
        Self { source, store }
    }

    /// Creates the registry table if needed.
    pub async fn ensure_registry_table(&self) -> EngineResult<()> {
        run_store(&self.store, REGISTRY_TABLE, |s| s.ensure_registry_table()).await
    }

    /// Creates the data table with one column per tag, registers every tag,
    /// then reads each tag once and inserts the values as a single row.
    ///
    /// An existing table gains any columns it lacks before the registry is
    /// written, so a grown tag set never leaves registry rows without a
    /// column behind them.
    ///
    /// Individual read failures are logged and reported in
    /// [`MaterializeReport::skipped`]; they do not fail the call.
    pub async fn materialize_and_insert(
        &self,
        tags: &[TagDescriptor],
        table_name: &str,
    ) -> EngineResult<MaterializeReport> {
        let table = validate_request(tags, table_name)?;
        let tags = self.prepare(tags, &table).await;
        let columns = value_columns(&tags);

        let (created, added_columns) = self.ensure_table(&table, &columns).await?;

        let pending = tags;
        let tags = run_store(&self.store, REGISTRY_TABLE, move |s| {
            s.ensure_registry_table()?;
            pending
                .into_iter()
                .map(|mut tag| {
                    tag.id = s.upsert_registry_row(&tag)?;
                    Ok(tag)
                })
                .collect::<StorageResult<Vec<_>>>()
        })
        .await?;

        let mut values = BTreeMap::new();
        let mut skipped = Vec::new();
        for tag in &tags {
            match self.source.read_value(&tag.node_id).await {
                Ok(value) => {
                    values.insert(tag.normalized_name.clone(), value.to_storable());
                }
                Err(e) => {
                    warn!("Skipping {} in {}: {}", tag.node_id, table, e);
                    skipped.push(tag.node_id.clone());
                }
            }
        }

        let captured_at = Utc::now();
        let target = table.clone();
        let row = values.clone();
        run_store(&self.store, &table, move |s| s.insert_row(&target, &row, captured_at)).await?;

        info!(
            "Materialized {} tags into {} ({} values, {} skipped)",
            tags.len(),
            table,
            values.len(),
            skipped.len()
        );
        Ok(MaterializeReport {
            table_name: table,
            created,
            added_columns,
            columns,
            tags,
            inserted_values: values,
            skipped,
        })
    }

    /// Creates the data table in the four-columns-per-tag layout without
    /// reading values or writing the registry.
    pub async fn materialize_columns_only(
        &self,
        tags: &[TagDescriptor],
        table_name: &str,
    ) -> EngineResult<MaterializeReport> {
        let table = validate_request(tags, table_name)?;
        let tags = self.prepare(tags, &table).await;

        let mut kept = Vec::with_capacity(tags.len());
        let mut skipped = Vec::new();
        for tag in tags {
            if has_reserved_suffix(&tag.node_id) || has_reserved_suffix(&tag.normalized_name) {
                debug!("Skipping {}: name ends in a reserved suffix", tag.node_id);
                skipped.push(tag.node_id);
            } else {
                kept.push(tag);
            }
        }

        let mut seen = HashSet::new();
        let columns: Vec<ColumnSpec> = kept
            .iter()
            .flat_map(layout_columns)
            .filter(|c| seen.insert(c.name.clone()))
            .collect();

        let (created, added_columns) = self.ensure_table(&table, &columns).await?;
        info!(
            "Created columns for {} tags in {} ({} skipped)",
            kept.len(),
            table,
            skipped.len()
        );
        Ok(MaterializeReport {
            table_name: table,
            created,
            added_columns,
            columns,
            tags: kept,
            inserted_values: BTreeMap::new(),
            skipped,
        })
    }

    /// Creates `table`, or adds the columns an existing one lacks. Returns
    /// whether the table was created and which columns were added.
    async fn ensure_table(
        &self,
        table: &str,
        columns: &[ColumnSpec],
    ) -> EngineResult<(bool, Vec<String>)> {
        let target = table.to_string();
        let columns = columns.to_vec();
        run_store(&self.store, table, move |s| {
            if s.create_table(&target, &columns)? {
                return Ok((true, Vec::new()));
            }
            let added = s.add_missing_columns(&target, &columns)?;
            if !added.is_empty() {
                debug!("Extended {} with {:?}", target, added);
            }
            Ok((false, added))
        })
        .await
    }

    /// Normalizes tags for `table`, dropping repeated node ids and refreshing
    /// display names from the source.
    async fn prepare(&self, tags: &[TagDescriptor], table: &str) -> Vec<TagDescriptor> {
        let mut seen = HashSet::new();
        let mut prepared = Vec::with_capacity(tags.len());
        for tag in tags {
            let node_id = tag.node_id.trim();
            if !seen.insert(node_id) {
                continue;
            }
            let mut next = TagDescriptor::new(node_id, table);
            next.source_type = tag.source_type.clone();
            next.display_name = self
                .source
                .resolve_display_name(node_id)
                .await
                .or_else(|| tag.display_name.clone());
            prepared.push(next);
        }
        prepared
    }
}

/// Rejects empty requests and returns the normalized table name.
fn validate_request(tags: &[TagDescriptor], table_name: &str) -> EngineResult<String> {
    if tags.is_empty() {
        return Err(EngineError::InvalidInput("no tags to materialize".into()));
    }
    if table_name.trim().is_empty() {
        return Err(EngineError::InvalidInput("table name is required".into()));
    }
    if tags.iter().any(|t| t.node_id.trim().is_empty()) {
        return Err(EngineError::InvalidInput("tag with an empty node id".into()));
    }
    Ok(normalize(table_name))
}

/// One column per distinct normalized name; the first tag wins.
fn value_columns(tags: &[TagDescriptor]) -> Vec<ColumnSpec> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(tags.len());
    for tag in tags {
        if seen.insert(tag.normalized_name.as_str()) {
            columns.push(ColumnSpec::new(
                tag.normalized_name.clone(),
                map_source_type(tag.source_type.as_deref()),
            ));
        } else {
            warn!(
                "{} maps to existing column {}; sharing it",
                tag.node_id, tag.normalized_name
            );
        }
    }
    columns
}

fn layout_columns(tag: &TagDescriptor) -> [ColumnSpec; 4] {
    let name = &tag.normalized_name;
    [
        ColumnSpec::new(name.clone(), ColumnType::Text),
        ColumnSpec::new(
            with_suffix(name, "_value"),
            map_source_type(tag.source_type.as_deref()),
        ),
        ColumnSpec::new(with_suffix(name, "_displayname"), ColumnType::Text),
        ColumnSpec::new(with_suffix(name, "_type"), ColumnType::Text),
    ]
}

fn has_reserved_suffix(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RESERVED_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Appends `suffix`, shortening `name` so the result stays a valid
/// identifier.
fn with_suffix(name: &str, suffix: &str) -> String {
    let room = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len());
    let cut = name.len().min(room);
    let base = name[..cut].trim_end_matches('_');
    format!("{base}{suffix}")
}
