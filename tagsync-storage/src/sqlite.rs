//! SQLite-backed [`TagStore`].

use crate::error::{StorageError, StorageResult};
use crate::store::{TagStore, CAPTURED_AT_COLUMN, REGISTRY_TABLE, ROW_ID_COLUMN};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tagsync_types::{is_normalized, ColumnSpec, TagDescriptor, TagValue};
use tracing::{debug, info};

/// Tag store backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteTagStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTagStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn table_exists_in(conn: &Connection, name: &str) -> StorageResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn column_names_in(conn: &Connection, table: &str) -> StorageResult<HashSet<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
        let names = stmt.query_map([], |row| row.get(1))?;
        let names = names.collect::<Result<HashSet<String>, _>>()?;
        Ok(names)
    }
}

/// Rejects names that are not normalized identifiers.
fn check_identifier(name: &str) -> StorageResult<()> {
    if is_normalized(name) {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

fn check_data_table(name: &str) -> StorageResult<()> {
    check_identifier(name)?;
    if name == REGISTRY_TABLE {
        return Err(StorageError::ReservedName(name.to_string()));
    }
    Ok(())
}

fn to_sql_value(value: &TagValue) -> Value {
    match value.to_storable() {
        TagValue::Null => Value::Null,
        TagValue::Bool(b) => Value::Integer(i64::from(b)),
        TagValue::Int(i) => Value::Integer(i),
        TagValue::Float(f) => Value::Real(f),
        TagValue::Text(s) => Value::Text(s),
        TagValue::Timestamp(ts) => Value::Text(ts.to_rfc3339()),
        // Unreachable after to_storable.
        other @ (TagValue::UInt(_) | TagValue::Array(_)) => Value::Text(other.to_string()),
    }
}

impl TagStore for SqliteTagStore {
    fn ensure_registry_table(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {REGISTRY_TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id TEXT NOT NULL UNIQUE,
                normalized_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                source_type TEXT,
                display_name TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_{REGISTRY_TABLE}_table
                ON {REGISTRY_TABLE} (table_name);
            "
        ))?;
        Ok(())
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        Self::table_exists_in(&conn, name)
    }

    fn create_table(&self, name: &str, columns: &[ColumnSpec]) -> StorageResult<bool> {
        check_data_table(name)?;
        for column in columns {
            column.validate()?;
        }

        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{name}\" (\n    {ROW_ID_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT,\n    {CAPTURED_AT_COLUMN} TEXT NOT NULL"
        );
        for column in columns {
            ddl.push_str(&format!(",\n    \"{}\" {}", column.name, column.column_type.sql_name()));
        }
        ddl.push_str("\n)");

        let conn = self.conn()?;
        let existed = Self::table_exists_in(&conn, name)?;
        conn.execute_batch(&ddl)?;
        if !existed {
            info!("Created table {} with {} tag columns", name, columns.len());
        }
        Ok(!existed)
    }

    fn add_missing_columns(
        &self,
        table: &str,
        columns: &[ColumnSpec],
    ) -> StorageResult<Vec<String>> {
        check_data_table(table)?;
        for column in columns {
            column.validate()?;
        }

        let conn = self.conn()?;
        let mut present = Self::column_names_in(&conn, table)?;
        if present.is_empty() {
            return Err(StorageError::MissingTable(table.to_string()));
        }
        let mut added = Vec::new();
        for column in columns {
            if !present.insert(column.name.clone()) {
                continue;
            }
            conn.execute_batch(&format!(
                "ALTER TABLE \"{table}\" ADD COLUMN \"{}\" {}",
                column.name,
                column.column_type.sql_name()
            ))?;
            added.push(column.name.clone());
        }
        if !added.is_empty() {
            info!("Added {} tag columns to {}", added.len(), table);
        }
        Ok(added)
    }

    fn upsert_registry_row(&self, tag: &TagDescriptor) -> StorageResult<i64> {
        let conn = self.conn()?;
        let id = conn.query_row(
            &format!(
                "INSERT INTO {REGISTRY_TABLE}
                    (node_id, normalized_name, table_name, source_type, display_name)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (node_id) DO UPDATE SET
                    source_type = excluded.source_type,
                    display_name = excluded.display_name
                 RETURNING id"
            ),
            params![
                tag.node_id,
                tag.normalized_name,
                tag.table_name,
                tag.source_type,
                tag.display_name,
            ],
            |row| row.get(0),
        )?;
        debug!("Registry row {} for {}", id, tag.node_id);
        Ok(id)
    }

    fn registered_tags(&self, table: &str) -> StorageResult<Vec<TagDescriptor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, node_id, normalized_name, table_name, source_type, display_name
             FROM {REGISTRY_TABLE} WHERE table_name = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![table], |row| {
            Ok(TagDescriptor {
                id: row.get(0)?,
                node_id: row.get(1)?,
                normalized_name: row.get(2)?,
                table_name: row.get(3)?,
                source_type: row.get(4)?,
                display_name: row.get(5)?,
            })
        })?;
        let tags = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn insert_row(
        &self,
        table: &str,
        values: &BTreeMap<String, TagValue>,
        captured_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        check_data_table(table)?;
        for name in values.keys() {
            check_identifier(name)?;
        }

        let mut columns = vec![CAPTURED_AT_COLUMN.to_string()];
        columns.extend(values.keys().map(|k| format!("\"{k}\"")));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        let mut bound = Vec::with_capacity(columns.len());
        bound.push(Value::Text(captured_at.to_rfc3339()));
        bound.extend(values.values().map(to_sql_value));

        let sql = format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let conn = self.conn()?;
        conn.execute(&sql, params_from_iter(bound))?;
        debug!("Inserted row with {} values into {}", values.len(), table);
        Ok(())
    }

    fn row_count(&self, table: &str) -> StorageResult<u64> {
        check_data_table(table)?;
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn list_tables(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt.query_map([], |row| row.get(0))?;
        let names = names.collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn list_databases(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("PRAGMA database_list")?;
        let names = stmt.query_map([], |row| row.get(1))?;
        let names = names.collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}
