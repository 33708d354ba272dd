//! Tests for equipment replication.

mod common;

use chrono::{DateTime, Utc};
use common::{TABLE, plant, selection, store, tag_id};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;
use tagsync_engine::{
    DEFAULT_EQUIPMENT_PATTERN, EngineError, EquipmentPattern, EquipmentReplicator, ErrorStatus,
    InstanceCode, SchemaSynchronizer, derive_table_name, substitute,
};
use tagsync_storage::{SqliteTagStore, StorageError, StorageResult, TagStore};
use tagsync_types::{ColumnSpec, TagDescriptor, TagValue};

fn pattern() -> EquipmentPattern {
    EquipmentPattern::new(DEFAULT_EQUIPMENT_PATTERN).unwrap()
}

fn replicator(store: Arc<dyn TagStore>) -> EquipmentReplicator {
    let sync = Arc::new(SchemaSynchronizer::new(plant(), store));
    EquipmentReplicator::new(sync, pattern(), 100)
}

/// Delegates to SQLite but refuses to create one table.
struct FailOn {
    inner: SqliteTagStore,
    table: &'static str,
}

impl TagStore for FailOn {
    fn ensure_registry_table(&self) -> StorageResult<()> {
        self.inner.ensure_registry_table()
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        self.inner.table_exists(name)
    }

    fn create_table(&self, name: &str, columns: &[ColumnSpec]) -> StorageResult<bool> {
        if name == self.table {
            return Err(StorageError::ReservedName(name.to_string()));
        }
        self.inner.create_table(name, columns)
    }

    fn add_missing_columns(
        &self,
        table: &str,
        columns: &[ColumnSpec],
    ) -> StorageResult<Vec<String>> {
        self.inner.add_missing_columns(table, columns)
    }

    fn upsert_registry_row(&self, tag: &TagDescriptor) -> StorageResult<i64> {
        self.inner.upsert_registry_row(tag)
    }

    fn registered_tags(&self, table: &str) -> StorageResult<Vec<TagDescriptor>> {
        self.inner.registered_tags(table)
    }

    fn insert_row(
        &self,
        table: &str,
        values: &BTreeMap<String, TagValue>,
        captured_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.inner.insert_row(table, values, captured_at)
    }

    fn row_count(&self, table: &str) -> StorageResult<u64> {
        self.inner.row_count(table)
    }

    fn list_tables(&self) -> StorageResult<Vec<String>> {
        self.inner.list_tables()
    }

    fn list_databases(&self) -> StorageResult<Vec<String>> {
        self.inner.list_databases()
    }
}

// ── Code extraction ─────────────────────────────────────────────

#[test]
fn extracts_code_and_prefix() {
    let id = tag_id("RO03", "Motor");
    let code = pattern().extract_code([id.as_str()]).unwrap();
    assert_eq!(
        code,
        InstanceCode {
            code: "RO03".into(),
            prefix: "RO".into()
        }
    );
}

#[test]
fn first_matching_identifier_wins() {
    let ids = [
        "ns=2;s=Plant.Status".to_string(),
        tag_id("AB12", "Motor"),
        tag_id("RO03", "Motor"),
    ];
    let code = pattern()
        .extract_code(ids.iter().map(String::as_str))
        .unwrap();
    assert_eq!(code.code, "AB12");
}

#[test]
fn short_codes_are_ignored() {
    let ids = [tag_id("A1", "Motor"), tag_id("RO03", "Motor")];
    let code = pattern()
        .extract_code(ids.iter().map(String::as_str))
        .unwrap();
    assert_eq!(code.code, "RO03");
    assert_eq!(InstanceCode::parse("A1"), None);
    assert_eq!(InstanceCode::parse("123"), None);
}

#[test]
fn no_match_yields_none() {
    assert_eq!(pattern().extract_code(["ns=2;s=Plant.Status"]), None);
}

#[test]
fn invalid_pattern_is_rejected() {
    assert!(matches!(
        EquipmentPattern::new("(unclosed"),
        Err(EngineError::InvalidInput(_))
    ));
}

#[test]
fn instance_codes_are_zero_padded() {
    let code = InstanceCode::parse("RO03").unwrap();
    assert_eq!(code.for_instance(4), "RO04");
    assert_eq!(code.for_instance(12), "RO12");
    assert_eq!(code.for_instance(100), "RO100");
}

#[test]
fn table_names_and_substitution() {
    assert_eq!(derive_table_name("line1", "RO04"), "line1_ro04");
    assert_eq!(derive_table_name("Line 1", "RO04"), "line_1_ro04");
    assert_eq!(
        substitute(&tag_id("RO03", "Motor"), "RO03", "RO05"),
        tag_id("RO05", "Motor")
    );
}

// ── Planning ────────────────────────────────────────────────────

#[test]
fn plan_validates_request() {
    let replicator = replicator(store());
    let tags = selection("RO03", TABLE);

    let err = replicator.plan(&tags, TABLE, 5, 4).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = replicator.plan(&[], TABLE, 4, 5).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = replicator.plan(&tags, TABLE, 1, 101).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[test]
fn plan_retargets_every_tag() {
    let replicator = replicator(store());
    let tags = selection("RO03", TABLE);

    let plans = replicator.plan(&tags, TABLE, 4, 5).unwrap();

    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].code, "RO04");
    assert_eq!(plans[0].table_name, "line1_ro04");
    assert_eq!(plans[1].table_name, "line1_ro05");
    let speed = &plans[0].tags[1];
    assert_eq!(speed.node_id, tag_id("RO04", "Speed"));
    assert_eq!(speed.normalized_name, "tag_001_ro04_acionamento_speed");
    assert_eq!(speed.source_type.as_deref(), Some("Double"));
    assert_eq!(speed.table_name, "line1_ro04");
}

// ── Replication ─────────────────────────────────────────────────

#[tokio::test]
async fn replicates_into_one_table_per_instance() {
    let store = store();
    let replicator = replicator(store.clone());

    let tables = replicator
        .replicate(&selection("RO03", TABLE), TABLE, 4, 5)
        .await
        .unwrap();

    assert_eq!(tables, vec!["line1_ro04", "line1_ro05"]);
    for (code, table) in [("RO04", "line1_ro04"), ("RO05", "line1_ro05")] {
        let registered = store.registered_tags(table).unwrap();
        assert_eq!(registered.len(), 3);
        assert!(registered.iter().all(|t| t.node_id.contains(code)));
        assert_eq!(registered[1].display_name.as_deref(), Some("Speed"));
        assert_eq!(registered[1].source_type.as_deref(), Some("Double"));
        assert_eq!(store.row_count(table).unwrap(), 1);
    }
    assert!(!store.table_exists(TABLE).unwrap());
}

#[tokio::test]
async fn missing_code_fails_before_any_store_call() {
    let store = store();
    let replicator = replicator(store.clone());
    let tags = vec![TagDescriptor::new("ns=2;s=Plant.Status", TABLE)];

    let err = replicator.replicate(&tags, TABLE, 4, 5).await.unwrap_err();

    assert!(matches!(err, EngineError::Replication(_)));
    assert_eq!(err.status(), ErrorStatus::BadRequest);
    assert!(store.list_tables().unwrap().is_empty());
}

#[tokio::test]
async fn first_failure_aborts_the_rest() {
    let failing = Arc::new(FailOn {
        inner: SqliteTagStore::open_in_memory().unwrap(),
        table: "line1_ro05",
    });
    let replicator = replicator(failing.clone());

    let err = replicator
        .replicate(&selection("RO03", TABLE), TABLE, 4, 6)
        .await
        .unwrap_err();

    match &err {
        EngineError::ReplicaFailed { table, source } => {
            assert_eq!(table, "line1_ro05");
            assert!(matches!(**source, EngineError::Storage { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.status(), ErrorStatus::Internal);
    assert!(failing.table_exists("line1_ro04").unwrap());
    assert!(!failing.table_exists("line1_ro06").unwrap());
}
