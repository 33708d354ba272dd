#![allow(dead_code)]

use std::sync::Arc;
use tagsync_engine::source::mock::MockNodeSource;
use tagsync_storage::SqliteTagStore;
use tagsync_types::{TagDescriptor, TagValue};
use tracing_subscriber::EnvFilter;

pub const ROOT: &str = "ns=2;s=Plant";
pub const TABLE: &str = "line1";

/// Routes engine logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `ns=2;s="001-RO03-Acionamento"`
pub fn equipment(code: &str) -> String {
    format!("ns=2;s=\"001-{code}-Acionamento\"")
}

/// `ns=2;s="001-RO03-Acionamento"."Speed"`
pub fn tag_id(code: &str, name: &str) -> String {
    format!("ns=2;s=\"001-{code}-Acionamento\".\"{name}\"")
}

/// Plant root with three drives, each carrying Motor, Speed and Count.
pub fn plant() -> Arc<MockNodeSource> {
    let source = MockNodeSource::new();
    for code in ["RO03", "RO04", "RO05"] {
        let folder = equipment(code);
        source.add_object(ROOT, &folder, code);
        let variables = [
            ("Motor", "Boolean", TagValue::Bool(true)),
            ("Speed", "Double", TagValue::Float(12.5)),
            ("Count", "Int32", TagValue::Int(7)),
        ];
        for (name, ty, value) in variables {
            source.add_variable(&folder, &tag_id(code, name), name, ty, value);
        }
    }
    Arc::new(source)
}

pub fn store() -> Arc<SqliteTagStore> {
    Arc::new(SqliteTagStore::open_in_memory().unwrap())
}

pub fn selection(code: &str, table: &str) -> Vec<TagDescriptor> {
    [("Motor", "Boolean"), ("Speed", "Double"), ("Count", "Int32")]
        .into_iter()
        .map(|(name, ty)| TagDescriptor::new(tag_id(code, name), table).with_source_type(ty))
        .collect()
}
