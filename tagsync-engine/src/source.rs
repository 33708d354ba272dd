//! Industrial protocol collaborator.
//!
//! The engine never speaks the wire protocol itself. Everything it needs
//! from the device side goes through [`NodeSource`], so the sync logic can
//! be driven by a real client or by [`mock::MockNodeSource`] in tests.

use crate::error::EngineResult;
use async_trait::async_trait;
use tagsync_types::{NodeTreeEntry, TagValue};

/// Address-space access on the protocol endpoint.
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// Opens a session to the endpoint. Returns whether it is now connected.
    async fn connect(&self, endpoint_url: &str) -> EngineResult<bool>;

    /// Closes the session, if any.
    async fn disconnect(&self) -> EngineResult<()>;

    /// Browses the subtree under `node_id`, at most `depth` levels deep.
    async fn browse(&self, node_id: &str, depth: u32) -> EngineResult<Vec<NodeTreeEntry>>;

    /// Reads the current value of a variable.
    async fn read_value(&self, node_id: &str) -> EngineResult<TagValue>;

    /// Writes a value to a variable. Returns whether the device accepted it.
    async fn write_value(&self, node_id: &str, value: TagValue) -> EngineResult<bool>;

    /// Human-readable name of a node, if the endpoint knows it.
    async fn resolve_display_name(&self, node_id: &str) -> Option<String>;

    /// Declared data type of a variable (e.g. `Int32` or `i=6`).
    async fn resolve_declared_type(&self, node_id: &str) -> Option<String>;
}

/// A scripted in-memory address space for testing.
pub mod mock {
    use super::*;
    use crate::error::EngineError;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Variable {
        display_name: String,
        data_type: String,
        value: TagValue,
    }

    /// A mock node source.
    ///
    /// Children are registered per parent id; `browse` rebuilds the tree
    /// from those links down to the requested depth.
    #[derive(Debug, Default)]
    pub struct MockNodeSource {
        children: Mutex<HashMap<String, Vec<NodeTreeEntry>>>,
        variables: Mutex<HashMap<String, Variable>>,
        failing_reads: Mutex<HashSet<String>>,
        writes: Mutex<Vec<(String, TagValue)>>,
        browse_delay: Mutex<Option<Duration>>,
        refuse_connect: AtomicBool,
        connected: AtomicBool,
        browse_calls: AtomicUsize,
        read_calls: AtomicUsize,
    }

    impl MockNodeSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers an object folder under `parent`.
        pub fn add_object(&self, parent: &str, node_id: &str, display_name: &str) {
            let entry = NodeTreeEntry::object(node_id, display_name);
            self.children
                .lock()
                .unwrap()
                .entry(parent.to_string())
                .or_default()
                .push(entry);
        }

        /// Registers a variable under `parent` with its type and current value.
        pub fn add_variable(
            &self,
            parent: &str,
            node_id: &str,
            display_name: &str,
            data_type: &str,
            value: TagValue,
        ) {
            let entry =
                NodeTreeEntry::variable(node_id, display_name, data_type).with_value(value.clone());
            self.children
                .lock()
                .unwrap()
                .entry(parent.to_string())
                .or_default()
                .push(entry);
            self.variables.lock().unwrap().insert(
                node_id.to_string(),
                Variable {
                    display_name: display_name.to_string(),
                    data_type: data_type.to_string(),
                    value,
                },
            );
        }

        /// Makes every read of `node_id` fail.
        pub fn fail_reads_of(&self, node_id: &str) {
            self.failing_reads
                .lock()
                .unwrap()
                .insert(node_id.to_string());
        }

        /// Makes `connect` report that the endpoint refused the session.
        pub fn refuse_connections(&self) {
            self.refuse_connect.store(true, Ordering::SeqCst);
        }

        /// Delays every browse, to widen race windows in tests.
        pub fn set_browse_delay(&self, delay: Duration) {
            *self.browse_delay.lock().unwrap() = Some(delay);
        }

        pub fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        pub fn browse_calls(&self) -> usize {
            self.browse_calls.load(Ordering::SeqCst)
        }

        pub fn read_calls(&self) -> usize {
            self.read_calls.load(Ordering::SeqCst)
        }

        /// Values written so far, in order.
        pub fn writes(&self) -> Vec<(String, TagValue)> {
            self.writes.lock().unwrap().clone()
        }

        fn subtree(
            children: &HashMap<String, Vec<NodeTreeEntry>>,
            node_id: &str,
            depth: u32,
        ) -> Vec<NodeTreeEntry> {
            let Some(direct) = children.get(node_id) else {
                return Vec::new();
            };
            direct
                .iter()
                .map(|child| {
                    let mut entry = child.clone();
                    entry.has_children = children.contains_key(&child.node_id);
                    if depth > 1 {
                        entry.children = Self::subtree(children, &child.node_id, depth - 1);
                    }
                    entry
                })
                .collect()
        }
    }

    #[async_trait]
    impl NodeSource for MockNodeSource {
        async fn connect(&self, endpoint_url: &str) -> EngineResult<bool> {
            if endpoint_url.trim().is_empty() {
                return Err(EngineError::source_failure(endpoint_url, "empty endpoint url"));
            }
            let accepted = !self.refuse_connect.load(Ordering::SeqCst);
            self.connected.store(accepted, Ordering::SeqCst);
            Ok(accepted)
        }

        async fn disconnect(&self) -> EngineResult<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn browse(&self, node_id: &str, depth: u32) -> EngineResult<Vec<NodeTreeEntry>> {
            self.browse_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.browse_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let children = self.children.lock().unwrap();
            if !children.contains_key(node_id) {
                return Err(EngineError::source_failure(node_id, "unknown node"));
            }
            Ok(Self::subtree(&children, node_id, depth.max(1)))
        }

        async fn read_value(&self, node_id: &str) -> EngineResult<TagValue> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_reads.lock().unwrap().contains(node_id) {
                return Err(EngineError::source_failure(node_id, "bad node id"));
            }
            self.variables
                .lock()
                .unwrap()
                .get(node_id)
                .map(|v| v.value.clone())
                .ok_or_else(|| EngineError::source_failure(node_id, "not a variable"))
        }

        async fn write_value(&self, node_id: &str, value: TagValue) -> EngineResult<bool> {
            let mut variables = self.variables.lock().unwrap();
            let Some(variable) = variables.get_mut(node_id) else {
                return Ok(false);
            };
            variable.value = value.clone();
            self.writes
                .lock()
                .unwrap()
                .push((node_id.to_string(), value));
            Ok(true)
        }

        async fn resolve_display_name(&self, node_id: &str) -> Option<String> {
            self.variables
                .lock()
                .unwrap()
                .get(node_id)
                .map(|v| v.display_name.clone())
        }

        async fn resolve_declared_type(&self, node_id: &str) -> Option<String> {
            self.variables
                .lock()
                .unwrap()
                .get(node_id)
                .map(|v| v.data_type.clone())
        }
    }
}
