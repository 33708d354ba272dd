//! Per-root cache of browsed subtrees.
//!
//! Each root id owns one slot guarded by its own async mutex, so concurrent
//! lookups for the same root wait for a single browse while different roots
//! proceed in parallel. Cached snapshots never carry selection marks: every
//! caller receives a deep copy with all `selected` flags cleared, cut to the
//! depth it asked for.
//!
//! Every miss also sweeps expired snapshots, and a root whose first browse
//! fails gets no slot, so the map only holds roots that were browsed
//! successfully within the TTL.

use crate::error::EngineResult;
use crate::schema::run_store;
use crate::source::NodeSource;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tagsync_storage::TagStore;
use tagsync_types::{NodeTreeEntry, normalize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

/// How a lookup was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLookup {
    /// Served from a live snapshot.
    Hit,
    /// No live snapshot; the source was browsed.
    Miss,
    /// The caller forced a browse.
    Refreshed,
}

impl CacheLookup {
    pub fn from_cache(self) -> bool {
        self == CacheLookup::Hit
    }
}

/// Entries returned by [`NodeTreeCache::get`].
#[derive(Debug, Clone)]
pub struct CachedBrowse {
    pub entries: Vec<NodeTreeEntry>,
    pub lookup: CacheLookup,
}

#[derive(Debug)]
struct Snapshot {
    entries: Vec<NodeTreeEntry>,
    depth: u32,
    last_access: Instant,
}

impl Snapshot {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.last_access) < ttl
    }

    /// Unmarked copy of the entries, at most `depth` levels deep.
    fn copy_entries(&self, depth: u32) -> Vec<NodeTreeEntry> {
        self.entries
            .iter()
            .map(|entry| {
                let mut copy = entry.cleared_clone();
                prune(&mut copy, depth);
                copy
            })
            .collect()
    }
}

/// Drops children below `depth`; `has_children` is kept.
fn prune(entry: &mut NodeTreeEntry, depth: u32) {
    if depth <= 1 {
        entry.children.clear();
        return;
    }
    for child in &mut entry.children {
        prune(child, depth - 1);
    }
}

type Slot = Arc<Mutex<Option<Snapshot>>>;

/// Cache of browsed subtrees keyed by root node id.
pub struct NodeTreeCache {
    source: Arc<dyn NodeSource>,
    store: Arc<dyn TagStore>,
    ttl: Duration,
    slots: RwLock<HashMap<String, Slot>>,
}

impl NodeTreeCache {
    pub fn new(source: Arc<dyn NodeSource>, store: Arc<dyn TagStore>, ttl: Duration) -> Self {
        Self {
            source,
            store,
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the subtree under `root_id`.
    ///
    /// A live snapshot browsed at least `max_depth` deep is served from the
    /// cache and its expiry is pushed back. Otherwise the source is browsed
    /// and the snapshot replaced. Either way the entries are cut to
    /// `max_depth` levels.
    ///
    /// A failed browse keeps an existing snapshot; a root that never
    /// browsed successfully is dropped from the cache.
    pub async fn get(
        &self,
        root_id: &str,
        max_depth: u32,
        force_refresh: bool,
    ) -> EngineResult<CachedBrowse> {
        let key = root_id.trim();
        let slot = self.slot(key).await;
        let mut guard = slot.lock().await;

        let now = Instant::now();
        if !force_refresh {
            if let Some(snapshot) = (*guard).as_mut() {
                if snapshot.is_live(now, self.ttl) && snapshot.depth >= max_depth {
                    snapshot.last_access = now;
                    debug!("Cache hit for {}", key);
                    return Ok(CachedBrowse {
                        entries: snapshot.copy_entries(max_depth),
                        lookup: CacheLookup::Hit,
                    });
                }
            }
        }

        let fetched = match self.source.browse(key, max_depth).await {
            Ok(fetched) => fetched,
            Err(e) => {
                let empty = guard.is_none();
                drop(guard);
                if empty {
                    self.discard_empty(key, &slot).await;
                }
                return Err(e);
            }
        };
        let snapshot = Snapshot {
            entries: fetched.iter().map(NodeTreeEntry::cleared_clone).collect(),
            depth: max_depth,
            last_access: Instant::now(),
        };
        let entries = snapshot.copy_entries(max_depth);
        debug!("Cached {} top-level entries for {}", entries.len(), key);
        *guard = Some(snapshot);
        drop(guard);

        let purged = self.purge_expired().await;
        if purged > 0 {
            debug!("Purged {} expired roots", purged);
        }

        Ok(CachedBrowse {
            entries,
            lookup: if force_refresh {
                CacheLookup::Refreshed
            } else {
                CacheLookup::Miss
            },
        })
    }

    /// Marks every leaf whose normalized id is already registered for
    /// `table_name`. Returns the number of marked entries.
    ///
    /// Registry failures are logged and leave the entries unmarked.
    pub async fn annotate(&self, entries: &mut [NodeTreeEntry], table_name: &str) -> usize {
        let table = normalize(table_name);
        let lookup = table.clone();
        let registered = match run_store(&self.store, &table, move |s| s.registered_tags(&lookup))
            .await
        {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Could not load registered tags for {}: {}", table, e);
                return 0;
            }
        };
        let persisted: HashSet<String> = registered
            .into_iter()
            .map(|t| t.normalized_name)
            .collect();

        let mut marked = 0;
        for entry in entries.iter_mut() {
            entry.walk_mut(&mut |node| {
                if node.is_leaf() && persisted.contains(&normalize(&node.node_id)) {
                    node.selected = true;
                    marked += 1;
                }
            });
        }
        marked
    }

    /// Drops the snapshot for one root.
    pub async fn invalidate(&self, root_id: &str) {
        let removed = self.slots.write().await.remove(root_id.trim());
        if removed.is_some() {
            debug!("Invalidated cache for {}", root_id.trim());
        }
    }

    /// Drops every snapshot.
    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }

    /// Removes expired snapshots. Slots busy with a browse are skipped.
    /// Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => (*guard).as_ref().is_some_and(|s| s.is_live(now, self.ttl)),
            Err(_) => true,
        });
        before - slots.len()
    }

    /// Number of roots with a slot, live or not.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes `slot` if it is still the one mapped to `key` and nobody has
    /// filled or locked it since.
    async fn discard_empty(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.write().await;
        let Some(current) = slots.get(key) else {
            return;
        };
        if !Arc::ptr_eq(current, slot) {
            return;
        }
        let unused = slot.try_lock().is_ok_and(|guard| guard.is_none());
        if unused {
            slots.remove(key);
            debug!("Dropped cache slot for {} after a failed browse", key);
        }
    }

    async fn slot(&self, key: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key.to_string()).or_default())
    }
}
