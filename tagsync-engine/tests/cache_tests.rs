//! Tests for the per-root browse cache.

mod common;

use common::{ROOT, TABLE, equipment, plant, store, tag_id};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tagsync_engine::{CacheLookup, EngineError, ErrorStatus, NodeTreeCache};
use tagsync_storage::TagStore;
use tagsync_types::TagDescriptor;

const TTL: Duration = Duration::from_secs(60);

fn cache_with(source: &Arc<tagsync_engine::source::mock::MockNodeSource>) -> NodeTreeCache {
    NodeTreeCache::new(source.clone(), store(), TTL)
}

// ── Lookups ─────────────────────────────────────────────────────

#[tokio::test]
async fn second_get_is_served_from_cache() {
    let source = plant();
    let cache = cache_with(&source);

    let first = cache.get(ROOT, 2, false).await.unwrap();
    let second = cache.get(ROOT, 2, false).await.unwrap();

    assert_eq!(first.lookup, CacheLookup::Miss);
    assert_eq!(second.lookup, CacheLookup::Hit);
    assert_eq!(first.entries, second.entries);
    assert_eq!(source.browse_calls(), 1);
}

#[tokio::test]
async fn force_refresh_browses_again() {
    let source = plant();
    let cache = cache_with(&source);

    cache.get(ROOT, 2, false).await.unwrap();
    let refreshed = cache.get(ROOT, 2, true).await.unwrap();

    assert_eq!(refreshed.lookup, CacheLookup::Refreshed);
    assert!(!refreshed.lookup.from_cache());
    assert_eq!(source.browse_calls(), 2);
}

#[tokio::test]
async fn root_id_is_trimmed() {
    let source = plant();
    let cache = cache_with(&source);

    cache.get(ROOT, 2, false).await.unwrap();
    let hit = cache.get(&format!("  {ROOT} "), 2, false).await.unwrap();
    assert_eq!(hit.lookup, CacheLookup::Hit);
}

#[tokio::test]
async fn deeper_request_misses_shallow_snapshot() {
    let source = plant();
    let cache = cache_with(&source);

    let shallow = cache.get(ROOT, 1, false).await.unwrap();
    assert!(shallow.entries.iter().all(|e| e.children.is_empty()));
    assert!(shallow.entries.iter().all(|e| e.has_children));

    let deep = cache.get(ROOT, 2, false).await.unwrap();
    assert_eq!(deep.lookup, CacheLookup::Miss);
    assert_eq!(deep.entries[0].children.len(), 3);

    let shallow_again = cache.get(ROOT, 1, false).await.unwrap();
    assert_eq!(shallow_again.lookup, CacheLookup::Hit);
    assert_eq!(shallow_again.entries, shallow.entries);
    assert_eq!(source.browse_calls(), 2);
}

#[tokio::test]
async fn hit_on_deeper_snapshot_is_cut_to_requested_depth() {
    let source = plant();
    let cache = cache_with(&source);

    let deep = cache.get(ROOT, 3, false).await.unwrap();
    assert_eq!(deep.entries[0].children.len(), 3);

    let top = cache.get(ROOT, 1, false).await.unwrap();
    assert_eq!(top.lookup, CacheLookup::Hit);
    assert_eq!(top.entries.len(), 3);
    assert!(top.entries.iter().all(|e| e.children.is_empty() && e.has_children));

    let two = cache.get(ROOT, 2, false).await.unwrap();
    assert_eq!(two.lookup, CacheLookup::Hit);
    assert_eq!(two.entries, deep.entries);
    assert_eq!(source.browse_calls(), 1);
}

#[tokio::test]
async fn unknown_root_is_source_error() {
    let cache = cache_with(&plant());
    let err = cache.get("ns=2;s=Nowhere", 2, false).await.unwrap_err();
    assert!(matches!(err, EngineError::Source { .. }));
    assert_eq!(err.status(), ErrorStatus::Internal);
}

#[tokio::test]
async fn failed_first_browse_leaves_no_slot() {
    let source = plant();
    let cache = cache_with(&source);

    for n in 0..5 {
        let root = format!("ns=2;s=Nowhere{n}");
        assert!(cache.get(&root, 2, false).await.is_err());
    }
    assert!(cache.is_empty().await);

    cache.get(ROOT, 2, false).await.unwrap();
    assert!(cache.get("ns=2;s=Nowhere", 2, true).await.is_err());
    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.get(ROOT, 2, false).await.unwrap().lookup, CacheLookup::Hit);
}

// ── Isolation ───────────────────────────────────────────────────

#[tokio::test]
async fn returned_entries_are_independent_copies() {
    let cache = cache_with(&plant());

    let mut first = cache.get(ROOT, 2, false).await.unwrap().entries;
    first[0].selected = true;
    first[0].display_name = "renamed".into();
    first[0].children[0].selected = true;
    first[0].children.clear();

    let second = cache.get(ROOT, 2, false).await.unwrap().entries;
    assert_eq!(second[0].display_name, "RO03");
    assert_eq!(second[0].children.len(), 3);
    assert!(second.iter().all(|e| !e.selected));
    assert!(second[0].children.iter().all(|c| !c.selected));
}

#[tokio::test]
async fn annotation_never_leaks_into_cache() {
    let source = plant();
    let store = store();
    store.ensure_registry_table().unwrap();
    store
        .upsert_registry_row(&TagDescriptor::new(tag_id("RO03", "Speed"), TABLE))
        .unwrap();
    let cache = NodeTreeCache::new(source, store, TTL);

    let mut annotated = cache.get(ROOT, 2, false).await.unwrap().entries;
    assert_eq!(cache.annotate(&mut annotated, TABLE).await, 1);

    let fresh = cache.get(ROOT, 2, false).await.unwrap().entries;
    assert!(fresh[0].children.iter().all(|c| !c.selected));
}

// ── Expiry ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn expired_snapshot_is_browsed_again() {
    let source = plant();
    let cache = cache_with(&source);

    cache.get(ROOT, 2, false).await.unwrap();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    let after = cache.get(ROOT, 2, false).await.unwrap();

    assert_eq!(after.lookup, CacheLookup::Miss);
    assert_eq!(source.browse_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn access_extends_expiry() {
    let source = plant();
    let cache = cache_with(&source);

    cache.get(ROOT, 2, false).await.unwrap();
    tokio::time::advance(Duration::from_secs(40)).await;
    assert_eq!(cache.get(ROOT, 2, false).await.unwrap().lookup, CacheLookup::Hit);
    tokio::time::advance(Duration::from_secs(40)).await;
    assert_eq!(cache.get(ROOT, 2, false).await.unwrap().lookup, CacheLookup::Hit);
    assert_eq!(source.browse_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn purge_drops_only_expired_roots() {
    let cache = cache_with(&plant());

    cache.get(ROOT, 2, false).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    cache.get(&equipment("RO03"), 1, false).await.unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;

    assert_eq!(cache.len().await, 2);
    assert_eq!(cache.purge_expired().await, 1);
    assert_eq!(cache.len().await, 1);
    assert_eq!(
        cache.get(&equipment("RO03"), 1, false).await.unwrap().lookup,
        CacheLookup::Hit
    );
}

#[tokio::test(start_paused = true)]
async fn miss_sweeps_expired_roots() {
    let source = plant();
    let cache = cache_with(&source);

    cache.get(ROOT, 2, false).await.unwrap();
    cache.get(&equipment("RO04"), 1, false).await.unwrap();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    cache.get(&equipment("RO03"), 1, false).await.unwrap();

    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.get(ROOT, 2, false).await.unwrap().lookup, CacheLookup::Miss);
    assert_eq!(source.browse_calls(), 4);
}

// ── Concurrency ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_gets_for_same_root_browse_once() {
    let source = plant();
    source.set_browse_delay(Duration::from_millis(50));
    let cache = cache_with(&source);

    let (a, b) = tokio::join!(cache.get(ROOT, 2, false), cache.get(ROOT, 2, false));
    let lookups = [a.unwrap().lookup, b.unwrap().lookup];

    assert_eq!(source.browse_calls(), 1);
    assert!(lookups.contains(&CacheLookup::Miss));
    assert!(lookups.contains(&CacheLookup::Hit));
}

#[tokio::test]
async fn invalidate_and_clear() {
    let source = plant();
    let cache = cache_with(&source);

    cache.get(ROOT, 2, false).await.unwrap();
    cache.get(&equipment("RO04"), 1, false).await.unwrap();

    cache.invalidate(ROOT).await;
    assert_eq!(cache.get(ROOT, 2, false).await.unwrap().lookup, CacheLookup::Miss);

    cache.clear().await;
    assert!(cache.is_empty().await);
    assert_eq!(source.browse_calls(), 3);
}

// ── Annotation ──────────────────────────────────────────────────

#[tokio::test]
async fn annotate_marks_registered_leaves_only() {
    let store = store();
    store.ensure_registry_table().unwrap();
    store
        .upsert_registry_row(&TagDescriptor::new(tag_id("RO03", "Speed"), TABLE))
        .unwrap();
    // The folder itself is registered too, but it is not a leaf.
    store
        .upsert_registry_row(&TagDescriptor::new(equipment("RO03"), TABLE))
        .unwrap();
    // Same node under another table does not count.
    store
        .upsert_registry_row(&TagDescriptor::new(tag_id("RO04", "Speed"), "other"))
        .unwrap();
    let cache = NodeTreeCache::new(plant(), store, TTL);

    let mut entries = cache.get(ROOT, 2, false).await.unwrap().entries;
    let marked = cache.annotate(&mut entries, TABLE).await;

    assert_eq!(marked, 1);
    let ro03 = &entries[0];
    assert!(!ro03.selected);
    let speed = ro03.find(&tag_id("RO03", "Speed")).unwrap();
    assert!(speed.selected);
    let motor = ro03.find(&tag_id("RO03", "Motor")).unwrap();
    assert!(!motor.selected);
    assert!(entries[1].children.iter().all(|c| !c.selected));
}

#[tokio::test]
async fn annotate_without_registry_marks_nothing() {
    let cache = cache_with(&plant());
    let mut entries = cache.get(ROOT, 2, false).await.unwrap().entries;
    assert_eq!(cache.annotate(&mut entries, TABLE).await, 0);
}
