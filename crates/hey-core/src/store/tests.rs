//! Tests for the store module.

use super::*;
use crate::context::{Message, Role};
use crate::safe_io::atomic_write;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_store() -> (ContextStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = ContextStore::open(temp_dir.path().to_path_buf()).unwrap();
    (store, temp_dir)
}

fn ids(entries: &[IndexEntry]) -> Vec<u64> {
    entries.iter().map(|e| e.id.get()).collect()
}

/// Push a file's mtime into the future, as if it had been written after the index.
fn bump_mtime(path: &Path) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

// === Records ===

#[test]
fn test_create_allocates_sequential_ids() {
    let (store, _temp) = create_test_store();
    let a = store.create(Some("a".into()), "default").unwrap();
    let b = store.create(None, "default").unwrap();
    assert_eq!(a.id, ContextId::new(1));
    assert_eq!(b.id, ContextId::new(2));
    assert!(store.exists(b.id));
}

#[test]
fn test_create_with_prompt_seeds_messages() {
    let (store, _temp) = create_test_store();
    let record = store
        .create_with_prompt(None, "terse", vec![Message::system("Be terse.")])
        .unwrap();
    let loaded = store.load(record.id).unwrap();
    assert_eq!(loaded.messages.len(), 1);
    assert_eq!(loaded.messages.as_slice()[0].role, Role::System);
    assert_eq!(loaded.profile, "terse");
}

#[test]
fn test_save_load_round_trip() {
    let (store, _temp) = create_test_store();
    let mut record = store.create(Some("Trip Planning".into()), "default").unwrap();
    record.messages.push(Message::user("book flights to Tokyo"));
    record.messages.push(Message::partial_assistant("Sure, which"));
    record.touch();
    store.save(&record).unwrap();

    assert_eq!(store.load(record.id).unwrap(), record);
}

#[test]
fn test_load_missing_is_not_found() {
    let (store, _temp) = create_test_store();
    let err = store.load(ContextId::new(42)).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == ContextId::new(42)));
}

#[test]
fn test_load_corrupt_record() {
    let (store, _temp) = create_test_store();
    atomic_write(&store.record_file(ContextId::new(3)), b"{ not json").unwrap();
    assert!(matches!(
        store.load(ContextId::new(3)),
        Err(StoreError::Corrupt { .. })
    ));
}

#[test]
fn test_rename_updates_record_and_index() {
    let (store, _temp) = create_test_store();
    let record = store.create(Some("old".into()), "default").unwrap();
    store.rename(record.id, "new title").unwrap();

    assert_eq!(store.load(record.id).unwrap().title.as_deref(), Some("new title"));
    let listed = store.list(None).unwrap();
    assert_eq!(listed[0].title.as_deref(), Some("new title"));
}

#[test]
fn test_rename_missing_is_not_found() {
    let (store, _temp) = create_test_store();
    assert!(matches!(
        store.rename(ContextId::new(9), "x"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_delete_removes_record_and_entry() {
    let (store, _temp) = create_test_store();
    let a = store.create(None, "default").unwrap();
    let b = store.create(None, "default").unwrap();
    store.delete(a.id).unwrap();

    assert!(!store.exists(a.id));
    assert_eq!(ids(&store.list(None).unwrap()), vec![b.id.get()]);
    assert!(matches!(store.delete(a.id), Err(StoreError::NotFound(_))));
}

#[test]
fn test_delete_active_clears_pointer() {
    let (store, _temp) = create_test_store();
    let a = store.create(None, "default").unwrap();
    let b = store.create(None, "default").unwrap();

    store.set_active(b.id).unwrap();
    store.delete(a.id).unwrap();
    assert_eq!(store.active().unwrap(), Some(b.id));

    store.delete(b.id).unwrap();
    assert_eq!(store.active().unwrap(), None);
    assert!(!store.active_file().exists());
}

#[test]
fn test_ids_not_reused_after_delete_of_older() {
    let (store, _temp) = create_test_store();
    let a = store.create(None, "default").unwrap();
    let b = store.create(None, "default").unwrap();
    store.delete(a.id).unwrap();
    let c = store.create(None, "default").unwrap();
    assert_eq!(Some(c.id), b.id.next());
}

#[test]
fn test_ids_not_reused_after_delete_of_newest() {
    let (store, _temp) = create_test_store();
    store.create(None, "default").unwrap();
    let b = store.create(None, "default").unwrap();
    store.delete(b.id).unwrap();

    let c = store.create(None, "default").unwrap();
    assert_eq!(c.id, ContextId::new(3));

    // A stale index is rebuilt from the records but keeps the high-water mark.
    store.delete(c.id).unwrap();
    bump_mtime(&store.record_file(ContextId::new(1)));
    assert_eq!(ids(&store.list(None).unwrap()), vec![1]);
    assert_eq!(store.create(None, "default").unwrap().id, ContextId::new(4));

    assert_eq!(store.rebuild_index().unwrap(), 2);
    assert_eq!(store.create(None, "default").unwrap().id, ContextId::new(5));
}

#[test]
fn test_concurrent_creates_get_distinct_ids() {
    let (store, _temp) = create_test_store();
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                (0..5)
                    .map(|_| store.create(None, "default").unwrap().id)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all.insert(id), "id {} handed out twice", id);
        }
    }
    assert_eq!(all.len(), 30);
    assert_eq!(store.list(None).unwrap().len(), 30);
}

// === Active pointer ===

#[test]
fn test_set_active_requires_existing_context() {
    let (store, _temp) = create_test_store();
    assert!(matches!(
        store.set_active(ContextId::new(5)),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_active_pointer_to_vanished_context_reads_unset() {
    let (store, _temp) = create_test_store();
    let a = store.create(None, "default").unwrap();
    store.set_active(a.id).unwrap();
    fs::remove_file(store.record_file(a.id)).unwrap();
    assert_eq!(store.active().unwrap(), None);
}

// === Listing ===

#[test]
fn test_list_matches_records_after_mixed_operations() {
    let (store, _temp) = create_test_store();
    let a = store.create(None, "default").unwrap();
    let mut b = store.create(None, "default").unwrap();
    let c = store.create(None, "default").unwrap();
    b.messages.push(Message::user("hi"));
    b.updated_at = b.updated_at + chrono::Duration::minutes(5);
    store.save(&b).unwrap();
    store.delete(c.id).unwrap();

    let listed = store.list(None).unwrap();
    assert_eq!(ids(&listed), vec![b.id.get(), a.id.get()]);
    for entry in &listed {
        assert_eq!(entry.updated_at, store.load(entry.id).unwrap().updated_at);
    }
    assert_eq!(listed[0].message_count, 1);
}

#[test]
fn test_list_ranges_over_ten_contexts() {
    let (store, _temp) = create_test_store();
    let base = crate::context::now_timestamp();
    for i in 1..=10 {
        let mut record = store.create(Some(format!("ctx {}", i)), "default").unwrap();
        record.updated_at = base + chrono::Duration::minutes(i);
        store.save(&record).unwrap();
    }

    let all = store.list(None).unwrap();
    assert_eq!(ids(&all), vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);

    let slice = store.list(Some("2:5".parse().unwrap())).unwrap();
    assert_eq!(ids(&slice), vec![8, 7, 6]);

    let head = store.list(Some(":3".parse().unwrap())).unwrap();
    assert_eq!(ids(&head), vec![10, 9, 8]);

    let tail = store.list(Some("-2:".parse().unwrap())).unwrap();
    assert_eq!(ids(&tail), vec![2, 1]);

    let clamped = store.list(Some("8:50".parse().unwrap())).unwrap();
    assert_eq!(ids(&clamped), vec![2, 1]);
}

// === Self-healing ===

#[test]
fn test_crash_between_record_and_index_write_heals() {
    let (store, _temp) = create_test_store();
    let mut record = store.create(None, "default").unwrap();
    assert_eq!(store.list(None).unwrap()[0].message_count, 0);

    // The record write lands, the process dies before the index write.
    record.messages.push(Message::user("hello"));
    record.messages.push(Message::assistant("hi there"));
    record.touch();
    let path = store.record_file(record.id);
    atomic_write_json(&path, &record).unwrap();
    bump_mtime(&path);

    assert_eq!(store.load(record.id).unwrap(), record);
    let listed = store.list(None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].message_count, 2);
    assert_eq!(listed[0].updated_at, record.updated_at);
}

#[test]
fn test_orphan_record_is_indexed_and_ids_skip_it() {
    let (store, _temp) = create_test_store();
    store.create(None, "default").unwrap();

    let orphan = ContextRecord::new(ContextId::new(50), Some("orphan".into()), "default");
    atomic_write_json(&store.record_file(orphan.id), &orphan).unwrap();

    let listed = store.list(None).unwrap();
    assert!(ids(&listed).contains(&50));
    assert_eq!(store.create(None, "default").unwrap().id, ContextId::new(51));
}

#[test]
fn test_index_entry_without_record_is_dropped() {
    let (store, _temp) = create_test_store();
    let a = store.create(None, "default").unwrap();
    let b = store.create(None, "default").unwrap();
    fs::remove_file(store.record_file(a.id)).unwrap();

    assert_eq!(ids(&store.list(None).unwrap()), vec![b.id.get()]);
}

#[test]
fn test_unreadable_index_is_rebuilt() {
    let (store, _temp) = create_test_store();
    store.create(Some("kept".into()), "default").unwrap();
    atomic_write(&store.index_file(), b"garbage").unwrap();

    let listed = store.list(None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title.as_deref(), Some("kept"));

    let raw = fs::read_to_string(store.index_file()).unwrap();
    assert!(raw.contains("\"version\": 1"));
}

#[test]
fn test_missing_index_is_rebuilt() {
    let (store, _temp) = create_test_store();
    store.create(None, "default").unwrap();
    store.create(None, "default").unwrap();
    fs::remove_file(store.index_file()).unwrap();

    assert_eq!(store.list(None).unwrap().len(), 2);
    assert!(store.index_file().exists());
}

#[test]
fn test_rebuild_skips_corrupt_records() {
    let (store, _temp) = create_test_store();
    store.create(None, "default").unwrap();
    atomic_write(&store.record_file(ContextId::new(7)), b"{").unwrap();

    assert_eq!(store.rebuild_index().unwrap(), 1);
}

// === Search ===

fn seed_search_store() -> (ContextStore, TempDir) {
    let (store, temp) = create_test_store();
    let mut trip = store.create(Some("Trip Planning".into()), "default").unwrap();
    trip.messages.push(Message::user("book flights to Tokyo"));
    store.save(&trip).unwrap();

    let mut other = store.create(Some("Recipes".into()), "default").unwrap();
    other.messages.push(Message::user("how long to boil an egg"));
    store.save(&other).unwrap();
    (store, temp)
}

#[test]
fn test_search_case_insensitive_content() {
    let (store, _temp) = seed_search_store();
    let found = store.search("tokyo").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title.as_deref(), Some("Trip Planning"));
}

#[test]
fn test_search_title() {
    let (store, _temp) = seed_search_store();
    let found = store.search("Trip").unwrap();
    assert_eq!(ids(&found), vec![1]);
}

#[test]
fn test_search_empty_keyword_matches_every_context() {
    let (store, _temp) = seed_search_store();
    let blank = store.create(None, "default").unwrap();

    let found = store.search("").unwrap();
    assert_eq!(ids(&found), ids(&store.list(None).unwrap()));
    assert!(ids(&found).contains(&blank.id.get()));
}

#[test]
fn test_search_no_match() {
    let (store, _temp) = seed_search_store();
    assert!(store.search("Paris").unwrap().is_empty());
}

#[test]
fn test_search_hits_carry_snippets_in_recency_order() {
    let (store, _temp) = seed_search_store();
    let hits = store.search_hits("to").unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].entry.id, ContextId::new(2));
    assert_eq!(hits[1].snippets[0].text, "...k flights to Tokyo");
    assert_eq!(hits[1].snippets[0].role, Role::User);
}
