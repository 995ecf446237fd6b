//! Concurrency E2E tests.
//!
//! Writers on distinct keys must all land; readers run alongside writers
//! against consistent snapshots and always release their searchers.

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;

use e2e_tests::{create_test_groups, uuids, TestHarness};
use entity_index::{GroupIndex, Predicate, QueryOptions};
use entity_types::IndexSettings;

/// N threads replacing N distinct groups: none is lost.
#[test]
fn test_concurrent_writers_distinct_keys() {
    let harness = TestHarness::new();
    let index = Arc::new(harness.open_in_memory());
    let groups = create_test_groups(32, "Worker");
    for group in &groups {
        harness.cache.insert(group.clone());
    }

    let handles: Vec<_> = groups
        .iter()
        .cloned()
        .map(|group| {
            let index = index.clone();
            thread::spawn(move || index.replace(&group))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    index.refresh().unwrap();

    assert_eq!(index.num_docs(), 32);
    let all = index
        .query(&Predicate::any(), QueryOptions::new(0, 100))
        .unwrap();
    let mut expected = uuids(&groups);
    expected.sort();
    assert_eq!(uuids(&all), expected);
}

/// Small batches force many commits; the outcome is the same.
#[test]
fn test_concurrent_writers_small_batches() {
    let harness = TestHarness::new();
    let settings = IndexSettings::in_memory().with_max_batch_size(2);
    let index = Arc::new(GroupIndex::open(&settings, harness.cache.clone()).unwrap());
    let groups = create_test_groups(12, "Batch");

    let handles: Vec<_> = groups
        .chunks(4)
        .map(|chunk| {
            let index = index.clone();
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for group in &chunk {
                    index.replace(group)?;
                }
                // Same-thread writes to one key are applied in order
                index.delete(&chunk[0].uuid)?;
                index.replace(&chunk[0])
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    index.refresh().unwrap();
    assert_eq!(index.num_docs(), 12);
}

/// Readers keep querying while a writer adds groups; every read sees a
/// consistent, sorted snapshot and no searcher is leaked.
#[test]
fn test_readers_alongside_writer() {
    let harness = TestHarness::new();
    let index = Arc::new(harness.open_in_memory());
    let groups = create_test_groups(20, "Stream");
    for group in &groups {
        harness.cache.insert(group.clone());
    }

    let writer = {
        let index = index.clone();
        let groups = groups.clone();
        thread::spawn(move || {
            for group in &groups {
                index.replace(group).unwrap();
                index.refresh().unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = index.clone();
            thread::spawn(move || {
                let mut last_seen = 0;
                for _ in 0..25 {
                    let hits = index
                        .query(&Predicate::any(), QueryOptions::new(0, 100))
                        .unwrap();
                    let keys = uuids(&hits);
                    let mut sorted = keys.clone();
                    sorted.sort();
                    assert_eq!(keys, sorted);
                    // Snapshots never go backwards
                    assert!(keys.len() >= last_seen);
                    last_seen = keys.len();
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    index.refresh().unwrap();
    assert_eq!(index.num_docs(), 20);
    assert_eq!(index.outstanding_searchers(), 0);
}
