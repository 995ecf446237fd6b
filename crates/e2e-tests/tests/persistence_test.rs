//! On-disk index E2E tests.
//!
//! Durable indexes survive a reopen, live in one directory per schema
//! version, and track which versions are ready to serve queries.

use pretty_assertions::assert_eq;

use e2e_tests::{create_test_groups, uuids, TestHarness};
use entity_index::{
    GroupIndex, GroupPredicates, GroupSchemaDefinitions, IndexError, IndexLocation,
    IndexVersions, Predicate, QueryOptions, GROUPS,
};
use entity_types::AccountId;

/// Documents written before close are found again after reopening.
#[test]
fn test_reopen_keeps_documents() {
    let harness = TestHarness::new();
    let groups = create_test_groups(5, "Durable");

    {
        let index = harness.open_on_disk();
        harness.index_groups(&index, &groups);
        index.close();
    }

    let index = harness.open_on_disk();
    assert_eq!(index.num_docs(), 5);
    let hits = index
        .query(&GroupPredicates::member(AccountId(1003)), QueryOptions::default())
        .unwrap();
    assert_eq!(uuids(&hits), vec![groups[3].uuid.to_string()]);

    let expected = harness.index_path.join("groups_0002");
    assert_eq!(index.location(), &IndexLocation::OnDisk(expected.clone()));
    assert!(expected.join("meta.json").exists());
}

/// Each schema version gets its own directory; readiness is persisted.
#[test]
fn test_versions_side_by_side() {
    let harness = TestHarness::new();
    let settings = harness.on_disk_settings();
    let groups = create_test_groups(3, "Versioned");

    // Serve from v1 while v2 is being built
    let v1 = GroupIndex::open_with_schema(
        GroupSchemaDefinitions::v1().unwrap(),
        &settings,
        harness.cache.clone(),
    )
    .unwrap();
    harness.index_groups(&v1, &groups);
    v1.mark_ready().unwrap();

    let v2 = harness.open_on_disk();
    harness.index_groups(&v2, &groups);

    let versions = IndexVersions::new(&harness.index_path, GROUPS);
    assert_eq!(versions.latest_ready().unwrap().unwrap().version, 1);

    v2.mark_ready().unwrap();
    assert_eq!(versions.latest_ready().unwrap().unwrap().version, 2);

    let found: Vec<(u32, bool)> = versions
        .scan()
        .unwrap()
        .iter()
        .map(|v| (v.version, v.ready))
        .collect();
    assert_eq!(found, vec![(1, true), (2, true)]);

    // Membership only exists in v2
    let member = GroupPredicates::member(AccountId(1000));
    assert_eq!(v2.query(&member, QueryOptions::default()).unwrap().len(), 1);
    let err = v1.query(&member, QueryOptions::default()).unwrap_err();
    assert!(matches!(err, IndexError::QueryParse(_)));

    // Retire v1
    drop(v1);
    let stale = versions.stale_versions(2).unwrap();
    assert_eq!(stale.len(), 1);
    versions.remove_version(stale[0].version).unwrap();
    assert_eq!(versions.scan().unwrap().len(), 1);
    assert_eq!(v2.query(&Predicate::any(), QueryOptions::default()).unwrap().len(), 3);
}

/// delete_all empties a durable index, e.g. before a full reindex.
#[test]
fn test_delete_all_then_reindex() {
    let harness = TestHarness::new();
    let index = harness.open_on_disk();
    let groups = create_test_groups(4, "Rebuild");
    harness.index_groups(&index, &groups);

    index.delete_all().unwrap();
    index.refresh().unwrap();
    assert_eq!(index.num_docs(), 0);

    harness.index_groups(&index, &groups[..2]);
    assert_eq!(index.num_docs(), 2);
}

/// Writes after close fail; reads still work.
#[test]
fn test_closed_index_rejects_writes() {
    let harness = TestHarness::new();
    let index = harness.open_on_disk();
    let groups = create_test_groups(2, "Closing");
    harness.index_groups(&index, &groups[..1]);

    index.close();
    let err = index.replace(&groups[1]).unwrap_err();
    assert!(matches!(err, IndexError::WriterClosed));
    assert!(err.is_io());
    assert_eq!(index.query(&Predicate::any(), QueryOptions::default()).unwrap().len(), 1);
}
