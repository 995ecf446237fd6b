//! End-to-end test infrastructure for the entity index.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the write -> refresh -> query path of the group index.

use std::path::PathBuf;
use std::sync::{Arc, Once};

use chrono::{DateTime, TimeZone, Utc};
use tracing_subscriber::EnvFilter;

use entity_index::{GroupIndex, InMemoryEntityCache};
use entity_types::{AccountId, GroupUuid, IndexSettings, InternalGroup};

static TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by RUST_LOG (default: warn).
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Shared test harness for E2E tests.
///
/// Owns a temp directory for on-disk indexes and the group cache used to
/// hydrate query hits.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Base path for on-disk indexes
    pub index_path: PathBuf,
    /// Groups known to the "store"
    pub cache: Arc<InMemoryEntityCache<InternalGroup>>,
}

impl TestHarness {
    /// Create a new test harness with a temp directory and an empty cache.
    pub fn new() -> Self {
        init_tracing();
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index_path = temp_dir.path().join("index");

        Self {
            _temp_dir: temp_dir,
            index_path,
            cache: Arc::new(InMemoryEntityCache::new()),
        }
    }

    /// Settings for a durable index under the harness directory.
    pub fn on_disk_settings(&self) -> IndexSettings {
        IndexSettings::on_disk(&self.index_path)
    }

    /// Open an ephemeral group index backed by the harness cache.
    pub fn open_in_memory(&self) -> GroupIndex {
        GroupIndex::open(&IndexSettings::in_memory(), self.cache.clone())
            .expect("Failed to open in-memory group index")
    }

    /// Open the on-disk group index (latest schema).
    pub fn open_on_disk(&self) -> GroupIndex {
        GroupIndex::open(&self.on_disk_settings(), self.cache.clone())
            .expect("Failed to open on-disk group index")
    }

    /// Add groups to the cache, index them, and refresh.
    pub fn index_groups(&self, index: &GroupIndex, groups: &[InternalGroup]) {
        for group in groups {
            self.cache.insert(group.clone());
            index.replace(group).expect("Failed to index group");
        }
        index.refresh().expect("Failed to refresh index");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed creation time so documents are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_706_540_400_000).unwrap() // 2024-01-29 approx
}

/// UUID for the i-th test group; zero-padded so key order is numeric order.
pub fn test_uuid(i: usize) -> GroupUuid {
    GroupUuid::new(format!("{:08x}-test", i)).expect("valid uuid")
}

/// Create N groups named `<base_name> <i>`, owned by the first one.
///
/// Each group gets one member account (1000 + i) and is visible to all
/// when `i` is even.
pub fn create_test_groups(count: usize, base_name: &str) -> Vec<InternalGroup> {
    (0..count)
        .map(|i| {
            InternalGroup::new(i as i32 + 1, test_uuid(i), format!("{} {}", base_name, i))
                .with_owner(test_uuid(0))
                .with_description(format!("{} number {}", base_name, i))
                .with_visible_to_all(i % 2 == 0)
                .with_members(vec![AccountId(1000 + i as i32)])
                .with_created_on(base_time())
        })
        .collect()
}

/// UUIDs of a result sequence, in result order.
pub fn uuids<'a>(groups: impl IntoIterator<Item = &'a InternalGroup>) -> Vec<String> {
    groups.into_iter().map(|g| g.uuid.to_string()).collect()
}
