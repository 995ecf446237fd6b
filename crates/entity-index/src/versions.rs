//! Schema version bookkeeping for on-disk indexes.
//!
//! Each version of an entity kind lives in `<base>/<kind>_<version:04>`.
//! Readiness (whether a version has been fully built and may serve
//! queries) is persisted in `<base>/<kind>_versions.json`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IndexError;

/// Serializes read-modify-write cycles on state files across every
/// `IndexVersions` in the process.
static STATE_LOCK: Mutex<()> = Mutex::new(());

fn lock_state() -> MutexGuard<'static, ()> {
    STATE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persisted readiness state of one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionState {
    pub ready: bool,

    /// When readiness last changed (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// A version directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexVersion {
    pub version: u32,
    pub path: PathBuf,
    pub ready: bool,
}

/// Tracks the on-disk versions of one entity kind.
#[derive(Debug, Clone)]
pub struct IndexVersions {
    base: PathBuf,
    kind: String,
}

impl IndexVersions {
    pub fn new(base: impl Into<PathBuf>, kind: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            kind: kind.into(),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.base.join(format!("{}_versions.json", self.kind))
    }

    pub fn version_dir(&self, version: u32) -> PathBuf {
        self.base.join(format!("{}_{:04}", self.kind, version))
    }

    /// Parse `<kind>_<digits>` into a version number.
    fn parse_dir_name(&self, name: &str) -> Option<u32> {
        let digits = name.strip_prefix(&self.kind)?.strip_prefix('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn load_state(&self) -> Result<BTreeMap<u32, VersionState>, IndexError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save_state(&self, state: &BTreeMap<u32, VersionState>) -> Result<(), IndexError> {
        std::fs::create_dir_all(&self.base)?;
        let tmp = self.state_path().with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        std::fs::rename(&tmp, self.state_path())?;
        Ok(())
    }

    /// List version directories present on disk, oldest first.
    pub fn scan(&self) -> Result<Vec<IndexVersion>, IndexError> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }
        let state = self.load_state()?;
        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&self.base)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(version) = name.to_str().and_then(|n| self.parse_dir_name(n)) else {
                continue;
            };
            versions.push(IndexVersion {
                version,
                path: entry.path(),
                ready: state.get(&version).map(|s| s.ready).unwrap_or(false),
            });
        }
        versions.sort_by_key(|v| v.version);
        debug!(kind = %self.kind, found = versions.len(), "Scanned index versions");
        Ok(versions)
    }

    /// Record whether a version may serve queries.
    pub fn mark_ready(&self, version: u32, ready: bool) -> Result<(), IndexError> {
        let _guard = lock_state();
        let mut state = self.load_state()?;
        state.insert(
            version,
            VersionState {
                ready,
                updated_at: Utc::now(),
            },
        );
        self.save_state(&state)?;
        info!(kind = %self.kind, version, ready, "Updated index version state");
        Ok(())
    }

    pub fn is_ready(&self, version: u32) -> Result<bool, IndexError> {
        Ok(self
            .load_state()?
            .get(&version)
            .map(|s| s.ready)
            .unwrap_or(false))
    }

    /// Newest version on disk that is marked ready.
    pub fn latest_ready(&self) -> Result<Option<IndexVersion>, IndexError> {
        Ok(self.scan()?.into_iter().rev().find(|v| v.ready))
    }

    /// Versions on disk older than `current`.
    pub fn stale_versions(&self, current: u32) -> Result<Vec<IndexVersion>, IndexError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|v| v.version < current)
            .collect())
    }

    /// Delete a version's directory and forget its state.
    pub fn remove_version(&self, version: u32) -> Result<(), IndexError> {
        let dir = self.version_dir(version);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        let _guard = lock_state();
        let mut state = self.load_state()?;
        if state.remove(&version).is_some() {
            self.save_state(&state)?;
        }
        info!(kind = %self.kind, version, "Removed index version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, IndexVersions) {
        let temp_dir = TempDir::new().unwrap();
        let versions = IndexVersions::new(temp_dir.path(), "groups");
        (temp_dir, versions)
    }

    #[test]
    fn test_scan_empty() {
        let (_temp_dir, versions) = setup();
        assert!(versions.scan().unwrap().is_empty());
        assert!(versions.latest_ready().unwrap().is_none());
    }

    #[test]
    fn test_scan_finds_version_dirs_only() {
        let (temp_dir, versions) = setup();
        std::fs::create_dir_all(versions.version_dir(2)).unwrap();
        std::fs::create_dir_all(versions.version_dir(10)).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("accounts_0003")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("groups_beta")).unwrap();
        std::fs::write(temp_dir.path().join("groups_0004"), b"not a dir").unwrap();

        let found: Vec<u32> = versions.scan().unwrap().iter().map(|v| v.version).collect();
        assert_eq!(found, vec![2, 10]);
    }

    #[test]
    fn test_mark_ready_persists() {
        let (temp_dir, versions) = setup();
        std::fs::create_dir_all(versions.version_dir(1)).unwrap();
        std::fs::create_dir_all(versions.version_dir(2)).unwrap();

        versions.mark_ready(1, true).unwrap();
        assert!(versions.is_ready(1).unwrap());
        assert!(!versions.is_ready(2).unwrap());

        let reopened = IndexVersions::new(temp_dir.path(), "groups");
        let latest = reopened.latest_ready().unwrap().unwrap();
        assert_eq!(latest.version, 1);

        reopened.mark_ready(2, true).unwrap();
        assert_eq!(reopened.latest_ready().unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_stale_and_remove() {
        let (_temp_dir, versions) = setup();
        for v in 1..=3 {
            std::fs::create_dir_all(versions.version_dir(v)).unwrap();
            versions.mark_ready(v, true).unwrap();
        }

        let stale: Vec<u32> = versions
            .stale_versions(3)
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(stale, vec![1, 2]);

        versions.remove_version(1).unwrap();
        assert!(!versions.version_dir(1).exists());
        assert!(!versions.is_ready(1).unwrap());
        assert_eq!(versions.scan().unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_updates_keep_every_entry() {
        let (temp_dir, _) = setup();
        let handles: Vec<_> = (1..=16)
            .map(|v| {
                // Separate instances, as held by separate indexes
                let versions = IndexVersions::new(temp_dir.path(), "groups");
                std::thread::spawn(move || versions.mark_ready(v, true))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let versions = IndexVersions::new(temp_dir.path(), "groups");
        for v in 1..=16 {
            assert!(versions.is_ready(v).unwrap(), "version {} lost", v);
        }
    }

    #[test]
    fn test_version_dir_naming() {
        let (temp_dir, versions) = setup();
        assert_eq!(versions.version_dir(4), temp_dir.path().join("groups_0004"));
    }
}
