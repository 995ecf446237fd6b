//! Searcher lifecycle management.
//!
//! Readers never see a half-written index: every query runs against the
//! searcher that was current when it acquired its lease. A lease is
//! released when dropped, on success and error paths alike.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use tantivy::{Index, IndexReader, ReloadPolicy, Searcher};
use tracing::{debug, warn};

use entity_types::ReloadMode;

use crate::error::IndexError;

/// Hands out leased searchers over one index.
pub struct SearcherManager {
    reader: IndexReader,
    outstanding: AtomicUsize,
}

impl SearcherManager {
    pub fn new(index: &Index, mode: ReloadMode) -> Result<Self, IndexError> {
        let policy = match mode {
            ReloadMode::OnCommit => ReloadPolicy::OnCommitWithDelay,
            ReloadMode::Manual => ReloadPolicy::Manual,
        };
        let reader = index.reader_builder().reload_policy(policy).try_into()?;

        Ok(Self {
            reader,
            outstanding: AtomicUsize::new(0),
        })
    }

    /// Lease the most recently loaded searcher.
    pub fn acquire(&self) -> SearcherLease<'_> {
        let searcher = self.reader.searcher();
        let outstanding = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            generation = searcher.generation().generation_id(),
            outstanding, "Acquired searcher"
        );
        SearcherLease {
            manager: self,
            searcher,
        }
    }

    fn release(&self, searcher: &Searcher) {
        let result = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if result.is_err() {
            warn!(
                generation = searcher.generation().generation_id(),
                "Released a searcher that was not acquired"
            );
        }
    }

    /// Reload the reader so later leases see every completed commit.
    pub fn refresh(&self) -> Result<(), IndexError> {
        self.reader.reload()?;
        debug!("Reloaded index reader");
        Ok(())
    }

    /// Leases not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Live documents in the current searcher.
    pub fn num_docs(&self) -> u64 {
        self.acquire().num_docs()
    }
}

impl Drop for SearcherManager {
    fn drop(&mut self) {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            warn!(outstanding, "Searcher manager dropped with unreleased leases");
        }
    }
}

/// A searcher borrowed from a [`SearcherManager`]; released on drop.
pub struct SearcherLease<'a> {
    manager: &'a SearcherManager,
    searcher: Searcher,
}

impl Deref for SearcherLease<'_> {
    type Target = Searcher;

    fn deref(&self) -> &Searcher {
        &self.searcher
    }
}

impl Drop for SearcherLease<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.searcher);
    }
}
