//! Windowed query execution.
//!
//! Tantivy has no native offset, so a window `[start, start + limit)` is
//! served by collecting the top `start + limit` hits in key order and
//! skipping the first `start`. Entity results and raw field bundles share
//! one execution path and differ only in how a hit is mapped.

use std::collections::BTreeSet;

use tantivy::query::Query;
use tantivy::{DocAddress, Searcher, TantivyDocument};
use tracing::debug;

use crate::cache::EntityCache;
use crate::collector::{KeyOrderCollector, SortOrder};
use crate::document::{DocumentCodec, FieldBundle};
use crate::error::IndexError;
use crate::schema::IndexedEntity;
use crate::searcher::SearcherManager;

/// Fixed cardinality estimate reported to query planners.
pub const QUERY_CARDINALITY: usize = 10;

/// Page size of [`QueryOptions::default`].
pub const DEFAULT_QUERY_LIMIT: usize = 25;

/// Result window, sort direction and stored-field projection of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Hits to skip
    pub start: usize,
    /// Most results to return
    pub limit: usize,
    /// Stored fields to return from raw reads (None = all)
    pub fields: Option<BTreeSet<String>>,
    pub order: SortOrder,
}

impl QueryOptions {
    pub fn new(start: usize, limit: usize) -> Self {
        Self {
            start,
            limit,
            fields: None,
            order: SortOrder::Asc,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Number of top hits to collect for this window.
    pub fn effective_limit(&self) -> usize {
        self.start.saturating_add(self.limit)
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new(0, DEFAULT_QUERY_LIMIT)
    }
}

/// Materialized results of one query, in sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet<T> {
    items: Vec<T>,
}

impl<T> ResultSet<T> {
    fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    fn empty() -> Self {
        Self { items: Vec::new() }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn to_list(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for ResultSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'r, T> IntoIterator for &'r ResultSet<T> {
    type Item = &'r T;
    type IntoIter = std::slice::Iter<'r, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A hit in the requested window.
struct Hit<'s> {
    key: Option<String>,
    address: DocAddress,
    searcher: &'s Searcher,
}

impl Hit<'_> {
    fn document(&self) -> Result<TantivyDocument, IndexError> {
        self.searcher.doc(self.address).map_err(|e| {
            IndexError::QueryExecution(format!("fetching {:?}: {}", self.address, e))
        })
    }
}

/// A compiled query bound to an index, ready to be read.
pub struct QuerySource<'a, E: IndexedEntity> {
    description: String,
    query: Box<dyn Query>,
    options: QueryOptions,
    searchers: &'a SearcherManager,
    codec: &'a DocumentCodec<E>,
    cache: &'a dyn EntityCache<E>,
    key_field: &'static str,
}

impl<'a, E: IndexedEntity> QuerySource<'a, E> {
    pub(crate) fn new(
        description: String,
        query: Box<dyn Query>,
        options: QueryOptions,
        searchers: &'a SearcherManager,
        codec: &'a DocumentCodec<E>,
        cache: &'a dyn EntityCache<E>,
        key_field: &'static str,
    ) -> Self {
        Self {
            description,
            query,
            options,
            searchers,
            codec,
            cache,
            key_field,
        }
    }

    /// Estimated result count; a constant, not an exact count.
    pub fn cardinality(&self) -> usize {
        QUERY_CARDINALITY
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Read hydrated entities. Hits whose key the cache no longer knows
    /// are dropped.
    pub fn read(&self) -> Result<ResultSet<E>, IndexError> {
        self.read_impl(|hit| {
            let key = match &hit.key {
                Some(key) => key.parse::<E::Key>().ok(),
                None => self.codec.to_entity_key(&hit.document()?),
            };
            let Some(key) = key else {
                debug!(address = ?hit.address, "Hit has no readable key");
                return Ok(None);
            };
            let entity = self.cache.get(&key);
            if entity.is_none() {
                debug!(key = %key, "Dropping hit missing from cache");
            }
            Ok(entity)
        })
    }

    /// Read the stored fields of each hit without consulting the cache.
    pub fn read_raw(&self) -> Result<ResultSet<FieldBundle>, IndexError> {
        let projection = self.options.fields.as_ref();
        self.read_impl(|hit| {
            let doc = hit.document()?;
            Ok(Some(self.codec.to_field_bundle(&doc, projection)))
        })
    }

    fn read_impl<T, F>(&self, mut mapper: F) -> Result<ResultSet<T>, IndexError>
    where
        F: FnMut(&Hit<'_>) -> Result<Option<T>, IndexError>,
    {
        if self.options.limit == 0 {
            return Ok(ResultSet::empty());
        }

        let searcher = self.searchers.acquire();
        let collector = KeyOrderCollector::new(
            self.key_field,
            self.options.effective_limit(),
            self.options.order,
        );
        let hits = searcher
            .search(self.query.as_ref(), &collector)
            .map_err(|e| IndexError::QueryExecution(format!("{}: {}", self.description, e)))?;
        let total = hits.len();

        let mut items = Vec::with_capacity(total.saturating_sub(self.options.start));
        for (key, address) in hits.into_iter().skip(self.options.start) {
            let hit = Hit {
                key,
                address,
                searcher: &searcher,
            };
            if let Some(item) = mapper(&hit)? {
                items.push(item);
            }
        }

        debug!(
            query = %self.description,
            start = self.options.start,
            limit = self.options.limit,
            hits = total,
            returned = items.len(),
            "Executed query"
        );
        Ok(ResultSet::new(items))
    }
}
