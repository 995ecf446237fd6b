//! # entity-index
//!
//! Secondary search index for domain entities using Tantivy.
//!
//! Entities are indexed under a stable key and found again through
//! predicate trees. The authoritative copy of every entity lives elsewhere;
//! query hits are hydrated from an [`EntityCache`] or returned as raw
//! stored fields.
//!
//! ## Features
//! - Ephemeral (RAM) or durable (MmapDirectory) storage, one directory per
//!   entity kind and schema version
//! - Idempotent replace and delete by key, batched into shared commits by a
//!   dedicated writer thread
//! - Leased searchers, released on every exit path
//! - Windowed reads ordered by key for stable pagination
//! - [`GroupIndex`]: the index specialized to groups
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use entity_index::{GroupIndex, GroupPredicates, InMemoryEntityCache, QueryOptions};
//! use entity_types::{GroupUuid, IndexSettings, InternalGroup};
//!
//! let group = InternalGroup::new(1, GroupUuid::new("a1b2").unwrap(), "Administrators");
//! let cache = Arc::new(InMemoryEntityCache::from_iter([group.clone()]));
//!
//! let index = GroupIndex::open(&IndexSettings::in_memory(), cache).unwrap();
//! index.replace(&group).unwrap();
//! index.refresh().unwrap();
//!
//! let admins = index
//!     .query(&GroupPredicates::inname("admin"), QueryOptions::new(0, 10))
//!     .unwrap();
//! assert_eq!(admins.len(), 1);
//! ```

pub mod cache;
pub mod collector;
pub mod directory;
pub mod document;
pub mod entity_index;
pub mod error;
pub mod group;
pub mod indexer;
pub mod predicate;
pub mod query;
pub mod schema;
pub mod searcher;
pub mod source;
pub mod versions;

pub use cache::{EntityCache, InMemoryEntityCache};
pub use collector::{KeyOrderCollector, SortOrder};
pub use directory::{open_index, open_or_create_index, IndexLocation};
pub use document::{DocumentCodec, FieldBundle};
pub use entity_index::EntityIndex;
pub use error::{IndexError, QueryParseError};
pub use group::{
    fields as group_fields, GroupCache, GroupIndex, GroupPredicates, GroupSchemaDefinitions, GROUPS,
};
pub use indexer::{IndexWriterHandle, WriteOp};
pub use predicate::{Matchable, Operator, OperatorPredicate, Predicate};
pub use query::QueryCompiler;
pub use schema::{EntityKey, FieldDef, FieldKind, FieldValue, IndexSchema, IndexedEntity};
pub use searcher::{SearcherLease, SearcherManager};
pub use source::{QueryOptions, QuerySource, ResultSet, DEFAULT_QUERY_LIMIT, QUERY_CARDINALITY};
pub use versions::{IndexVersion, IndexVersions, VersionState};
