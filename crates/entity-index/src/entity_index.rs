//! Generic secondary index over one entity kind.
//!
//! Ties the pieces together: storage is provisioned from the settings,
//! writes go through the writer thread, queries are compiled from
//! predicates and read through leased searchers, and hits are hydrated
//! from the entity cache.

use std::sync::Arc;

use tracing::{debug, info};

use entity_types::IndexSettings;

use crate::cache::EntityCache;
use crate::directory::{open_index, IndexLocation};
use crate::document::{DocumentCodec, FieldBundle};
use crate::error::{IndexError, QueryParseError};
use crate::indexer::{IndexWriterHandle, WriteOp};
use crate::predicate::Predicate;
use crate::query::QueryCompiler;
use crate::schema::{IndexSchema, IndexedEntity};
use crate::searcher::SearcherManager;
use crate::source::{QueryOptions, QuerySource, ResultSet};
use crate::versions::IndexVersions;

/// Searchable index of entities of type `E`, keyed by `E::Key`.
pub struct EntityIndex<E: IndexedEntity> {
    schema: Arc<IndexSchema<E>>,
    location: IndexLocation,
    versions: Option<IndexVersions>,
    codec: DocumentCodec<E>,
    compiler: QueryCompiler<E>,
    searchers: SearcherManager,
    writer: IndexWriterHandle,
    cache: Arc<dyn EntityCache<E>>,
}

impl<E: IndexedEntity> EntityIndex<E> {
    /// Open (or create) the index for `schema`.
    ///
    /// With `in_memory` set, the index lives in RAM and disappears on drop.
    /// Otherwise it is stored under `<index_path>/<kind>_<version>`.
    pub fn open(
        schema: IndexSchema<E>,
        settings: &IndexSettings,
        cache: Arc<dyn EntityCache<E>>,
    ) -> Result<Self, IndexError> {
        settings.validate()?;

        let schema = Arc::new(schema);
        let (index, location) = open_index(&schema, settings)?;
        let versions = match location {
            IndexLocation::InMemory => None,
            IndexLocation::OnDisk(_) => Some(IndexVersions::new(
                settings.expanded_index_path(),
                schema.name(),
            )),
        };

        let codec = DocumentCodec::new(schema.clone(), &index.schema())?;
        let compiler = QueryCompiler::new(schema.clone(), &index)?;
        let searchers = SearcherManager::new(&index, settings.reload_policy)?;
        let writer = IndexWriterHandle::spawn(&index, schema.name(), settings)?;

        info!(
            kind = schema.name(),
            version = schema.version(),
            location = ?location,
            num_docs = searchers.num_docs(),
            "Opened entity index"
        );

        Ok(Self {
            schema,
            location,
            versions,
            codec,
            compiler,
            searchers,
            writer,
            cache,
        })
    }

    pub fn schema(&self) -> &IndexSchema<E> {
        &self.schema
    }

    pub fn location(&self) -> &IndexLocation {
        &self.location
    }

    /// Version bookkeeping for on-disk indexes (None when in memory).
    pub fn versions(&self) -> Option<&IndexVersions> {
        self.versions.as_ref()
    }

    /// Mark this index's schema version as fully built.
    pub fn mark_ready(&self) -> Result<(), IndexError> {
        match &self.versions {
            Some(versions) => versions.mark_ready(self.schema.version(), true),
            None => Ok(()),
        }
    }

    fn replace_op(&self, entity: &E) -> WriteOp {
        let key = entity.key();
        WriteOp::Replace {
            term: self.codec.key_term(&key),
            doc: self.codec.to_document(entity),
            key: key.to_string(),
        }
    }

    fn delete_op(&self, key: &E::Key) -> WriteOp {
        WriteOp::Delete {
            key: key.to_string(),
            term: self.codec.key_term(key),
        }
    }

    /// Insert or overwrite the document for `entity`'s key.
    ///
    /// Blocks until the write is committed. Call from a plain thread;
    /// async callers use [`replace_async`](Self::replace_async).
    pub fn replace(&self, entity: &E) -> Result<(), IndexError> {
        let opstamp = self.writer.execute(self.replace_op(entity))?;
        debug!(kind = self.schema.name(), key = %entity.key(), opstamp, "Replaced document");
        Ok(())
    }

    pub async fn replace_async(&self, entity: &E) -> Result<(), IndexError> {
        let opstamp = self.writer.execute_async(self.replace_op(entity)).await?;
        debug!(kind = self.schema.name(), key = %entity.key(), opstamp, "Replaced document");
        Ok(())
    }

    /// Remove the document for `key`. Unknown keys are not an error.
    pub fn delete(&self, key: &E::Key) -> Result<(), IndexError> {
        let opstamp = self.writer.execute(self.delete_op(key))?;
        debug!(kind = self.schema.name(), key = %key, opstamp, "Deleted document");
        Ok(())
    }

    pub async fn delete_async(&self, key: &E::Key) -> Result<(), IndexError> {
        let opstamp = self.writer.execute_async(self.delete_op(key)).await?;
        debug!(kind = self.schema.name(), key = %key, opstamp, "Deleted document");
        Ok(())
    }

    /// Remove every document, e.g. before a full reindex.
    pub fn delete_all(&self) -> Result<(), IndexError> {
        let opstamp = self.writer.execute(WriteOp::DeleteAll)?;
        info!(kind = self.schema.name(), opstamp, "Deleted all documents");
        Ok(())
    }

    /// Compile `predicate` into a source that can be read.
    ///
    /// Invalid predicates fail here, before any search runs.
    pub fn get_source(
        &self,
        predicate: &Predicate<E>,
        options: QueryOptions,
    ) -> Result<QuerySource<'_, E>, QueryParseError> {
        let query = self.compiler.compile(predicate)?;
        Ok(self.source(predicate.to_string(), query, options))
    }

    pub(crate) fn source(
        &self,
        description: String,
        query: Box<dyn tantivy::query::Query>,
        options: QueryOptions,
    ) -> QuerySource<'_, E> {
        QuerySource::new(
            description,
            query,
            options,
            &self.searchers,
            &self.codec,
            self.cache.as_ref(),
            self.schema.key_field().name(),
        )
    }

    /// Matching entities, hydrated from the cache.
    pub fn query(
        &self,
        predicate: &Predicate<E>,
        options: QueryOptions,
    ) -> Result<ResultSet<E>, IndexError> {
        self.get_source(predicate, options)?.read()
    }

    /// Stored fields of matching documents.
    pub fn query_raw(
        &self,
        predicate: &Predicate<E>,
        options: QueryOptions,
    ) -> Result<ResultSet<FieldBundle>, IndexError> {
        self.get_source(predicate, options)?.read_raw()
    }

    /// Look up a single entity by key.
    pub fn get(&self, key: &E::Key) -> Result<Option<E>, IndexError> {
        let description = format!("{}:{}", self.schema.key_field().name(), key);
        let results = self
            .source(description, self.compiler.key_query(key), QueryOptions::new(0, 1))
            .read()?;
        Ok(results.into_iter().next())
    }

    /// Make all completed writes visible to subsequent queries.
    pub fn refresh(&self) -> Result<(), IndexError> {
        self.searchers.refresh()
    }

    /// Live documents visible to the current searcher.
    pub fn num_docs(&self) -> u64 {
        self.searchers.num_docs()
    }

    /// Searcher leases currently held by in-flight queries.
    pub fn outstanding_searchers(&self) -> usize {
        self.searchers.outstanding()
    }

    /// Drain queued writes and stop the writer. Later writes fail with
    /// [`IndexError::WriterClosed`]; queries keep working.
    pub fn close(&self) {
        self.writer.close();
        info!(kind = self.schema.name(), "Closed entity index writer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryEntityCache;
    use crate::schema::{FieldDef, FieldValue};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    struct Book {
        isbn: String,
        title: String,
        year: i64,
    }

    impl IndexedEntity for Book {
        type Key = String;

        fn key(&self) -> String {
            self.isbn.clone()
        }
    }

    fn book(isbn: &str, title: &str, year: i64) -> Book {
        Book {
            isbn: isbn.to_string(),
            title: title.to_string(),
            year,
        }
    }

    fn schema() -> IndexSchema<Book> {
        IndexSchema::new(
            "books",
            1,
            "isbn",
            vec![
                FieldDef::exact("isbn", |b: &Book| vec![b.isbn.as_str().into()])
                    .stored()
                    .sortable(),
                FieldDef::full_text("title", |b: &Book| vec![b.title.as_str().into()]).stored(),
                FieldDef::integer("year", |b: &Book| vec![FieldValue::Int(b.year)]).stored(),
            ],
        )
        .unwrap()
    }

    fn setup(books: &[Book]) -> (EntityIndex<Book>, Arc<InMemoryEntityCache<Book>>) {
        let cache: Arc<InMemoryEntityCache<Book>> = Arc::new(books.iter().cloned().collect());
        let index =
            EntityIndex::open(schema(), &IndexSettings::in_memory(), cache.clone()).unwrap();
        for b in books {
            index.replace(b).unwrap();
        }
        index.refresh().unwrap();
        (index, cache)
    }

    fn keys(results: ResultSet<Book>) -> Vec<String> {
        results.into_iter().map(|b| b.isbn).collect()
    }

    #[test]
    fn test_replace_and_query() {
        let (index, _cache) = setup(&[
            book("3", "Rust in Action", 2021),
            book("1", "Programming Rust", 2017),
            book("2", "The Go Programming Language", 2015),
        ]);

        let results = index
            .query(&Predicate::contains("title", "rust"), QueryOptions::new(0, 10))
            .unwrap();
        assert_eq!(keys(results), vec!["1", "3"]);
        assert_eq!(index.num_docs(), 3);
        assert_eq!(index.outstanding_searchers(), 0);
    }

    #[test]
    fn test_get_by_key() {
        let (index, _cache) = setup(&[book("1", "Dune", 1965)]);
        assert_eq!(index.get(&"1".to_string()).unwrap().unwrap().title, "Dune");
        assert!(index.get(&"2".to_string()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_predicate_fails_before_search() {
        let (index, _cache) = setup(&[]);
        assert!(index
            .get_source(&Predicate::eq("publisher", "x"), QueryOptions::default())
            .is_err());
        let err = index
            .query(&Predicate::eq("year", "nineteen"), QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, IndexError::QueryParse(_)));
    }

    #[test]
    fn test_cache_miss_drops_hit() {
        let (index, cache) = setup(&[book("1", "A", 2000), book("2", "B", 2001)]);
        cache.remove(&"1".to_string());

        let results = index.query(&Predicate::any(), QueryOptions::default()).unwrap();
        assert_eq!(keys(results), vec!["2"]);

        // Raw reads do not consult the cache
        let raw = index.query_raw(&Predicate::any(), QueryOptions::default()).unwrap();
        assert_eq!(raw.len(), 2);
    }

    #[test]
    fn test_raw_projection() {
        let (index, _cache) = setup(&[book("1", "Dune", 1965)]);
        let raw = index
            .query_raw(&Predicate::any(), QueryOptions::new(0, 1).with_fields(["year"]))
            .unwrap();
        let bundle = raw.first().unwrap();
        assert_eq!(bundle.first_i64("year"), Some(1965));
        assert_eq!(bundle.first_str("isbn"), Some("1"));
        assert!(!bundle.contains("title"));
    }

    #[test]
    fn test_zero_limit_is_empty() {
        let (index, _cache) = setup(&[book("1", "A", 2000)]);
        let results = index.query(&Predicate::any(), QueryOptions::new(0, 0)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_delete_all() {
        let (index, _cache) = setup(&[book("1", "A", 2000), book("2", "B", 2001)]);
        index.delete_all().unwrap();
        index.refresh().unwrap();
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn test_close_rejects_writes() {
        let (index, _cache) = setup(&[book("1", "A", 2000)]);
        index.close();
        let err = index.replace(&book("2", "B", 2001)).unwrap_err();
        assert!(matches!(err, IndexError::WriterClosed));
        assert_eq!(index.query(&Predicate::any(), QueryOptions::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_on_disk_mark_ready() {
        let temp_dir = TempDir::new().unwrap();
        let settings = IndexSettings::on_disk(temp_dir.path());
        let cache = Arc::new(InMemoryEntityCache::<Book>::new());
        let index = EntityIndex::open(schema(), &settings, cache).unwrap();

        let versions = index.versions().unwrap();
        assert!(!versions.is_ready(1).unwrap());
        index.mark_ready().unwrap();
        assert_eq!(versions.latest_ready().unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = IndexSettings::in_memory().with_max_batch_size(0);
        let cache = Arc::new(InMemoryEntityCache::<Book>::new());
        let err = EntityIndex::open(schema(), &settings, cache).err().unwrap();
        assert!(matches!(err, IndexError::Config(_)));
    }
}
