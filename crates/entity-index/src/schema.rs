//! Field schema for an indexed entity kind.
//!
//! An [`IndexSchema`] is an ordered, versioned list of field definitions.
//! It is immutable once built; a layout change means a new version, and a
//! new version lives in its own physical index directory.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use tantivy::schema::{
    IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions,
};

use crate::error::IndexError;

/// Identifier type usable as the primary key of an index.
///
/// The key's `Display` form is the exact term stored in the key field,
/// and `FromStr` must invert it.
pub trait EntityKey: Clone + Eq + Hash + fmt::Display + FromStr + Send + Sync + 'static {}

impl<T> EntityKey for T where
    T: Clone + Eq + Hash + fmt::Display + FromStr + Send + Sync + 'static
{
}

/// An entity that can be stored in an [`EntityIndex`](crate::EntityIndex).
pub trait IndexedEntity: Clone + Send + Sync + 'static {
    type Key: EntityKey;

    fn key(&self) -> Self::Key;
}

/// How a field is indexed and which operators apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Untokenized string matched by exact term
    Exact,
    /// Untokenized string matched by exact term or prefix
    Prefix,
    /// Tokenized text matched by its terms
    FullText,
    /// Signed 64-bit integer
    Integer,
    /// Milliseconds since the Unix epoch
    Timestamp,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Exact => "exact",
            FieldKind::Prefix => "prefix",
            FieldKind::FullText => "full_text",
            FieldKind::Integer => "integer",
            FieldKind::Timestamp => "timestamp",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Timestamp)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single encoded field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    Str(String),
    Int(i64),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Int(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

/// Extracts a field's values from an entity. An empty vec means the field
/// is absent; several values make a repeated field.
pub type FieldGetter<E> = fn(&E) -> Vec<FieldValue>;

/// Definition of one indexed field.
pub struct FieldDef<E> {
    name: &'static str,
    kind: FieldKind,
    stored: bool,
    sortable: bool,
    getter: FieldGetter<E>,
}

impl<E> FieldDef<E> {
    pub fn new(name: &'static str, kind: FieldKind, getter: FieldGetter<E>) -> Self {
        Self {
            name,
            kind,
            stored: false,
            sortable: false,
            getter,
        }
    }

    pub fn exact(name: &'static str, getter: FieldGetter<E>) -> Self {
        Self::new(name, FieldKind::Exact, getter)
    }

    pub fn prefix(name: &'static str, getter: FieldGetter<E>) -> Self {
        Self::new(name, FieldKind::Prefix, getter)
    }

    pub fn full_text(name: &'static str, getter: FieldGetter<E>) -> Self {
        Self::new(name, FieldKind::FullText, getter)
    }

    pub fn integer(name: &'static str, getter: FieldGetter<E>) -> Self {
        Self::new(name, FieldKind::Integer, getter)
    }

    pub fn timestamp(name: &'static str, getter: FieldGetter<E>) -> Self {
        Self::new(name, FieldKind::Timestamp, getter)
    }

    /// Keep the raw values so they can be returned in field bundles.
    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    /// Make the field usable as a sort key.
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_stored(&self) -> bool {
        self.stored
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    pub fn values(&self, entity: &E) -> Vec<FieldValue> {
        (self.getter)(entity)
    }

    fn text_options(&self) -> TextOptions {
        let (tokenizer, record) = match self.kind {
            FieldKind::FullText => ("default", IndexRecordOption::WithFreqsAndPositions),
            _ => ("raw", IndexRecordOption::Basic),
        };
        let mut options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(tokenizer)
                .set_index_option(record),
        );
        if self.stored {
            options = options.set_stored();
        }
        if self.sortable {
            options = options.set_fast(None);
        }
        options
    }

    fn numeric_options(&self) -> NumericOptions {
        let mut options = NumericOptions::default().set_indexed();
        if self.stored {
            options = options.set_stored();
        }
        if self.sortable {
            options = options.set_fast();
        }
        options
    }
}

impl<E> Clone for FieldDef<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            kind: self.kind,
            stored: self.stored,
            sortable: self.sortable,
            getter: self.getter,
        }
    }
}

impl<E> fmt::Debug for FieldDef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("stored", &self.stored)
            .field("sortable", &self.sortable)
            .finish()
    }
}

/// Versioned field layout for one entity kind.
pub struct IndexSchema<E> {
    name: String,
    version: u32,
    fields: Vec<FieldDef<E>>,
    key_index: usize,
}

impl<E> IndexSchema<E> {
    /// Build a schema, validating the field list.
    ///
    /// The key field must exist, be `Exact`, stored and sortable, since it
    /// identifies documents for delete/replace and orders query results.
    pub fn new(
        name: impl Into<String>,
        version: u32,
        key_field: &str,
        fields: Vec<FieldDef<E>>,
    ) -> Result<Self, IndexError> {
        let name = name.into();
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return Err(IndexError::InvalidSchema(format!(
                "invalid entity kind name: {:?}",
                name
            )));
        }

        let mut seen = HashSet::new();
        for def in &fields {
            if !seen.insert(def.name) {
                return Err(IndexError::InvalidSchema(format!(
                    "duplicate field: {}",
                    def.name
                )));
            }
        }

        let key_index = fields
            .iter()
            .position(|def| def.name == key_field)
            .ok_or_else(|| {
                IndexError::InvalidSchema(format!("missing key field: {}", key_field))
            })?;
        let key = &fields[key_index];
        if key.kind != FieldKind::Exact || !key.stored || !key.sortable {
            return Err(IndexError::InvalidSchema(format!(
                "key field {} must be exact, stored and sortable",
                key_field
            )));
        }

        Ok(Self {
            name,
            version,
            fields,
            key_index,
        })
    }

    /// Entity kind, e.g. "groups"
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldDef<E>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef<E>> {
        self.fields.iter().find(|def| def.name == name)
    }

    pub fn key_field(&self) -> &FieldDef<E> {
        &self.fields[self.key_index]
    }

    /// Directory holding this version of the index, e.g. `groups_0002`.
    pub fn directory_name(&self) -> String {
        format!("{}_{:04}", self.name, self.version)
    }

    /// Build the Tantivy schema for this layout.
    pub fn to_tantivy(&self) -> Schema {
        let mut schema_builder = Schema::builder();
        for def in &self.fields {
            if def.kind.is_numeric() {
                schema_builder.add_i64_field(def.name, def.numeric_options());
            } else {
                schema_builder.add_text_field(def.name, def.text_options());
            }
        }
        schema_builder.build()
    }

    /// Check that an existing Tantivy schema has exactly this layout.
    pub fn check_compatible(&self, existing: &Schema) -> Result<(), IndexError> {
        let expected = self.to_tantivy();
        let describe = |schema: &Schema| {
            schema
                .fields()
                .map(|(_, entry)| {
                    (
                        entry.name().to_string(),
                        entry.field_type().value_type(),
                        entry.is_stored(),
                    )
                })
                .collect::<Vec<_>>()
        };
        if describe(&expected) != describe(existing) {
            return Err(IndexError::SchemaMismatch(format!(
                "{} index on disk does not match schema version {}",
                self.name, self.version
            )));
        }
        Ok(())
    }
}

impl<E> fmt::Debug for IndexSchema<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSchema")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("key", &self.key_field().name)
            .field("fields", &self.fields)
            .finish()
    }
}
