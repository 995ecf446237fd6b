//! Document mapping between entities and Tantivy documents.
//!
//! The codec is driven entirely by the [`IndexSchema`]: every field getter
//! contributes zero or more values, and absent fields are simply omitted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tantivy::schema::{Field, Schema, Value};
use tantivy::{TantivyDocument, Term};

use crate::error::IndexError;
use crate::schema::{FieldKind, FieldValue, IndexSchema, IndexedEntity};

/// Raw stored values of one matched document, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBundle {
    fields: BTreeMap<String, Vec<FieldValue>>,
}

impl FieldBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.entry(name.into()).or_default().push(value);
    }

    /// All values of a field (empty if absent).
    pub fn get(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_str(&self, name: &str) -> Option<&str> {
        self.get(name).first().and_then(FieldValue::as_str)
    }

    pub fn first_i64(&self, name: &str) -> Option<i64> {
        self.get(name).first().and_then(FieldValue::as_i64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names present in this bundle, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Converts entities to documents and documents back to keys or bundles.
pub struct DocumentCodec<E: IndexedEntity> {
    schema: Arc<IndexSchema<E>>,
    /// Tantivy field handles, aligned with `schema.fields()`
    fields: Vec<Field>,
    key: Field,
}

impl<E: IndexedEntity> DocumentCodec<E> {
    /// Resolve field handles against the opened index's Tantivy schema.
    pub fn new(schema: Arc<IndexSchema<E>>, tantivy_schema: &Schema) -> Result<Self, IndexError> {
        let fields = schema
            .fields()
            .iter()
            .map(|def| {
                tantivy_schema.get_field(def.name()).map_err(|_| {
                    IndexError::SchemaMismatch(format!("missing {} field", def.name()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let key = tantivy_schema
            .get_field(schema.key_field().name())
            .map_err(|_| IndexError::SchemaMismatch("missing key field".into()))?;

        Ok(Self {
            schema,
            fields,
            key,
        })
    }

    pub fn key_field(&self) -> Field {
        self.key
    }

    /// Convert an entity to a Tantivy document.
    pub fn to_document(&self, entity: &E) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        for (def, field) in self.schema.fields().iter().zip(&self.fields) {
            for value in def.values(entity) {
                match value {
                    FieldValue::Str(s) => doc.add_text(*field, s),
                    FieldValue::Int(v) => doc.add_i64(*field, v),
                }
            }
        }
        doc
    }

    /// Term identifying the single live document for a key.
    pub fn key_term(&self, key: &E::Key) -> Term {
        Term::from_field_text(self.key, &key.to_string())
    }

    /// Read the entity key back out of a stored document.
    ///
    /// Returns None if the key is missing or no longer parses.
    pub fn to_entity_key(&self, doc: &TantivyDocument) -> Option<E::Key> {
        doc.get_first(self.key)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<E::Key>().ok())
    }

    /// Collect the stored values of a document.
    ///
    /// With a projection, only the named fields (plus the key, which is
    /// always included) are returned.
    pub fn to_field_bundle(
        &self,
        doc: &TantivyDocument,
        projection: Option<&BTreeSet<String>>,
    ) -> FieldBundle {
        let key_name = self.schema.key_field().name();
        let mut bundle = FieldBundle::new();
        for (def, field) in self.schema.fields().iter().zip(&self.fields) {
            if !def.is_stored() {
                continue;
            }
            if let Some(wanted) = projection {
                if def.name() != key_name && !wanted.contains(def.name()) {
                    continue;
                }
            }
            for value in doc.get_all(*field) {
                let decoded = match def.kind() {
                    FieldKind::Integer | FieldKind::Timestamp => {
                        value.as_i64().map(FieldValue::Int)
                    }
                    _ => value.as_str().map(|s| FieldValue::Str(s.to_string())),
                };
                if let Some(decoded) = decoded {
                    bundle.insert(def.name(), decoded);
                }
            }
        }
        bundle
    }
}
