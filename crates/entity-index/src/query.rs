//! Compiles predicate trees into Tantivy queries.
//!
//! Boolean structure is carried over one to one: AND becomes `Must`
//! clauses, OR becomes `Should` clauses and NOT becomes `MustNot` paired
//! with a match-all clause, since a purely negative boolean query matches
//! nothing in Tantivy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, FuzzyTermQuery, Occur, Query, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, Term};

use crate::error::{IndexError, QueryParseError};
use crate::predicate::{Operator, OperatorPredicate, Predicate};
use crate::schema::{FieldDef, FieldKind, IndexSchema, IndexedEntity};

/// Translates predicates over one schema into native queries.
pub struct QueryCompiler<E: IndexedEntity> {
    schema: Arc<IndexSchema<E>>,
    index: Index,
    fields: HashMap<&'static str, Field>,
}

impl<E: IndexedEntity> QueryCompiler<E> {
    pub fn new(schema: Arc<IndexSchema<E>>, index: &Index) -> Result<Self, IndexError> {
        let tantivy_schema = index.schema();
        let mut fields = HashMap::with_capacity(schema.fields().len());
        for def in schema.fields() {
            let field = tantivy_schema.get_field(def.name()).map_err(|_| {
                IndexError::SchemaMismatch(format!("missing {} field", def.name()))
            })?;
            fields.insert(def.name(), field);
        }

        Ok(Self {
            schema,
            index: index.clone(),
            fields,
        })
    }

    /// Compile a predicate tree.
    ///
    /// Fails if a leaf names a field the schema does not have, applies an
    /// operator the field's kind does not support, or carries a value that
    /// does not fit the field's type.
    pub fn compile(&self, predicate: &Predicate<E>) -> Result<Box<dyn Query>, QueryParseError> {
        match predicate {
            Predicate::Any => Ok(Box::new(AllQuery)),
            Predicate::Operator(leaf) => self.compile_leaf(leaf),
            Predicate::And(children) => self.compile_and(children),
            Predicate::Or(children) => self.compile_or(children),
            Predicate::Not(child) => Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, self.compile(child)?),
            ]))),
        }
    }

    /// Exact lookup of a single key, bypassing the predicate path.
    pub fn key_query(&self, key: &E::Key) -> Box<dyn Query> {
        let field = self.fields[self.schema.key_field().name()];
        Box::new(TermQuery::new(
            Term::from_field_text(field, &key.to_string()),
            IndexRecordOption::Basic,
        ))
    }

    fn compile_and(&self, children: &[Predicate<E>]) -> Result<Box<dyn Query>, QueryParseError> {
        if children.is_empty() {
            return Ok(Box::new(AllQuery));
        }
        if let [only] = children {
            return self.compile(only);
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(children.len() + 1);
        let mut has_positive = false;
        for child in children {
            match child {
                Predicate::Not(inner) => clauses.push((Occur::MustNot, self.compile(inner)?)),
                other => {
                    has_positive = true;
                    clauses.push((Occur::Must, self.compile(other)?));
                }
            }
        }
        if !has_positive {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn compile_or(&self, children: &[Predicate<E>]) -> Result<Box<dyn Query>, QueryParseError> {
        if children.is_empty() {
            return Ok(Box::new(EmptyQuery));
        }
        if let [only] = children {
            return self.compile(only);
        }

        let clauses = children
            .iter()
            .map(|child| Ok((Occur::Should, self.compile(child)?)))
            .collect::<Result<Vec<_>, QueryParseError>>()?;
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn compile_leaf(&self, leaf: &OperatorPredicate<E>) -> Result<Box<dyn Query>, QueryParseError> {
        let def = self
            .schema
            .field(leaf.field())
            .ok_or_else(|| QueryParseError::new(format!("unknown field: {}", leaf.field())))?;
        let field = self.fields[def.name()];
        let value = leaf.value();
        if value.is_empty() {
            return Err(QueryParseError::new(format!(
                "empty value for field {}",
                def.name()
            )));
        }

        match (def.kind(), leaf.operator()) {
            (FieldKind::Exact, Operator::Equals) => {
                Ok(term_query(Term::from_field_text(field, value)))
            }
            (FieldKind::Exact, Operator::Prefix) => Ok(Box::new(FuzzyTermQuery::new_prefix(
                Term::from_field_text(field, value),
                0,
                true,
            ))),
            // Prefix fields index lower-cased parts
            (FieldKind::Prefix, Operator::Equals) => {
                Ok(term_query(Term::from_field_text(field, &value.to_lowercase())))
            }
            (FieldKind::Prefix, Operator::Prefix) => Ok(Box::new(FuzzyTermQuery::new_prefix(
                Term::from_field_text(field, &value.to_lowercase()),
                0,
                true,
            ))),
            (FieldKind::FullText, Operator::Contains) => self.full_text(def, field, value),
            (FieldKind::Integer, Operator::Equals) => {
                let parsed = value.parse::<i64>().map_err(|_| {
                    QueryParseError::new(format!(
                        "field {} expects an integer, got {:?}",
                        def.name(),
                        value
                    ))
                })?;
                Ok(term_query(Term::from_field_i64(field, parsed)))
            }
            (FieldKind::Timestamp, Operator::Equals) => {
                let millis = parse_timestamp(value).ok_or_else(|| {
                    QueryParseError::new(format!(
                        "field {} expects epoch millis or RFC 3339, got {:?}",
                        def.name(),
                        value
                    ))
                })?;
                Ok(term_query(Term::from_field_i64(field, millis)))
            }
            (kind, op) => Err(QueryParseError::new(format!(
                "operator {} is not supported for {} field {}",
                op,
                kind,
                def.name()
            ))),
        }
    }

    /// Every token of `value`, as produced by the field's tokenizer, must match.
    fn full_text(
        &self,
        def: &FieldDef<E>,
        field: Field,
        value: &str,
    ) -> Result<Box<dyn Query>, QueryParseError> {
        let mut analyzer = self
            .index
            .tokenizer_for_field(field)
            .map_err(|e| QueryParseError::new(format!("no tokenizer for {}: {}", def.name(), e)))?;

        let mut terms = Vec::new();
        let mut stream = analyzer.token_stream(value);
        while stream.advance() {
            terms.push(Term::from_field_text(field, &stream.token().text));
        }
        drop(stream);

        match terms.len() {
            0 => Err(QueryParseError::new(format!(
                "no searchable terms in {:?} for field {}",
                value,
                def.name()
            ))),
            1 => Ok(term_query(terms.remove(0))),
            _ => Ok(Box::new(BooleanQuery::new(
                terms
                    .into_iter()
                    .map(|term| (Occur::Must, term_query(term)))
                    .collect(),
            ))),
        }
    }
}

fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

fn parse_timestamp(value: &str) -> Option<i64> {
    value.parse::<i64>().ok().or_else(|| {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.timestamp_millis())
    })
}
