//! Top-N collector ordered by the key field.
//!
//! Each segment keeps at most `limit` hits in a bounded heap, ranked by the
//! key's term ordinal in the segment's fast column. Ordinals follow the
//! sorted term dictionary, so strings are resolved only for the survivors
//! at harvest. Equal or missing keys fall back to doc address order, which
//! keeps pagination stable over an unchanged index.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tantivy::collector::{Collector, SegmentCollector};
use tantivy::columnar::StrColumn;
use tantivy::{DocAddress, DocId, Score, SegmentOrdinal, SegmentReader};
use tracing::debug;

/// Direction of the key sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// A collected hit: its key (None when the column has no value) and address.
pub type KeyedHit = (Option<String>, DocAddress);

/// Collects the first `limit` hits in key order.
pub struct KeyOrderCollector {
    field: String,
    limit: usize,
    order: SortOrder,
}

impl KeyOrderCollector {
    pub fn new(field: impl Into<String>, limit: usize, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            limit,
            order,
        }
    }
}

fn compare(order: SortOrder, a: &KeyedHit, b: &KeyedHit) -> Ordering {
    // Missing keys go last in either direction
    let by_key = match (&a.0, &b.0) {
        (Some(x), Some(y)) => match order {
            SortOrder::Asc => x.cmp(y),
            SortOrder::Desc => y.cmp(x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_key.then_with(|| a.1.cmp(&b.1))
}

fn top_n(mut hits: Vec<KeyedHit>, order: SortOrder, limit: usize) -> Vec<KeyedHit> {
    hits.sort_by(|a, b| compare(order, a, b));
    hits.truncate(limit);
    hits
}

impl Collector for KeyOrderCollector {
    type Fruit = Vec<KeyedHit>;
    type Child = KeyOrderSegmentCollector;

    fn for_segment(
        &self,
        segment_ord: SegmentOrdinal,
        segment: &SegmentReader,
    ) -> tantivy::Result<Self::Child> {
        Ok(KeyOrderSegmentCollector {
            segment_ord,
            column: segment.fast_fields().str(&self.field)?,
            limit: self.limit,
            order: self.order,
            heap: BinaryHeap::new(),
        })
    }

    fn requires_scoring(&self) -> bool {
        false
    }

    fn merge_fruits(&self, segment_fruits: Vec<Vec<KeyedHit>>) -> tantivy::Result<Vec<KeyedHit>> {
        let merged = segment_fruits.into_iter().flatten().collect();
        Ok(top_n(merged, self.order, self.limit))
    }
}

/// Position of a hit within one segment; smaller ranks sort first.
///
/// `(missing, ordinal, doc)` where the ordinal is inverted for descending
/// order, so the tuple's natural order is the sort order.
type SegmentRank = (bool, u64, DocId);

pub struct KeyOrderSegmentCollector {
    segment_ord: SegmentOrdinal,
    column: Option<StrColumn>,
    limit: usize,
    order: SortOrder,
    /// Max-heap of the best `limit` ranks; the worst survivor is on top
    heap: BinaryHeap<SegmentRank>,
}

impl KeyOrderSegmentCollector {
    fn rank(&self, doc: DocId) -> SegmentRank {
        let ord = self
            .column
            .as_ref()
            .and_then(|column| column.ords().first(doc));
        match (ord, self.order) {
            (Some(ord), SortOrder::Asc) => (false, ord, doc),
            (Some(ord), SortOrder::Desc) => (false, u64::MAX - ord, doc),
            (None, _) => (true, 0, doc),
        }
    }

    fn resolve(&self, rank: SegmentRank) -> Option<String> {
        let (missing, ord, doc) = rank;
        if missing {
            return None;
        }
        let ord = match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => u64::MAX - ord,
        };
        let column = self.column.as_ref()?;
        let mut key = String::new();
        match column.ord_to_str(ord, &mut key) {
            Ok(true) => Some(key),
            _ => {
                debug!(doc, ord, "Key ordinal not found in term dictionary");
                None
            }
        }
    }
}

impl SegmentCollector for KeyOrderSegmentCollector {
    type Fruit = Vec<KeyedHit>;

    fn collect(&mut self, doc: DocId, _score: Score) {
        if self.limit == 0 {
            return;
        }
        let rank = self.rank(doc);
        if self.heap.len() < self.limit {
            self.heap.push(rank);
        } else if self.heap.peek().is_some_and(|worst| rank < *worst) {
            self.heap.pop();
            self.heap.push(rank);
        }
    }

    fn harvest(self) -> Vec<KeyedHit> {
        let hits = self
            .heap
            .iter()
            .map(|&rank| (self.resolve(rank), DocAddress::new(self.segment_ord, rank.2)))
            .collect();
        top_n(hits, self.order, self.limit)
    }
}
