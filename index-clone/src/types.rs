//! Domain types shared by catalogs, the reconciliation engine and reporters.

use std::fmt;

use mongodb::bson::{Bson, Document};
use serde::Serialize;

use crate::error::ErrorKind;

/// Name of the primary-key index every collection carries implicitly.
pub const PRIMARY_KEY_INDEX_NAME: &str = "_id_";

/// Name of a collection, unique within one database.
pub type CollectionName = String;

/// An index as reported by a catalog: its name and its ordered key specification.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    /// Index name, unique within a collection.
    pub name: String,
    /// Ordered mapping of field name to sort direction or index type.
    pub keys: Document,
}

impl IndexDescriptor {
    /// Creates a new descriptor.
    pub fn new(name: impl Into<String>, keys: Document) -> Self {
        Self {
            name: name.into(),
            keys,
        }
    }

    /// Returns the descriptor of the implicit `_id_` index.
    pub fn primary_key() -> Self {
        Self::new(PRIMARY_KEY_INDEX_NAME, mongodb::bson::doc! { "_id": 1 })
    }

    /// Returns `true` for the implicit primary-key index.
    pub fn is_primary_key(&self) -> bool {
        self.name == PRIMARY_KEY_INDEX_NAME
    }

    /// Returns `true` when both descriptors have the same key specification, in order.
    ///
    /// Numeric directions compare by value, so `1`, `1i64` and `1.0` are the same key.
    pub fn has_same_keys(&self, other: &IndexDescriptor) -> bool {
        self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .zip(other.keys.iter())
                .all(|((field_a, value_a), (field_b, value_b))| {
                    field_a == field_b && same_directive(value_a, value_b)
                })
    }
}

fn same_directive(a: &Bson, b: &Bson) -> bool {
    match (numeric_directive(a), numeric_directive(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn numeric_directive(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.keys)
    }
}

/// Options applied when creating an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateIndexOptions {
    /// Build the index in background mode.
    pub background: bool,
}

/// Why an index was not created on the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The destination already has an index with the same name and keys.
    AlreadyExists,
    /// The destination has an index with the same name but different keys and the
    /// conflict policy asked to leave it alone.
    Conflict,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => f.write_str("already exists"),
            SkipReason::Conflict => f.write_str("conflicting definition kept"),
        }
    }
}

/// An index that was not created, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedIndex {
    pub name: String,
    pub reason: SkipReason,
}

/// Outcome for one collection that exists on both endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    /// The collection name.
    pub collection: CollectionName,
    /// Every source index name in source order, including the primary-key index.
    pub index_names: Vec<String>,
    /// Indexes created on the destination.
    pub created: Vec<String>,
    /// Indexes dropped and created again because of a conflicting definition.
    pub replaced: Vec<String>,
    /// Indexes that were left alone.
    pub skipped: Vec<SkippedIndex>,
}

impl CollectionSummary {
    /// Creates an empty summary for `collection`.
    pub fn new(collection: impl Into<CollectionName>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Number of source indexes, including the primary-key index.
    pub fn index_count(&self) -> usize {
        self.index_names.len()
    }
}

/// A failed index operation recorded when the run continues past errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexFailure {
    pub collection: CollectionName,
    pub index_name: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of a whole run, one entry per processed collection in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub collections: Vec<CollectionSummary>,
    pub failures: Vec<IndexFailure>,
    /// `true` when no index was actually created or dropped.
    pub dry_run: bool,
}

impl ReconciliationSummary {
    /// Returns `true` when no shared collection was found.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Total number of indexes created, including replacements.
    pub fn created_count(&self) -> usize {
        self.collections
            .iter()
            .map(|summary| summary.created.len() + summary.replaced.len())
            .sum()
    }

    /// Returns `true` when at least one index operation failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
