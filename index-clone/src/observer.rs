//! Progress hooks for a reconciliation run.
//!
//! The engine calls a [`RunObserver`] as collections and indexes are processed. The
//! binary renders these events on the terminal; [`NoopObserver`] ignores them.

use crate::error::CloneError;
use crate::types::{
    CollectionName, CollectionSummary, IndexDescriptor, ReconciliationSummary, SkipReason,
};

/// Receives progress notifications from a [`crate::reconcile::ReconciliationEngine`].
///
/// Every method has a no-op default so implementors only override what they render.
/// Methods take `&self`; implementations that keep state use interior mutability.
pub trait RunObserver {
    /// Both endpoints were enumerated; `shared` is the sorted list about to be processed.
    fn on_collections_listed(
        &self,
        _source_count: usize,
        _destination_count: usize,
        _shared: &[CollectionName],
    ) {
    }

    /// Indexes of `collection` were listed on both sides.
    fn on_collection_start(&self, _collection: &str, _index_count: usize) {}

    /// `index` was created on the destination, or would have been in a dry run.
    fn on_index_created(&self, _collection: &str, _index: &IndexDescriptor) {}

    fn on_index_skipped(&self, _collection: &str, _index: &IndexDescriptor, _reason: SkipReason) {}

    /// A conflicting destination index was dropped and `index` created in its place.
    fn on_index_replaced(&self, _collection: &str, _index: &IndexDescriptor) {}

    fn on_index_failed(&self, _collection: &str, _index: &IndexDescriptor, _error: &CloneError) {}

    fn on_collection_complete(&self, _summary: &CollectionSummary) {}

    /// The run finished without aborting.
    fn on_run_complete(&self, _summary: &ReconciliationSummary) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
