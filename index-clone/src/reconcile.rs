//! The reconciliation engine: copies index definitions from a source catalog to a
//! destination catalog for every collection present on both.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::pin::pin;

use futures::{StreamExt, stream};
use index_clone_config::shared::{ConflictPolicy, ErrorPolicy, ReconcileConfig};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::clone_error;
use crate::error::{CloneError, CloneResult, ErrorKind};
use crate::observer::{NoopObserver, RunObserver};
use crate::types::{
    CollectionName, CollectionSummary, CreateIndexOptions, IndexDescriptor, IndexFailure,
    ReconciliationSummary, SkipReason, SkippedIndex,
};

/// What the engine intends to do with one source index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPlan {
    /// The destination has no index with this name.
    Create,
    /// The destination index with this name is dropped and created with the source keys.
    Replace,
    /// Nothing to do on the destination.
    Skip(SkipReason),
    /// The destination index with this name has different keys and the policy forbids
    /// touching it.
    Conflict,
}

#[derive(Debug, Clone, Copy)]
enum IndexOutcome {
    Created,
    Replaced,
    Skipped(SkipReason),
}

/// Returns the collections present on both sides, sorted and without duplicates.
pub fn shared_collections(
    source: &[CollectionName],
    destination: &[CollectionName],
) -> Vec<CollectionName> {
    let destination: HashSet<&str> = destination.iter().map(String::as_str).collect();

    source
        .iter()
        .filter(|name| destination.contains(name.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Decides what to do with `index` given the indexes already on the destination.
///
/// Only a same-name index on the destination influences the plan. A destination index
/// with the same keys under another name is left for the server to reject.
pub fn plan_index(
    index: &IndexDescriptor,
    destination_indexes: &[IndexDescriptor],
    conflict_policy: ConflictPolicy,
) -> IndexPlan {
    let Some(existing) = destination_indexes
        .iter()
        .find(|existing| existing.name == index.name)
    else {
        return IndexPlan::Create;
    };

    if existing.has_same_keys(index) {
        return IndexPlan::Skip(SkipReason::AlreadyExists);
    }

    match conflict_policy {
        ConflictPolicy::Fail => IndexPlan::Conflict,
        ConflictPolicy::Skip => IndexPlan::Skip(SkipReason::Conflict),
        ConflictPolicy::Replace => IndexPlan::Replace,
    }
}

/// Copies index definitions between two catalogs.
///
/// Collections are processed one at a time in name order. Within a collection, indexes
/// are applied in source order with at most
/// [`ReconcileConfig::max_concurrent_creations`] operations in flight. The `_id_` index
/// is reported in the summary but never created.
#[derive(Debug)]
pub struct ReconciliationEngine<S, D, O = NoopObserver> {
    source: S,
    destination: D,
    config: ReconcileConfig,
    observer: O,
}

impl<S, D> ReconciliationEngine<S, D>
where
    S: Catalog,
    D: Catalog,
{
    pub fn new(source: S, destination: D, config: ReconcileConfig) -> Self {
        Self {
            source,
            destination,
            config,
            observer: NoopObserver,
        }
    }
}

impl<S, D, O> ReconciliationEngine<S, D, O>
where
    S: Catalog,
    D: Catalog,
    O: RunObserver,
{
    /// Replaces the observer notified during the run.
    pub fn with_observer<P: RunObserver>(self, observer: P) -> ReconciliationEngine<S, D, P> {
        ReconciliationEngine {
            source: self.source,
            destination: self.destination,
            config: self.config,
            observer,
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Runs the reconciliation and returns the summary.
    ///
    /// With [`ErrorPolicy::FailFast`] the first failure is returned and nothing after it
    /// is attempted. With [`ErrorPolicy::Continue`] index failures are collected in
    /// [`ReconciliationSummary::failures`]; listing failures still abort the run.
    pub async fn run(&self) -> CloneResult<ReconciliationSummary> {
        info!(
            source = self.source.endpoint(),
            destination = self.destination.endpoint(),
            background = self.config.background,
            dry_run = self.config.dry_run,
            "starting index reconciliation"
        );

        let result = match self.config.run_timeout() {
            Some(run_timeout) => tokio::time::timeout(run_timeout, self.reconcile())
                .await
                .unwrap_or_else(|_| {
                    Err(clone_error!(
                        ErrorKind::RunTimedOut,
                        "Run exceeded its deadline",
                        format!("{} ms", run_timeout.as_millis())
                    ))
                }),
            None => self.reconcile().await,
        };

        match &result {
            Ok(summary) => {
                info!(
                    collections = summary.collections.len(),
                    created = summary.created_count(),
                    failures = summary.failures.len(),
                    "index reconciliation completed"
                );
                self.observer.on_run_complete(summary);
            }
            Err(err) => warn!(error = %err, "index reconciliation failed"),
        }

        result
    }

    /// Shuts down both catalogs, aggregating their errors.
    pub async fn shutdown(&self) -> CloneResult<()> {
        let (source, destination) =
            tokio::join!(self.source.shutdown(), self.destination.shutdown());

        let errors: Vec<CloneError> = [source, destination]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    async fn reconcile(&self) -> CloneResult<ReconciliationSummary> {
        let (source_collections, destination_collections) = tokio::try_join!(
            self.bounded(
                || describe_on("listing collections", &self.source),
                self.source.list_collections()
            ),
            self.bounded(
                || describe_on("listing collections", &self.destination),
                self.destination.list_collections()
            ),
        )?;

        let shared = shared_collections(&source_collections, &destination_collections);
        info!(
            source = source_collections.len(),
            destination = destination_collections.len(),
            shared = shared.len(),
            "collections listed"
        );
        self.observer.on_collections_listed(
            source_collections.len(),
            destination_collections.len(),
            &shared,
        );

        let mut summary = ReconciliationSummary {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        for collection in &shared {
            let collection_summary = self
                .reconcile_collection(collection, &mut summary.failures)
                .await?;
            self.observer.on_collection_complete(&collection_summary);
            summary.collections.push(collection_summary);
        }

        Ok(summary)
    }

    async fn reconcile_collection(
        &self,
        collection: &str,
        failures: &mut Vec<IndexFailure>,
    ) -> CloneResult<CollectionSummary> {
        let source_indexes = self
            .bounded(
                || describe_on(&format!("listing indexes of {collection}"), &self.source),
                self.source.list_indexes(collection),
            )
            .await?;
        let destination_indexes = self
            .bounded(
                || describe_on(&format!("listing indexes of {collection}"), &self.destination),
                self.destination.list_indexes(collection),
            )
            .await?;

        let mut summary = CollectionSummary::new(collection);
        summary.index_names = source_indexes
            .iter()
            .map(|index| index.name.clone())
            .collect();

        info!(collection, indexes = source_indexes.len(), "reconciling collection");
        self.observer
            .on_collection_start(collection, source_indexes.len());

        let plans: Vec<(&IndexDescriptor, IndexPlan)> = source_indexes
            .iter()
            .filter(|index| !index.is_primary_key())
            .map(|index| {
                let plan = plan_index(index, &destination_indexes, self.config.conflict_policy);
                debug!(collection, index = %index.name, ?plan, "planned index");
                (index, plan)
            })
            .collect();

        let concurrency = usize::from(self.config.max_concurrent_creations.max(1));
        let destination_indexes = &destination_indexes;
        let mut outcomes = pin!(
            stream::iter(plans)
                .map(move |(index, plan)| async move {
                    let outcome = self
                        .apply_plan(collection, index, plan, destination_indexes)
                        .await;
                    (index, outcome)
                })
                .buffered(concurrency)
        );

        while let Some((index, outcome)) = outcomes.next().await {
            match outcome {
                Ok(IndexOutcome::Created) => {
                    self.observer.on_index_created(collection, index);
                    summary.created.push(index.name.clone());
                }
                Ok(IndexOutcome::Replaced) => {
                    self.observer.on_index_replaced(collection, index);
                    summary.replaced.push(index.name.clone());
                }
                Ok(IndexOutcome::Skipped(reason)) => {
                    self.observer.on_index_skipped(collection, index, reason);
                    summary.skipped.push(SkippedIndex {
                        name: index.name.clone(),
                        reason,
                    });
                }
                Err(err) => {
                    self.observer.on_index_failed(collection, index, &err);

                    match self.config.error_policy {
                        ErrorPolicy::FailFast => return Err(err),
                        ErrorPolicy::Continue => {
                            warn!(
                                collection,
                                index = %index.name,
                                error = %err,
                                "index operation failed, continuing"
                            );
                            failures.push(IndexFailure {
                                collection: collection.to_string(),
                                index_name: index.name.clone(),
                                kind: err.kind(),
                                message: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn apply_plan(
        &self,
        collection: &str,
        index: &IndexDescriptor,
        plan: IndexPlan,
        destination_indexes: &[IndexDescriptor],
    ) -> CloneResult<IndexOutcome> {
        let options = CreateIndexOptions {
            background: self.config.background,
        };

        match plan {
            IndexPlan::Skip(reason) => {
                debug!(collection, index = %index.name, %reason, "skipping index");
                Ok(IndexOutcome::Skipped(reason))
            }
            IndexPlan::Conflict => Err(clone_error!(
                ErrorKind::IndexConflict,
                "Destination index has the same name but different keys",
                format!("{collection}.{}", index.name)
            )),
            IndexPlan::Create => {
                if !self.config.dry_run {
                    self.bounded(
                        || format!("creating index {collection}.{}", index.name),
                        self.destination.create_index(collection, index, options),
                    )
                    .await?;
                }
                info!(
                    collection,
                    index = %index.name,
                    keys = %index.keys,
                    background = options.background,
                    dry_run = self.config.dry_run,
                    "index created"
                );

                Ok(IndexOutcome::Created)
            }
            IndexPlan::Replace => {
                if !self.config.dry_run {
                    self.bounded(
                        || format!("dropping index {collection}.{}", index.name),
                        self.destination.drop_index(collection, &index.name),
                    )
                    .await?;
                    let created = self
                        .bounded(
                            || format!("creating index {collection}.{}", index.name),
                            self.destination.create_index(collection, index, options),
                        )
                        .await;
                    if let Err(err) = created {
                        let previous = destination_indexes
                            .iter()
                            .find(|existing| existing.name == index.name);
                        let err = self
                            .restore_replaced(collection, previous, options, err)
                            .await;
                        return Err(err);
                    }
                }
                info!(
                    collection,
                    index = %index.name,
                    keys = %index.keys,
                    dry_run = self.config.dry_run,
                    "index replaced"
                );

                Ok(IndexOutcome::Replaced)
            }
        }
    }

    /// Recreates the destination index dropped by a replacement whose creation failed.
    ///
    /// The returned error keeps the kind of the failed creation. Its detail says whether
    /// the original definition is back or the index is now missing.
    async fn restore_replaced(
        &self,
        collection: &str,
        previous: Option<&IndexDescriptor>,
        options: CreateIndexOptions,
        err: CloneError,
    ) -> CloneError {
        let kind = err.kind();
        let Some(previous) = previous else {
            return clone_error!(
                kind,
                "Replacement index could not be created",
                format!("{collection}: dropped, not recreated"),
                source: err
            );
        };

        let restored = self
            .bounded(
                || format!("restoring index {collection}.{}", previous.name),
                self.destination.create_index(collection, previous, options),
            )
            .await;

        match restored {
            Ok(()) => {
                warn!(
                    collection,
                    index = %previous.name,
                    "replacement failed, original index restored"
                );
                clone_error!(
                    kind,
                    "Replacement index could not be created",
                    format!("{collection}.{}: original definition restored", previous.name),
                    source: err
                )
            }
            Err(restore_err) => {
                warn!(
                    collection,
                    index = %previous.name,
                    error = %restore_err,
                    "replacement failed and the original index could not be restored"
                );
                clone_error!(
                    kind,
                    "Replacement index could not be created",
                    format!("{collection}.{}: dropped, not recreated", previous.name),
                    source: err
                )
            }
        }
    }

    /// Bounds `operation` by the configured per-operation timeout.
    async fn bounded<T, F>(
        &self,
        describe: impl FnOnce() -> String,
        operation: F,
    ) -> CloneResult<T>
    where
        F: Future<Output = CloneResult<T>>,
    {
        let Some(operation_timeout) = self.config.operation_timeout() else {
            return operation.await;
        };

        match tokio::time::timeout(operation_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(clone_error!(
                ErrorKind::OperationTimedOut,
                "Database operation timed out",
                format!("{} after {} ms", describe(), operation_timeout.as_millis())
            )),
        }
    }
}

fn describe_on<C: Catalog>(action: &str, catalog: &C) -> String {
    format!("{action} on {} {}", catalog.role(), catalog.endpoint())
}
