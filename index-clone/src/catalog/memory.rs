use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::bail;
use crate::catalog::{Catalog, EndpointRole};
use crate::error::{CloneResult, ErrorKind};
use crate::types::{CollectionName, CreateIndexOptions, IndexDescriptor, PRIMARY_KEY_INDEX_NAME};

/// A call received by a [`MemoryCatalog`], recorded in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogCall {
    ListCollections,
    ListIndexes {
        collection: CollectionName,
    },
    CreateIndex {
        collection: CollectionName,
        index: IndexDescriptor,
        background: bool,
    },
    DropIndex {
        collection: CollectionName,
        index_name: String,
    },
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    collection: CollectionName,
    index_name: Option<String>,
    kind: ErrorKind,
    /// Number of creations left to fail, unlimited when [`None`].
    remaining: Option<usize>,
}

impl InjectedFailure {
    fn matches(&self, collection: &str, index_name: &str) -> bool {
        self.collection == collection
            && self
                .index_name
                .as_ref()
                .is_none_or(|name| name == index_name)
    }
}

/// Tracks how many creations are running at once.
#[derive(Debug, Default)]
struct CreateGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CreateGauge {
    fn enter(self: &Arc<Self>) -> CreateGuard {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        CreateGuard {
            gauge: self.clone(),
        }
    }
}

/// Leaves the gauge when dropped, including when the creation is cancelled.
struct CreateGuard {
    gauge: Arc<CreateGauge>,
}

impl Drop for CreateGuard {
    fn drop(&mut self) {
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct Inner {
    collections: Vec<(CollectionName, Vec<IndexDescriptor>)>,
    calls: Vec<CatalogCall>,
    create_failures: Vec<InjectedFailure>,
    list_index_failures: Vec<CollectionName>,
    fail_list_collections: bool,
    latency: Option<Duration>,
    shutdown_called: bool,
}

impl Inner {
    fn indexes_mut(&mut self, collection: &str) -> Option<&mut Vec<IndexDescriptor>> {
        self.collections
            .iter_mut()
            .find(|(name, _)| name == collection)
            .map(|(_, indexes)| indexes)
    }
}

/// In-memory catalog for tests and development.
///
/// [`MemoryCatalog`] follows the server rules that matter when copying indexes: every
/// collection carries an implicit `_id_` index, creating an index on a missing collection
/// creates the collection, recreating an identical index is a no-op, and reusing a name or
/// a key specification for a different index is a conflict. Every call is recorded so tests
/// can assert on what the engine asked for, and failures can be injected per index.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    role: EndpointRole,
    endpoint: String,
    inner: Arc<Mutex<Inner>>,
    creates: Arc<CreateGauge>,
}

impl MemoryCatalog {
    /// Creates an empty catalog playing `role`.
    pub fn new(role: EndpointRole) -> Self {
        let inner = Inner {
            collections: Vec::new(),
            calls: Vec::new(),
            create_failures: Vec::new(),
            list_index_failures: Vec::new(),
            fail_list_collections: false,
            latency: None,
            shutdown_called: false,
        };

        Self {
            role,
            endpoint: format!("memory://{role}"),
            inner: Arc::new(Mutex::new(inner)),
            creates: Arc::default(),
        }
    }

    /// Adds `collection` with its implicit `_id_` index followed by `indexes`.
    ///
    /// Replaces any collection of the same name.
    pub async fn add_collection(&self, collection: &str, indexes: Vec<IndexDescriptor>) {
        let mut all_indexes = vec![IndexDescriptor::primary_key()];
        all_indexes.extend(indexes.into_iter().filter(|index| !index.is_primary_key()));

        let mut inner = self.inner.lock().await;
        inner.collections.retain(|(name, _)| name != collection);
        inner.collections.push((collection.to_string(), all_indexes));
    }

    /// Makes every creation of `index_name` on `collection` fail with `kind`.
    pub async fn fail_create_index(&self, collection: &str, index_name: &str, kind: ErrorKind) {
        let mut inner = self.inner.lock().await;
        inner.create_failures.push(InjectedFailure {
            collection: collection.to_string(),
            index_name: Some(index_name.to_string()),
            kind,
            remaining: None,
        });
    }

    /// Makes only the next creation of `index_name` on `collection` fail with `kind`.
    pub async fn fail_create_index_once(
        &self,
        collection: &str,
        index_name: &str,
        kind: ErrorKind,
    ) {
        let mut inner = self.inner.lock().await;
        inner.create_failures.push(InjectedFailure {
            collection: collection.to_string(),
            index_name: Some(index_name.to_string()),
            kind,
            remaining: Some(1),
        });
    }

    /// Makes every creation on `collection` fail with `kind`.
    pub async fn fail_create_in_collection(&self, collection: &str, kind: ErrorKind) {
        let mut inner = self.inner.lock().await;
        inner.create_failures.push(InjectedFailure {
            collection: collection.to_string(),
            index_name: None,
            kind,
            remaining: None,
        });
    }

    /// Makes listing the indexes of `collection` fail.
    pub async fn fail_list_indexes(&self, collection: &str) {
        self.inner
            .lock()
            .await
            .list_index_failures
            .push(collection.to_string());
    }

    /// Makes listing collections fail.
    pub async fn fail_list_collections(&self) {
        self.inner.lock().await.fail_list_collections = true;
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.inner.lock().await.latency = Some(latency);
    }

    /// Returns the indexes of `collection`, or [`None`] if it does not exist.
    pub async fn indexes(&self, collection: &str) -> Option<Vec<IndexDescriptor>> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, indexes)| indexes.clone())
    }

    /// Returns the index names of `collection`, empty if it does not exist.
    pub async fn index_names(&self, collection: &str) -> Vec<String> {
        self.indexes(collection)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|index| index.name)
            .collect()
    }

    /// Returns a copy of every call received so far.
    pub async fn calls(&self) -> Vec<CatalogCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Returns the `(collection, index name)` pairs of every create call, in order.
    pub async fn create_calls(&self) -> Vec<(CollectionName, String)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                CatalogCall::CreateIndex {
                    collection, index, ..
                } => Some((collection, index.name)),
                _ => None,
            })
            .collect()
    }

    /// Returns the highest number of creations that were in progress at the same time.
    pub fn peak_concurrent_creates(&self) -> usize {
        self.creates.peak.load(Ordering::SeqCst)
    }

    /// Returns `true` once [`Catalog::shutdown`] has been called.
    pub async fn shutdown_called(&self) -> bool {
        self.inner.lock().await.shutdown_called
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Catalog for MemoryCatalog {
    fn role(&self) -> EndpointRole {
        self.role
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn shutdown(&self) -> CloneResult<()> {
        self.inner.lock().await.shutdown_called = true;
        Ok(())
    }

    async fn list_collections(&self) -> CloneResult<Vec<CollectionName>> {
        self.simulate_latency().await;

        let mut inner = self.inner.lock().await;
        inner.calls.push(CatalogCall::ListCollections);

        if inner.fail_list_collections {
            bail!(
                self.role.list_failed_kind(),
                "Listing collections failed",
                self.endpoint
            );
        }

        Ok(inner
            .collections
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn list_indexes(&self, collection: &str) -> CloneResult<Vec<IndexDescriptor>> {
        self.simulate_latency().await;

        let mut inner = self.inner.lock().await;
        inner.calls.push(CatalogCall::ListIndexes {
            collection: collection.to_string(),
        });

        if inner.list_index_failures.iter().any(|name| name == collection) {
            bail!(
                self.role.list_failed_kind(),
                "Listing indexes failed",
                format!("{collection} on {}", self.endpoint)
            );
        }

        match inner.indexes_mut(collection) {
            Some(indexes) => Ok(indexes.clone()),
            None => bail!(
                self.role.list_failed_kind(),
                "Collection does not exist",
                format!("{collection} on {}", self.endpoint)
            ),
        }
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexDescriptor,
        options: CreateIndexOptions,
    ) -> CloneResult<()> {
        let _guard = self.creates.enter();
        self.simulate_latency().await;

        let mut inner = self.inner.lock().await;
        inner.calls.push(CatalogCall::CreateIndex {
            collection: collection.to_string(),
            index: index.clone(),
            background: options.background,
        });

        let injected = inner
            .create_failures
            .iter()
            .position(|failure| failure.matches(collection, &index.name));
        if let Some(position) = injected {
            let failure = &mut inner.create_failures[position];
            let kind = failure.kind;
            let exhausted = match &mut failure.remaining {
                Some(remaining) => {
                    *remaining = remaining.saturating_sub(1);
                    *remaining == 0
                }
                None => false,
            };
            if exhausted {
                inner.create_failures.remove(position);
            }

            bail!(
                kind,
                "Injected index creation failure",
                format!("{collection}.{}", index.name)
            );
        }

        if inner.indexes_mut(collection).is_none() {
            debug!(collection, "creating collection implicitly");
            inner
                .collections
                .push((collection.to_string(), vec![IndexDescriptor::primary_key()]));
        }

        let Some(indexes) = inner.indexes_mut(collection) else {
            bail!(ErrorKind::Unknown, "Collection vanished", collection);
        };

        if let Some(existing) = indexes.iter().find(|existing| existing.name == index.name) {
            if existing.has_same_keys(index) {
                return Ok(());
            }

            bail!(
                ErrorKind::IndexConflict,
                "An existing index has the same name as the requested index",
                format!("{collection}.{}: existing keys {}", index.name, existing.keys)
            );
        }

        if let Some(existing) = indexes.iter().find(|existing| existing.has_same_keys(index)) {
            bail!(
                ErrorKind::IndexConflict,
                "Index already exists with a different name",
                format!("{collection}.{} matches {}", index.name, existing.name)
            );
        }

        indexes.push(index.clone());

        Ok(())
    }

    async fn drop_index(&self, collection: &str, index_name: &str) -> CloneResult<()> {
        self.simulate_latency().await;

        let mut inner = self.inner.lock().await;
        inner.calls.push(CatalogCall::DropIndex {
            collection: collection.to_string(),
            index_name: index_name.to_string(),
        });

        if index_name == PRIMARY_KEY_INDEX_NAME {
            bail!(
                ErrorKind::IndexDropFailed,
                "The primary-key index cannot be dropped",
                collection
            );
        }

        let Some(indexes) = inner.indexes_mut(collection) else {
            bail!(
                ErrorKind::IndexDropFailed,
                "Collection does not exist",
                collection
            );
        };

        let before = indexes.len();
        indexes.retain(|index| index.name != index_name);
        if indexes.len() == before {
            bail!(
                ErrorKind::IndexDropFailed,
                "Index not found",
                format!("{collection}.{index_name}")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    const BACKGROUND: CreateIndexOptions = CreateIndexOptions { background: true };

    fn email_index() -> IndexDescriptor {
        IndexDescriptor::new("email_1", doc! { "email": 1 })
    }

    #[tokio::test]
    async fn test_collections_carry_primary_key_index() {
        let catalog = MemoryCatalog::new(EndpointRole::Source);
        catalog.add_collection("orders", vec![email_index()]).await;

        assert_eq!(catalog.index_names("orders").await, vec!["_id_", "email_1"]);
    }

    #[tokio::test]
    async fn test_identical_recreate_is_noop() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);
        catalog.add_collection("orders", vec![email_index()]).await;

        catalog
            .create_index("orders", &email_index(), BACKGROUND)
            .await
            .unwrap();

        assert_eq!(catalog.index_names("orders").await, vec!["_id_", "email_1"]);
        assert_eq!(catalog.create_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_name_different_keys_conflicts() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);
        catalog.add_collection("orders", vec![email_index()]).await;

        let err = catalog
            .create_index(
                "orders",
                &IndexDescriptor::new("email_1", doc! { "email": -1 }),
                BACKGROUND,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IndexConflict);
    }

    #[tokio::test]
    async fn test_same_keys_different_name_conflicts() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);
        catalog.add_collection("orders", vec![email_index()]).await;

        let err = catalog
            .create_index(
                "orders",
                &IndexDescriptor::new("by_email", doc! { "email": 1 }),
                BACKGROUND,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IndexConflict);
    }

    #[tokio::test]
    async fn test_create_on_missing_collection_creates_it() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);

        catalog
            .create_index("events", &email_index(), BACKGROUND)
            .await
            .unwrap();

        assert_eq!(catalog.index_names("events").await, vec!["_id_", "email_1"]);
    }

    #[tokio::test]
    async fn test_list_indexes_of_missing_collection_fails_with_role_kind() {
        let catalog = MemoryCatalog::new(EndpointRole::Source);

        let err = catalog.list_indexes("missing").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceListFailed);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_to_named_index_only() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);
        catalog.add_collection("orders", vec![]).await;
        catalog
            .fail_create_index("orders", "email_1", ErrorKind::IndexCreationFailed)
            .await;

        let err = catalog
            .create_index("orders", &email_index(), BACKGROUND)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexCreationFailed);

        catalog
            .create_index(
                "orders",
                &IndexDescriptor::new("sku_1", doc! { "sku": 1 }),
                BACKGROUND,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_shot_failure_fires_once() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);
        catalog.add_collection("orders", vec![]).await;
        catalog
            .fail_create_index_once("orders", "email_1", ErrorKind::IndexCreationFailed)
            .await;

        let err = catalog
            .create_index("orders", &email_index(), BACKGROUND)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexCreationFailed);

        catalog
            .create_index("orders", &email_index(), BACKGROUND)
            .await
            .unwrap();
        assert_eq!(catalog.index_names("orders").await, vec!["_id_", "email_1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_concurrent_creates() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);
        catalog.set_latency(Duration::from_millis(10)).await;

        let email_index = email_index();
        let sku_index = IndexDescriptor::new("sku_1", doc! { "sku": 1 });
        let (first, second) = tokio::join!(
            catalog.create_index("orders", &email_index, BACKGROUND),
            catalog.create_index("orders", &sku_index, BACKGROUND),
        );
        first.unwrap();
        second.unwrap();
        catalog
            .create_index(
                "orders",
                &IndexDescriptor::new("age_1", doc! { "age": 1 }),
                BACKGROUND,
            )
            .await
            .unwrap();

        assert_eq!(catalog.peak_concurrent_creates(), 2);
    }

    #[tokio::test]
    async fn test_drop_index() {
        let catalog = MemoryCatalog::new(EndpointRole::Destination);
        catalog.add_collection("orders", vec![email_index()]).await;

        catalog.drop_index("orders", "email_1").await.unwrap();
        assert_eq!(catalog.index_names("orders").await, vec!["_id_"]);

        let err = catalog.drop_index("orders", "email_1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexDropFailed);

        let err = catalog.drop_index("orders", "_id_").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexDropFailed);
    }
}
