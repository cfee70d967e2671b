use std::fmt;
use std::future::Future;

use crate::error::{CloneResult, ErrorKind};
use crate::types::{CollectionName, CreateIndexOptions, IndexDescriptor};

/// Which side of a run a catalog stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// The database indexes are read from.
    Source,
    /// The database indexes are created on.
    Destination,
}

impl EndpointRole {
    /// Error kind used when the endpoint cannot be reached.
    pub fn connection_failed_kind(&self) -> ErrorKind {
        match self {
            EndpointRole::Source => ErrorKind::SourceConnectionFailed,
            EndpointRole::Destination => ErrorKind::DestinationConnectionFailed,
        }
    }

    /// Error kind used when enumerating collections or indexes fails.
    pub fn list_failed_kind(&self) -> ErrorKind {
        match self {
            EndpointRole::Source => ErrorKind::SourceListFailed,
            EndpointRole::Destination => ErrorKind::DestinationListFailed,
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Source => f.write_str("source"),
            EndpointRole::Destination => f.write_str("destination"),
        }
    }
}

/// Capabilities the reconciliation engine needs from a database.
///
/// A [`Catalog`] is an open handle on one database: it lists collections and their
/// indexes, and creates or drops indexes. Handles are opened once per endpoint and reused
/// for the whole run; [`Catalog::shutdown`] releases the underlying resources and has a
/// default no-op implementation.
pub trait Catalog {
    /// Role of this catalog in the run.
    fn role(&self) -> EndpointRole;

    /// Human-readable endpoint label, free of credentials.
    fn endpoint(&self) -> &str;

    /// Releases the connection held by this catalog.
    fn shutdown(&self) -> impl Future<Output = CloneResult<()>> + Send {
        async { Ok(()) }
    }

    /// Lists the names of all collections in the database.
    ///
    /// No ordering is guaranteed.
    fn list_collections(&self) -> impl Future<Output = CloneResult<Vec<CollectionName>>> + Send;

    /// Lists the indexes of `collection` in the order the database returns them.
    ///
    /// Fails when the collection does not exist.
    fn list_indexes(
        &self,
        collection: &str,
    ) -> impl Future<Output = CloneResult<Vec<IndexDescriptor>>> + Send;

    /// Creates `index` on `collection`.
    ///
    /// Recreating an index with the same name and keys is a no-op. An existing index with
    /// the same name and different keys fails with [`ErrorKind::IndexConflict`].
    fn create_index(
        &self,
        collection: &str,
        index: &IndexDescriptor,
        options: CreateIndexOptions,
    ) -> impl Future<Output = CloneResult<()>> + Send;

    /// Drops the index named `index_name` from `collection`.
    fn drop_index(
        &self,
        collection: &str,
        index_name: &str,
    ) -> impl Future<Output = CloneResult<()>> + Send;
}
