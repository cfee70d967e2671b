use futures::TryStreamExt;
use index_clone_config::shared::EndpointConfig;
use mongodb::bson::{Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database, IndexModel};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::bail;
use crate::catalog::{Catalog, EndpointRole};
use crate::clone_error;
use crate::error::{CloneError, CloneResult, ErrorKind};
use crate::types::{CollectionName, CreateIndexOptions, IndexDescriptor};

/// Application name reported to the server in the connection handshake.
const APP_NAME: &str = "index-clone";

/// Server error codes meaning an index with the same name or keys already exists.
const INDEX_CONFLICT_CODES: &[i32] = &[68, 85, 86];
/// Server error codes meaning the index specification was rejected.
const INVALID_INDEX_SPEC_CODES: &[i32] = &[2, 67];
/// Server error codes meaning the credentials were rejected while connecting.
const AUTHENTICATION_CODES: &[i32] = &[13, 18];

/// Catalog backed by a MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoCatalog {
    role: EndpointRole,
    endpoint: String,
    client: Client,
    database: Database,
}

impl MongoCatalog {
    /// Connects to the endpoint described by `config` and checks it answers a `ping`.
    ///
    /// The database is taken from [`EndpointConfig::database`] when set and from the
    /// default database of the URI otherwise. Having neither is a configuration error.
    pub async fn connect(config: &EndpointConfig, role: EndpointRole) -> CloneResult<Self> {
        let redacted = config.redacted_uri();

        let mut options = ClientOptions::parse(config.uri.expose_secret())
            .await
            .map_err(|err| classify_connection_error(role, &redacted, err))?;
        options.app_name = Some(APP_NAME.to_string());

        let database_name = match config
            .database
            .clone()
            .or_else(|| options.default_database.clone())
        {
            Some(database_name) => database_name,
            None => bail!(
                ErrorKind::ConfigError,
                "No database selected",
                format!("{role} {redacted} has no database in the URI and none was given")
            ),
        };

        let client = Client::with_options(options)
            .map_err(|err| classify_connection_error(role, &redacted, err))?;
        let database = client.database(&database_name);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|err| classify_connection_error(role, &redacted, err))?;

        let endpoint = format!("{redacted} ({database_name})");
        info!(%role, endpoint, "connected");

        Ok(Self {
            role,
            endpoint,
            client,
            database,
        })
    }

    fn list_error(&self, description: &'static str, detail: String, err: MongoError) -> CloneError {
        clone_error!(self.role.list_failed_kind(), description, detail, source: err)
    }
}

impl Catalog for MongoCatalog {
    fn role(&self) -> EndpointRole {
        self.role
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn shutdown(&self) -> CloneResult<()> {
        self.client.clone().shutdown().await;
        debug!(role = %self.role, "connection closed");

        Ok(())
    }

    async fn list_collections(&self) -> CloneResult<Vec<CollectionName>> {
        self.database
            .list_collection_names()
            .filter(indexable_collections_filter())
            .await
            .map_err(|err| {
                self.list_error("Listing collections failed", self.endpoint.clone(), err)
            })
    }

    async fn list_indexes(&self, collection: &str) -> CloneResult<Vec<IndexDescriptor>> {
        let list_failed = |err: MongoError| {
            self.list_error(
                "Listing indexes failed",
                format!("{collection} on {}", self.endpoint),
                err,
            )
        };

        let cursor = self
            .database
            .collection::<Document>(collection)
            .list_indexes()
            .await
            .map_err(list_failed)?;
        let models: Vec<IndexModel> = cursor.try_collect().await.map_err(list_failed)?;

        models
            .into_iter()
            .map(|model| {
                let name = model
                    .options
                    .and_then(|options| options.name)
                    .ok_or_else(|| {
                        clone_error!(
                            ErrorKind::InvalidData,
                            "Index without a name",
                            format!("{collection}: {}", model.keys)
                        )
                    })?;

                Ok(IndexDescriptor::new(name, model.keys))
            })
            .collect()
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexDescriptor,
        options: CreateIndexOptions,
    ) -> CloneResult<()> {
        let spec = doc! {
            "key": index.keys.clone(),
            "name": index.name.as_str(),
            "background": options.background,
        };

        self.database
            .run_command(doc! { "createIndexes": collection, "indexes": [spec] })
            .await
            .map_err(|err| {
                let (kind, description) = create_failure(command_code(&err));
                clone_error!(
                    kind,
                    description,
                    format!("{collection}.{}", index.name),
                    source: err
                )
            })?;

        Ok(())
    }

    async fn drop_index(&self, collection: &str, index_name: &str) -> CloneResult<()> {
        self.database
            .collection::<Document>(collection)
            .drop_index(index_name)
            .await
            .map_err(|err| {
                clone_error!(
                    ErrorKind::IndexDropFailed,
                    "Dropping index failed",
                    format!("{collection}.{index_name}"),
                    source: err
                )
            })
    }
}

/// Maps driver errors raised while connecting to an error kind.
///
/// Malformed connection strings surface as invalid arguments and are configuration
/// errors. SRV lookups happen while parsing, so DNS failures there count as connection
/// failures.
fn classify_connection_error(role: EndpointRole, redacted: &str, err: MongoError) -> CloneError {
    let detail = format!("{role} {redacted}");

    if is_authentication_failure(&err) {
        return clone_error!(
            ErrorKind::AuthenticationFailed,
            "Authentication failed",
            detail,
            source: err
        );
    }

    let description = match err.kind.as_ref() {
        MongoErrorKind::ServerSelection { .. } => "No server could be selected",
        MongoErrorKind::DnsResolve { .. } => "Host name could not be resolved",
        MongoErrorKind::Io(_) => "Network error while connecting",
        MongoErrorKind::ConnectionPoolCleared { .. } => "Connection pool was cleared",
        MongoErrorKind::InvalidArgument { .. } => {
            return clone_error!(
                ErrorKind::ConfigError,
                "Invalid connection options",
                detail,
                source: err
            );
        }
        _ => "Connection failed",
    };

    clone_error!(role.connection_failed_kind(), description, detail, source: err)
}

/// Returns `true` when the credentials were rejected while connecting.
///
/// Only used on the connect path. Later permission errors belong to the operation that
/// raised them.
fn is_authentication_failure(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        MongoErrorKind::Authentication { .. } => true,
        MongoErrorKind::Command(command) => AUTHENTICATION_CODES.contains(&command.code),
        _ => false,
    }
}

/// Classifies a failed `createIndexes` command by its server error code.
fn create_failure(code: Option<i32>) -> (ErrorKind, &'static str) {
    match code {
        Some(code) if INDEX_CONFLICT_CODES.contains(&code) => (
            ErrorKind::IndexConflict,
            "An index with the same name or keys already exists",
        ),
        Some(code) if INVALID_INDEX_SPEC_CODES.contains(&code) => (
            ErrorKind::InvalidIndexSpec,
            "The index specification was rejected",
        ),
        _ => (ErrorKind::IndexCreationFailed, "Index creation failed"),
    }
}

/// Filter for `listCollections` keeping every namespace that can carry indexes.
///
/// Views are dropped. Plain and time-series collections are kept.
fn indexable_collections_filter() -> Document {
    doc! { "type": { "$ne": "view" } }
}

fn command_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        MongoErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_failure_classification() {
        assert_eq!(create_failure(Some(85)).0, ErrorKind::IndexConflict);
        assert_eq!(create_failure(Some(86)).0, ErrorKind::IndexConflict);
        assert_eq!(create_failure(Some(68)).0, ErrorKind::IndexConflict);
        assert_eq!(create_failure(Some(67)).0, ErrorKind::InvalidIndexSpec);
        assert_eq!(create_failure(Some(2)).0, ErrorKind::InvalidIndexSpec);
        assert_eq!(create_failure(None).0, ErrorKind::IndexCreationFailed);
    }

    #[test]
    fn test_permission_failure_on_create_is_an_index_failure() {
        let (kind, _) = create_failure(Some(13));

        assert_eq!(kind, ErrorKind::IndexCreationFailed);
        assert!(kind.is_index_failure());
        assert!(!kind.is_connection_failure());
    }

    #[test]
    fn test_collections_filter_only_excludes_views() {
        assert_eq!(
            indexable_collections_filter(),
            doc! { "type": { "$ne": "view" } }
        );
    }
}
