use index_clone::catalog::EndpointRole;
use index_clone::catalog::mongo::MongoCatalog;
use index_clone::reconcile::ReconciliationEngine;
use index_clone::types::ReconciliationSummary;
use index_clone_config::shared::{
    CloneConfig, CloneConfigWithoutSecrets, EndpointConfigWithoutSecrets, ReconcileConfig,
};
use tracing::{debug, info, warn};

use crate::error::CliResult;
use crate::reporter::TerminalReporter;

/// Connects to both endpoints, runs the reconciliation and closes the connections.
///
/// Connections are closed whether the run succeeds or not.
pub async fn clone_indexes(
    config: CloneConfig,
    reporter: TerminalReporter,
) -> CliResult<ReconciliationSummary> {
    info!("starting index clone");

    log_config(&config);

    reporter.status("connecting");
    let (source, destination) = tokio::try_join!(
        MongoCatalog::connect(&config.source, EndpointRole::Source),
        MongoCatalog::connect(&config.destination, EndpointRole::Destination),
    )
    .inspect_err(|_| reporter.finish())?;

    let engine =
        ReconciliationEngine::new(source, destination, config.reconcile).with_observer(reporter);
    let result = engine.run().await;

    engine.observer().finish();
    if let Err(err) = engine.shutdown().await {
        warn!(error = %err, "failed to close connections");
    }

    result.map_err(Into::into)
}

fn log_config(config: &CloneConfig) {
    let config = CloneConfigWithoutSecrets::from(config.clone());
    log_endpoint_config("source", &config.source);
    log_endpoint_config("destination", &config.destination);
    log_reconcile_config(&config.reconcile);
}

fn log_endpoint_config(role: &str, config: &EndpointConfigWithoutSecrets) {
    debug!(
        role,
        uri = config.uri.as_str(),
        database = config.database.as_deref(),
        "using endpoint config"
    );
}

fn log_reconcile_config(config: &ReconcileConfig) {
    debug!(
        background = config.background,
        conflict_policy = ?config.conflict_policy,
        error_policy = ?config.error_policy,
        max_concurrent_creations = config.max_concurrent_creations,
        operation_timeout_ms = config.operation_timeout_ms,
        run_timeout_ms = config.run_timeout_ms,
        dry_run = config.dry_run,
        "using reconcile config"
    );
}
