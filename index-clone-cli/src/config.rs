use index_clone_config::shared::CloneConfig;
use index_clone_config::{ConfigOverrides, load_config};

use crate::args::Args;
use crate::error::{CliError, CliResult};

/// Translates command line flags into configuration overrides.
///
/// Only flags that were given are set, so values from the configuration file and the
/// environment survive unless a flag replaces them.
pub fn overrides_from_args(args: &Args) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();

    overrides
        .set_option("source.uri", args.from.clone())
        .set_option("destination.uri", args.to.clone())
        .set_option("source.database", args.from_database.clone())
        .set_option("destination.database", args.to_database.clone())
        .set_option("reconcile.background", args.background)
        .set_option(
            "reconcile.conflict_policy",
            args.conflict_policy.map(|policy| policy.as_config_value()),
        )
        .set_option(
            "reconcile.error_policy",
            args.error_policy.map(|policy| policy.as_config_value()),
        )
        .set_option(
            "reconcile.max_concurrent_creations",
            args.concurrency.map(i64::from),
        )
        .set_option(
            "reconcile.operation_timeout_ms",
            args.operation_timeout_ms.map(i64::from),
        )
        .set_option(
            "reconcile.run_timeout_ms",
            args.run_timeout_ms.map(i64::from),
        );

    if args.dry_run {
        overrides.set("reconcile.dry_run", true);
    }

    overrides
}

/// Loads and validates the run configuration.
pub fn load_clone_config(args: &Args) -> CliResult<CloneConfig> {
    let overrides = overrides_from_args(args);
    let config = load_config::<CloneConfig>(args.config.as_deref(), &overrides)
        .map_err(CliError::config)?;
    config.validate().map_err(CliError::config)?;

    Ok(config)
}
