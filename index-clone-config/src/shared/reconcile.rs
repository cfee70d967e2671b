use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// What to do when the destination already has an index with the same name but a
/// different key specification.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Treat the conflict as an index creation error.
    #[default]
    Fail,
    /// Leave the destination index untouched and report it as skipped.
    Skip,
    /// Drop the destination index and create it again with the source keys.
    Replace,
}

/// How failures of individual index operations affect the rest of the run.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// The first failure aborts the whole run.
    #[default]
    FailFast,
    /// Failures are collected in the summary and the run carries on.
    Continue,
}

/// Settings that drive the reconciliation engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Build created indexes in background mode.
    ///
    /// Default: true
    #[serde(default = "default_background")]
    pub background: bool,

    /// Policy applied on name collisions with a differing key specification.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Policy applied when a single index operation fails.
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Maximum number of index creations in flight within one collection.
    ///
    /// Default: 1 (strictly sequential)
    #[serde(default = "default_max_concurrent_creations")]
    pub max_concurrent_creations: u16,

    /// Timeout in milliseconds applied to every database call. Zero disables it.
    ///
    /// Default: 60000 (60 seconds)
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Deadline in milliseconds for the whole run.
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,

    /// Plan the run without creating or dropping any index.
    #[serde(default)]
    pub dry_run: bool,
}

impl ReconcileConfig {
    /// Default background build flag.
    pub const DEFAULT_BACKGROUND: bool = true;

    /// Default number of concurrent index creations.
    pub const DEFAULT_MAX_CONCURRENT_CREATIONS: u16 = 1;

    /// Default per-operation timeout: 60 seconds.
    pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 60_000;

    /// Validates the reconciliation settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrent_creations == 0 {
            return Err(ValidationError::MaxConcurrentCreationsZero);
        }

        if self.run_timeout_ms == Some(0) {
            return Err(ValidationError::RunTimeoutZero);
        }

        Ok(())
    }

    /// Returns the per-operation timeout, or [`None`] when disabled.
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }

    /// Returns the whole-run deadline, if any.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            background: Self::DEFAULT_BACKGROUND,
            conflict_policy: ConflictPolicy::default(),
            error_policy: ErrorPolicy::default(),
            max_concurrent_creations: Self::DEFAULT_MAX_CONCURRENT_CREATIONS,
            operation_timeout_ms: Self::DEFAULT_OPERATION_TIMEOUT_MS,
            run_timeout_ms: None,
            dry_run: false,
        }
    }
}

fn default_background() -> bool {
    ReconcileConfig::DEFAULT_BACKGROUND
}

fn default_max_concurrent_creations() -> u16 {
    ReconcileConfig::DEFAULT_MAX_CONCURRENT_CREATIONS
}

fn default_operation_timeout_ms() -> u64 {
    ReconcileConfig::DEFAULT_OPERATION_TIMEOUT_MS
}
