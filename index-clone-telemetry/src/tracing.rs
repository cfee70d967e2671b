use std::sync::Once;

use ::tracing::debug;
use index_clone_config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Guard that flushes buffered log lines when dropped.
///
/// Keep it alive until the end of `main`, otherwise trailing log lines are lost.
pub type LogFlusher = WorkerGuard;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// `APP_ENVIRONMENT` holds an unsupported value.
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] std::io::Error),

    /// The fallback filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {source}")]
    Filter {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
    },

    /// A global subscriber was already installed.
    #[error("failed to install the tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

static INIT_TEST_TRACING: Once = Once::new();

/// Installs the global tracing subscriber for the binary.
///
/// Logs go to stderr through a non-blocking writer so that stdout stays reserved for
/// the run summary. `RUST_LOG` takes precedence over `default_directive`. In the
/// [`Environment::Prod`] environment lines are emitted as JSON, otherwise in a compact
/// human-readable form.
pub fn init_tracing(app_name: &str, default_directive: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load().map_err(TracingError::Environment)?;
    let filter = build_filter(default_directive)?;
    let (writer, flusher) = tracing_appender::non_blocking(std::io::stderr());

    match environment {
        Environment::Dev => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .compact();

            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
        Environment::Prod => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .json()
                .flatten_event(true)
                .with_current_span(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
    }

    debug!(app = app_name, %environment, "tracing initialized");

    Ok(flusher)
}

/// Installs a test subscriber once per process.
///
/// Output goes through the test writer, so it only shows up for failing tests or with
/// `--nocapture`. Filtering follows `RUST_LOG` and defaults to `info`.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // Another test harness may have installed a subscriber already.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Builds the filter from `RUST_LOG`, falling back to `default_directive`.
fn build_filter(default_directive: &str) -> Result<EnvFilter, TracingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(default_directive).map_err(|source| TracingError::Filter {
        directive: default_directive.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_default_directive_is_reported() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }

        let err = build_filter("index_clone=notalevel").unwrap_err();
        assert!(matches!(err, TracingError::Filter { .. }));
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
