use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use index_clone::error::{CloneError, ErrorKind};
use index_clone::types::ReconciliationSummary;

/// Exit code for connection and authentication failures.
pub const CONNECTION_EXIT_CODE: u8 = 1;
/// Exit code for index conflicts and creation failures.
pub const INDEX_FAILURE_EXIT_CODE: u8 = 2;
/// Exit code for every other failure, including usage errors.
pub const OTHER_FAILURE_EXIT_CODE: u8 = 3;

/// Maps an error kind to the process exit code.
pub fn exit_code_for_kind(kind: ErrorKind) -> u8 {
    if kind.is_connection_failure() {
        CONNECTION_EXIT_CODE
    } else if kind.is_index_failure() {
        INDEX_FAILURE_EXIT_CODE
    } else {
        OTHER_FAILURE_EXIT_CODE
    }
}

/// Returns the exit code of a finished run, or [`None`] when nothing failed.
///
/// Failures collected under the continue policy can have different kinds. The highest
/// code among them wins, so a timed out operation is never reported as an index failure.
pub fn summary_exit_code(summary: &ReconciliationSummary) -> Option<u8> {
    summary
        .failures
        .iter()
        .map(|failure| exit_code_for_kind(failure.kind))
        .max()
}

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for command line operations.
pub type CliResult<T> = Result<T, CliError>;

/// Backtrace taken where a configuration or I/O error entered the binary.
///
/// [`CloneError`] carries its own, these variants have nothing else to hold one.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the `index-clone` binary.
///
/// Wraps [`CloneError`] for run failures and adds variants for the surrounding
/// infrastructure.
#[derive(Debug)]
pub enum CliError {
    /// Connection, listing or index error raised by the run.
    Clone(CloneError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error, e.g. while starting the runtime or writing the summary.
    Io(std::io::Error, CapturedBacktrace),
}

impl CliError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            CliError::Clone(err) if err.kind().is_connection_failure() => "connection error",
            CliError::Clone(err) if err.kind().is_index_failure() => "index error",
            CliError::Clone(_) => "clone error",
            CliError::Config(_, _) => "configuration error",
            CliError::Io(_, _) => "i/o error",
        }
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Clone(err) => exit_code_for_kind(err.kind()),
            CliError::Config(_, _) | CliError::Io(_, _) => OTHER_FAILURE_EXIT_CODE,
        }
    }

    /// Returns the backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            CliError::Clone(err) => err.backtrace(),
            CliError::Config(_, cb) => Some(&cb.0),
            CliError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        CliError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("index-clone failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        if !matches!(self, CliError::Clone(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Clone(err) => write!(f, "{err}"),
            CliError::Config(source, _) => write!(f, "configuration error: {source}"),
            CliError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CliError::Clone(err) => err.source(),
            CliError::Config(source, _) => Some(source.as_ref()),
            CliError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Io(err.into(), CapturedBacktrace::capture())
    }
}

impl From<CloneError> for CliError {
    fn from(err: CloneError) -> Self {
        CliError::Clone(err)
    }
}
