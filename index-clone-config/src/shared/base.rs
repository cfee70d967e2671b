use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The endpoint URI is empty.
    #[error("`{endpoint}.uri` cannot be empty")]
    EmptyUri { endpoint: &'static str },
    /// The endpoint URI does not use a MongoDB scheme.
    #[error("`{endpoint}.uri` must start with `mongodb://` or `mongodb+srv://`")]
    UnsupportedUriScheme { endpoint: &'static str },
    /// The database name override is set but blank.
    #[error("`{endpoint}.database` cannot be blank when set")]
    BlankDatabase { endpoint: &'static str },
    /// Maximum concurrent index creations cannot be zero.
    #[error("`reconcile.max_concurrent_creations` cannot be zero")]
    MaxConcurrentCreationsZero,
    /// The run timeout is set to zero.
    #[error("`reconcile.run_timeout_ms` cannot be zero when set")]
    RunTimeoutZero,
}
