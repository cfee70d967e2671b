//! Error types and result definitions for index clone operations.
//!
//! [`CloneError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the callsite where it was raised. Errors
//! can also be aggregated, which is used when a run collects failures instead of stopping.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::Serialize;

/// Convenient result type for index clone operations.
pub type CloneResult<T> = Result<T, CloneError>;

/// Detailed payload stored for single [`CloneError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for index clone operations.
#[derive(Debug, Clone)]
pub struct CloneError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<CloneError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur while cloning indexes.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,
    DestinationConnectionFailed,
    AuthenticationFailed,

    // Enumeration Errors
    SourceListFailed,
    DestinationListFailed,

    // Index Errors
    IndexConflict,
    InvalidIndexSpec,
    IndexCreationFailed,
    IndexDropFailed,

    // Data & Configuration Errors
    InvalidData,
    ConfigError,

    // Deadlines
    OperationTimedOut,
    RunTimedOut,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns `true` for failures to reach or authenticate against an endpoint.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed
                | ErrorKind::DestinationConnectionFailed
                | ErrorKind::AuthenticationFailed
        )
    }

    /// Returns `true` for failures raised while creating or replacing an index.
    pub fn is_index_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::IndexConflict
                | ErrorKind::InvalidIndexSpec
                | ErrorKind::IndexCreationFailed
                | ErrorKind::IndexDropFailed
        )
    }
}

impl CloneError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the aggregate is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description, or [`None`] for aggregated errors.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the dynamic detail if available.
    ///
    /// For aggregated errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, or [`None`] for a single error.
    pub fn errors(&self) -> Option<&[CloneError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        CloneError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for CloneError {
    fn eq(&self, other: &CloneError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => errors_a == errors_b,
            _ => false,
        }
    }
}

impl fmt::Display for CloneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                write!(f, "[{:?}] {}", payload.kind, payload.description)?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, ": {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, .. } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated",
                    count,
                    if count == 1 { "" } else { "s" }
                )?;

                for (index, error) in errors.iter().enumerate() {
                    write!(f, "\n  {}. {}", index + 1, error)?;
                }

                Ok(())
            }
        }
    }
}

impl error::Error for CloneError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`CloneError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for CloneError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CloneError {
        CloneError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

/// Creates a [`CloneError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for CloneError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CloneError {
        CloneError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}

/// Aggregates several errors. A single error is returned unwrapped.
impl<E> From<Vec<E>> for CloneError
where
    E: Into<CloneError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> CloneError {
        let location = Location::caller();
        let mut errors: Vec<CloneError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        CloneError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone_error;
    use std::error::Error;

    #[test]
    fn test_single_error_display_includes_detail() {
        let err = clone_error!(
            ErrorKind::IndexConflict,
            "Index already exists with different keys",
            "orders.email_1"
        );

        assert_eq!(
            err.to_string(),
            "[IndexConflict] Index already exists with different keys: orders.email_1"
        );
        assert_eq!(err.detail(), Some("orders.email_1"));
        assert_eq!(
            err.description(),
            Some("Index already exists with different keys")
        );
    }

    #[test]
    fn test_error_with_source() {
        let io = std::io::Error::other("connection reset");
        let err = clone_error!(ErrorKind::SourceListFailed, "Listing failed", source: io);

        assert_eq!(err.source().unwrap().to_string(), "connection reset");
    }

    #[test]
    fn test_vec_of_one_error_is_unwrapped() {
        let err = CloneError::from(vec![clone_error!(
            ErrorKind::IndexCreationFailed,
            "Creation failed"
        )]);

        assert!(err.errors().is_none());
        assert_eq!(err.kind(), ErrorKind::IndexCreationFailed);
    }

    #[test]
    fn test_aggregated_errors() {
        let err = CloneError::from(vec![
            clone_error!(ErrorKind::IndexConflict, "Conflict"),
            clone_error!(ErrorKind::IndexCreationFailed, "Creation failed", "x"),
        ]);

        assert_eq!(err.kind(), ErrorKind::IndexConflict);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::IndexConflict, ErrorKind::IndexCreationFailed]
        );
        assert_eq!(err.detail(), Some("x"));
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn test_equality_compares_kinds() {
        let a = clone_error!(ErrorKind::RunTimedOut, "Run timed out");
        let b = clone_error!(ErrorKind::RunTimedOut, "Different description");
        let c = clone_error!(ErrorKind::OperationTimedOut, "Run timed out");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kind_classification() {
        assert!(ErrorKind::AuthenticationFailed.is_connection_failure());
        assert!(!ErrorKind::SourceListFailed.is_connection_failure());
        assert!(ErrorKind::IndexDropFailed.is_index_failure());
        assert!(!ErrorKind::RunTimedOut.is_index_failure());
    }
}
