//! Shared configuration types for index clone runs.

mod base;
mod clone;
mod endpoint;
mod reconcile;

pub use base::ValidationError;
pub use clone::{CloneConfig, CloneConfigWithoutSecrets};
pub use endpoint::{EndpointConfig, EndpointConfigWithoutSecrets, redact_uri};
pub use reconcile::{ConflictPolicy, ErrorPolicy, ReconcileConfig};
