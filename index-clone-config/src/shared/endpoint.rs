use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// URI schemes accepted for MongoDB endpoints.
const SUPPORTED_URI_SCHEMES: &[&str] = &["mongodb://", "mongodb+srv://"];

/// Placeholder written in place of credentials when rendering a URI.
const REDACTED_CREDENTIALS: &str = "***";

/// Connection settings for one database endpoint.
///
/// The URI usually embeds credentials, so it is kept as a [`SecretString`] and
/// only ever rendered through [`EndpointConfig::redacted_uri`].
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// MongoDB connection string, e.g. `mongodb://localhost:27017/my_database`.
    pub uri: SecretString,
    /// Database name to use instead of the default database embedded in the URI.
    #[serde(default)]
    pub database: Option<String>,
}

impl EndpointConfig {
    /// Validates the endpoint, naming it `endpoint` in error messages.
    pub fn validate(&self, endpoint: &'static str) -> Result<(), ValidationError> {
        let uri = self.uri.expose_secret().trim();

        if uri.is_empty() {
            return Err(ValidationError::EmptyUri { endpoint });
        }

        if !SUPPORTED_URI_SCHEMES
            .iter()
            .any(|scheme| uri.starts_with(scheme))
        {
            return Err(ValidationError::UnsupportedUriScheme { endpoint });
        }

        if let Some(database) = &self.database
            && database.trim().is_empty()
        {
            return Err(ValidationError::BlankDatabase { endpoint });
        }

        Ok(())
    }

    /// Returns the URI with any embedded credentials replaced by `***`.
    pub fn redacted_uri(&self) -> String {
        redact_uri(self.uri.expose_secret())
    }
}

/// Same as [`EndpointConfig`] but with the credentials stripped from the URI, so it
/// implements [`Serialize`] and is safe to log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfigWithoutSecrets {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl From<EndpointConfig> for EndpointConfigWithoutSecrets {
    fn from(value: EndpointConfig) -> Self {
        EndpointConfigWithoutSecrets {
            uri: value.redacted_uri(),
            database: value.database,
        }
    }
}

/// Replaces the user-info section of a connection string with `***`.
///
/// Strings without a scheme separator or without credentials are returned unchanged.
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };

    let authority_start = scheme_end + 3;
    let rest = &uri[authority_start..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];

    match authority.rfind('@') {
        Some(at) => format!(
            "{}{}{}",
            &uri[..authority_start],
            REDACTED_CREDENTIALS,
            &rest[at..]
        ),
        None => uri.to_string(),
    }
}
