use serde::{Deserialize, Serialize};

use crate::shared::{
    EndpointConfig, EndpointConfigWithoutSecrets, ReconcileConfig, ValidationError,
};

/// Complete configuration of one index clone run.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking the endpoint credentials into serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct CloneConfig {
    /// Endpoint the indexes are read from.
    pub source: EndpointConfig,
    /// Endpoint the indexes are created on.
    pub destination: EndpointConfig,
    /// Reconciliation settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl CloneConfig {
    /// Validates both endpoints and the reconciliation settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;
        self.reconcile.validate()?;

        Ok(())
    }
}

/// Same as [`CloneConfig`] but without secrets, safe to serialize and log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloneConfigWithoutSecrets {
    pub source: EndpointConfigWithoutSecrets,
    pub destination: EndpointConfigWithoutSecrets,
    pub reconcile: ReconcileConfig,
}

impl From<CloneConfig> for CloneConfigWithoutSecrets {
    fn from(value: CloneConfig) -> Self {
        CloneConfigWithoutSecrets {
            source: value.source.into(),
            destination: value.destination.into(),
            reconcile: value.reconcile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"{
        "source": {"uri": "mongodb://reader:pw@source.local:27017/app"},
        "destination": {"uri": "mongodb://dest.local:27017", "database": "app_copy"}
    }"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: CloneConfig = serde_json::from_str(VALID_CONFIG).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.destination.database.as_deref(), Some("app_copy"));
        assert_eq!(config.reconcile, ReconcileConfig::default());
    }

    #[test]
    fn test_without_secrets_serializes_redacted_uris() {
        let config: CloneConfig = serde_json::from_str(VALID_CONFIG).unwrap();
        let without_secrets: CloneConfigWithoutSecrets = config.into();
        let rendered = serde_json::to_string(&without_secrets).unwrap();

        assert!(rendered.contains("mongodb://***@source.local:27017/app"));
        assert!(!rendered.contains("reader:pw"));
    }

    #[test]
    fn test_validate_reports_invalid_destination() {
        let config: CloneConfig = serde_json::from_str(
            r#"{
                "source": {"uri": "mongodb://localhost/app"},
                "destination": {"uri": "http://localhost/app"}
            }"#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "`destination.uri` must start with `mongodb://` or `mongodb+srv://`"
        );
    }
}
