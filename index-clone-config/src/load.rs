use std::path::{Path, PathBuf};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Supported extensions for configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The configuration file passed on the command line does not exist.
    #[error("configuration file `{0}` does not exist")]
    ConfigurationFileMissing(PathBuf),

    /// The configuration file has an extension we cannot parse.
    #[error("configuration file `{path}` must have one of the extensions: {supported}")]
    UnsupportedConfigurationFile { path: PathBuf, supported: String },

    /// A configuration file existed but could not be parsed.
    #[error("failed to load configuration from `{path}`: {source}")]
    ConfigurationFileLoad {
        path: PathBuf,
        source: config::ConfigError,
    },

    /// An explicit override could not be applied.
    #[error("failed to apply configuration override `{key}`: {source}")]
    Override {
        key: String,
        source: config::ConfigError,
    },

    /// The merged configuration could not be built.
    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),

    /// The configuration sources were merged but deserialization failed.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),
}

/// Ordered set of explicit key/value overrides applied on top of every other source.
///
/// Keys use dotted paths (`source.uri`, `reconcile.background`). The command line
/// fills this from its flags so that flags win over files and environment variables.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    values: Vec<(String, config::Value)>,
}

impl ConfigOverrides {
    /// Creates an empty override set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing an earlier override of the same key.
    pub fn set<V>(&mut self, key: impl Into<String>, value: V) -> &mut Self
    where
        V: Into<config::Value>,
    {
        let key = key.into();
        self.values.retain(|(existing, _)| existing != &key);
        self.values.push((key, value.into()));
        self
    }

    /// Sets `key` only when `value` is present.
    pub fn set_option<V>(&mut self, key: impl Into<String>, value: Option<V>) -> &mut Self
    where
        V: Into<config::Value>,
    {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    /// Returns `true` when no override was registered.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the registered keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(key, _)| key.as_str())
    }
}

/// Loads layered configuration from an optional file, the environment and explicit overrides.
///
/// Sources are applied in increasing priority: the file at `config_file` (YAML or JSON),
/// `APP_`-prefixed environment variables, then `overrides`. Nested keys in environment
/// variables use double underscores (`APP_SOURCE__URI`).
pub fn load_config<T>(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    load_config_from(config_file, environment_source(), overrides)
}

fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
}

fn load_config_from<T>(
    config_file: Option<&Path>,
    environment: config::Environment,
    overrides: &ConfigOverrides,
) -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let mut builder = config::Config::builder();

    if let Some(path) = config_file {
        check_configuration_file(path)?;

        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        validate_configuration_source(&builder, path)?;
    }

    builder = builder.add_source(environment);

    for (key, value) in &overrides.values {
        builder = builder
            .set_override(key.as_str(), value.clone())
            .map_err(|source| LoadConfigError::Override {
                key: key.clone(),
                source,
            })?;
    }

    let settings = builder.build().map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Checks that the configuration file exists and has a supported extension.
fn check_configuration_file(path: &Path) -> Result<(), LoadConfigError> {
    if !path.is_file() {
        return Err(LoadConfigError::ConfigurationFileMissing(path.to_path_buf()));
    }

    let supported = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| CONFIG_FILE_EXTENSIONS.contains(&extension));

    if !supported {
        return Err(LoadConfigError::UnsupportedConfigurationFile {
            path: path.to_path_buf(),
            supported: CONFIG_FILE_EXTENSIONS.join(", "),
        });
    }

    Ok(())
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        name: String,
        nested: TestNested,
    }

    #[derive(Debug, Deserialize)]
    struct TestNested {
        enabled: bool,
        limit: u64,
    }

    fn fake_environment(vars: &[(&str, &str)]) -> config::Environment {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        environment_source().source(Some(vars))
    }

    fn write_temp_file(file_name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("index-clone-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file_name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let path = write_temp_file(
            "overrides.yaml",
            "name: from-file\nnested:\n  enabled: true\n  limit: 5\n",
        );

        let mut overrides = ConfigOverrides::new();
        overrides.set("nested.enabled", false).set("nested.limit", 42i64);

        let config: TestConfig = load_config(Some(&path), &overrides).unwrap();

        assert_eq!(config.name, "from-file");
        assert!(!config.nested.enabled);
        assert_eq!(config.nested.limit, 42);
    }

    #[test]
    fn test_load_only_from_overrides() {
        let mut overrides = ConfigOverrides::new();
        overrides
            .set("name", "from-flags")
            .set("nested.enabled", true)
            .set("nested.limit", 1i64);

        let config: TestConfig = load_config(None, &overrides).unwrap();

        assert_eq!(config.name, "from-flags");
        assert!(config.nested.enabled);
    }

    #[test]
    fn test_environment_fills_nested_keys() {
        let environment = fake_environment(&[
            ("APP_NAME", "from-env"),
            ("APP_NESTED__ENABLED", "true"),
            ("APP_NESTED__LIMIT", "7"),
            ("OTHER_NAME", "ignored"),
        ]);

        let config: TestConfig =
            load_config_from(None, environment, &ConfigOverrides::new()).unwrap();

        assert_eq!(config.name, "from-env");
        assert!(config.nested.enabled);
        assert_eq!(config.nested.limit, 7);
    }

    #[test]
    fn test_overrides_win_over_environment_and_environment_over_file() {
        let path = write_temp_file(
            "layers.yaml",
            "name: from-file\nnested:\n  enabled: false\n  limit: 5\n",
        );
        let environment = fake_environment(&[
            ("APP_NAME", "from-env"),
            ("APP_NESTED__LIMIT", "9"),
        ]);
        let mut overrides = ConfigOverrides::new();
        overrides.set("name", "from-flags");

        let config: TestConfig = load_config_from(Some(&path), environment, &overrides).unwrap();

        assert_eq!(config.name, "from-flags");
        assert!(!config.nested.enabled);
        assert_eq!(config.nested.limit, 9);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let path = std::env::temp_dir().join("index-clone-definitely-missing.yaml");
        let err = load_config::<TestConfig>(Some(&path), &ConfigOverrides::new()).unwrap_err();

        assert!(matches!(err, LoadConfigError::ConfigurationFileMissing(_)));
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let path = write_temp_file("config.toml", "name = \"x\"\n");
        let err = load_config::<TestConfig>(Some(&path), &ConfigOverrides::new()).unwrap_err();

        assert!(matches!(
            err,
            LoadConfigError::UnsupportedConfigurationFile { .. }
        ));
    }

    #[test]
    fn test_overrides_replace_previous_value_for_same_key() {
        let mut overrides = ConfigOverrides::new();
        overrides.set("name", "first").set("name", "second");
        overrides.set_option::<bool>("nested.enabled", None);

        assert_eq!(overrides.keys().collect::<Vec<_>>(), vec!["name"]);
        assert!(!overrides.is_empty());
    }
}
