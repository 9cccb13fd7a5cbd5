//! Client configuration.
//!
//! Loaded from YAML files and `DYNAREDIS__`-prefixed environment variables.
//! Every field has a default, so an empty configuration is valid.

use serde::Deserialize;

use crate::error::Result;
use crate::item::AttributeNames;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "dynaredis.yaml";
/// Environment variable naming an additional configuration file.
pub const CONFIG_ENV_VAR: &str = "DYNAREDIS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "DYNAREDIS";
/// Environment variable for the log filter.
pub const LOG_ENV_VAR: &str = "DYNAREDIS_LOG";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Table layout.
    pub table: TableConfig,
    /// Use strongly consistent reads.
    pub consistent_reads: bool,
    /// DynamoDB connection overrides.
    pub dynamo: DynamoConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            table: TableConfig::default(),
            consistent_reads: true,
            dynamo: DynamoConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from files and environment.
    ///
    /// Sources, later overriding earlier:
    /// 1. `dynaredis.yaml` in the current directory (if it exists)
    /// 2. The file at `path` (if given)
    /// 3. The file named by `DYNAREDIS_CONFIG` (if set)
    /// 4. `DYNAREDIS__`-prefixed environment variables, `__` separated
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Table and index names plus the attribute layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub name: String,
    /// Local secondary index over the score attribute.
    pub index: String,
    pub attributes: AttributeNames,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "dynaredis".to_string(),
            index: "idx".to_string(),
            attributes: AttributeNames::default(),
        }
    }
}

/// DynamoDB connection overrides. Unset fields fall back to the ambient AWS
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DynamoConfig {
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}
