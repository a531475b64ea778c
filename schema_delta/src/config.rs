//! Configuration handling for schema_delta

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Load configuration from a TOML file
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    config.validate()?;
    Ok(config)
}

/// Represents the complete schema_delta configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    pub engine: EngineConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Reject configurations that would make clone or reference alias production
    pub fn validate(&self) -> Result<()> {
        if self.database.driver != "postgres" {
            return Err(Error::ConfigError(format!(
                "Unsupported database driver: {}",
                self.database.driver
            )));
        }

        let SchemaConfig { default, clone, reference } = &self.schema;
        if default == clone || default == reference || clone == reference {
            return Err(Error::ConfigError(format!(
                "Schemas must be distinct (default = {}, clone = {}, reference = {})",
                default, clone, reference
            )));
        }

        if self.model.compiler == CompilerKind::Command && self.model.command.is_none() {
            return Err(Error::ConfigError(
                "model.command is required when model.compiler = \"command\"".to_string(),
            ));
        }

        Ok(())
    }
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    pub url: String,
    pub pool_size: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

/// Names of the three schemas a deploy run works with
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SchemaConfig {
    pub default: String,
    pub clone: String,
    pub reference: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            default: "public".to_string(),
            clone: "_schema_delta_clone".to_string(),
            reference: "_schema_delta_ref".to_string(),
        }
    }
}

/// External diff/apply engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_command")]
    pub command: String,
    /// JDBC url of the database the engine connects to
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub classpath: Option<String>,
    pub driver: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Which compiler turns the model into DDL statements
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompilerKind {
    #[default]
    Sql,
    Command,
}

/// Model discovery and compilation configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub compiler: CompilerKind,
    /// Program line for the command compiler, `{model}` is replaced by the model path
    pub command: Option<String>,
}

/// Deploy behaviour configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeployConfig {
    pub undeploy_file: Option<PathBuf>,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    #[serde(default = "default_tmp_prefix")]
    pub tmp_prefix: String,
    #[serde(default)]
    pub auto_undeploy: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            undeploy_file: None,
            tmp_dir: default_tmp_dir(),
            tmp_prefix: default_tmp_prefix(),
            auto_undeploy: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: String,
    pub stdout: bool,
}

fn default_driver() -> String {
    "postgres".to_string()
}

fn default_engine_command() -> String {
    "liquibase".to_string()
}

fn default_tmp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_tmp_prefix() -> String {
    "schema_delta_tmp".to_string()
}
