use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sql_engine::reader::DEFAULT_BATCH_SIZE;
use crate::sql_engine::tables::ColumnDef;

/// Environment variables holding the connection parameters
pub const ENV_USER: &str = "postgresuser";
pub const ENV_PASSWORD: &str = "password";
pub const ENV_HOST: &str = "host";
pub const ENV_PORT: &str = "port";
pub const ENV_DB_NAME: &str = "db_name";

/// Name of the project file looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "raw_loader.yaml";

/// Database connection parameters, read once from the environment.
///
/// Nothing is validated here. An unset variable stays `None` and only makes
/// the connection attempt fail later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub db_name: Option<String>,
}

impl ConnectionParams {
    /// Read the parameters from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the parameters through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            user: lookup(ENV_USER),
            password: lookup(ENV_PASSWORD),
            host: lookup(ENV_HOST),
            port: lookup(ENV_PORT),
            db_name: lookup(ENV_DB_NAME),
        }
    }

    /// Names of the environment variables that were not set.
    ///
    /// A blank user, host, port or database counts as unset, since PostgreSQL
    /// would substitute its own default for it. An empty password is allowed.
    pub fn missing(&self) -> Vec<&'static str> {
        let unset =
            |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

        let mut missing = Vec::new();
        if unset(&self.user) {
            missing.push(ENV_USER);
        }
        if self.password.is_none() {
            missing.push(ENV_PASSWORD);
        }
        if unset(&self.host) {
            missing.push(ENV_HOST);
        }
        if unset(&self.port) {
            missing.push(ENV_PORT);
        }
        if unset(&self.db_name) {
            missing.push(ENV_DB_NAME);
        }
        missing
    }

    /// `postgresql://<user>:<password>@<host>:<port>/<db_name>`, unset values left empty
    pub fn connection_url(&self) -> String {
        self.render_url(self.password.as_deref().unwrap_or_default())
    }

    /// Same as [`connection_url`](Self::connection_url) with the password masked
    pub fn redacted_url(&self) -> String {
        let password = match &self.password {
            Some(_) => "****",
            None => "",
        };
        self.render_url(password)
    }

    fn render_url(&self, password: &str) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user.as_deref().unwrap_or_default(),
            password,
            self.host.as_deref().unwrap_or_default(),
            self.port.as_deref().unwrap_or_default(),
            self.db_name.as_deref().unwrap_or_default(),
        )
    }
}

/// Load a `.env` file into the process environment.
///
/// Without an explicit path the nearest `.env` upward from the working
/// directory is used, and not finding one is fine. Variables already set in
/// the environment win over the file.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenv::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(err) if err.not_found() => {
                debug!("No .env file found, using the process environment");
                Ok(None)
            }
            Err(err) => Err(err).context("Failed to load .env file"),
        },
    }
}

/// Project configuration, read from `raw_loader.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    /// Name of the processing session
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Table to load, optionally schema-qualified
    #[serde(default = "default_table")]
    pub table: String,

    /// Number of partitions of the dataframe (defaults to available parallelism)
    #[serde(default)]
    pub partitions: Option<usize>,

    /// Rows per record batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Column count the table is expected to have; a mismatch is only reported
    #[serde(default)]
    pub expected_columns: Option<usize>,

    /// Declared schemas by table name
    #[serde(default)]
    pub tables: HashMap<String, Vec<ColumnDef>>,
}

fn default_app_name() -> String {
    "raw_loader".to_string()
}

fn default_table() -> String {
    "table_raw".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            table: default_table(),
            partitions: None,
            batch_size: default_batch_size(),
            expected_columns: None,
            tables: HashMap::new(),
        }
    }
}

impl LoaderConfig {
    /// Partition count to use, falling back to the machine's parallelism
    pub fn effective_partitions(&self) -> usize {
        self.partitions
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

/// Reads the configuration file from the specified path or looks for
/// raw_loader.yaml in the current directory.
///
/// A missing default file yields the default configuration; a missing
/// explicit file is an error.
pub fn read_config(config_path: Option<PathBuf>) -> Result<LoaderConfig> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            let current_dir = std::env::current_dir()?;
            let path = current_dir.join(DEFAULT_CONFIG_FILE);
            if !path.exists() {
                debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                return Ok(LoaderConfig::default());
            }
            path
        }
    };

    let config_str = std::fs::read_to_string(&config_path).with_context(|| {
        format!("Configuration file not found at: {}", config_path.display())
    })?;
    let config: LoaderConfig = serde_yaml::from_str(&config_str)
        .with_context(|| format!("Invalid configuration file {}", config_path.display()))?;

    Ok(config)
}
