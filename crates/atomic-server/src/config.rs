//! Configuration loading and typed config structures for the atomic server.
//!
//! Configuration lives in `atomic-config.yaml` next to the binary's working
//! directory. Every section has defaults, so a missing file or a partial
//! one is fine. The harness itself is off unless explicitly enabled.
//!
//! Environment variables override the file:
//! - `CI=true` enables the harness
//! - `ATOMIC_ENABLED` sets `atomic.enabled` explicitly (`true`/`false`)
//! - `DATABASE_URL` replaces the URL of the `default` store

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use atomic_db::StoreConfig;
use atomic_db::registry::DEFAULT_ALIAS;
use serde::Deserialize;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default URL of the `default` store.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://atomic.db?mode=rwc";

/// Default pool size for per-request stores.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The `--addrport` value is not `addr:port`.
    #[error("not a valid address:port: {0}")]
    InvalidAddrPort(String),

    /// Two databases share an alias.
    #[error("duplicate database alias: {0}")]
    DuplicateAlias(String),

    /// An enrolled alias has no matching database.
    #[error("enrolled alias `{0}` is not a configured database")]
    UnknownEnrolledAlias(String),

    /// An environment override could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Bind address.
    #[serde(default)]
    pub server: ServerSection,

    /// Databases in registry order.
    #[serde(default = "default_databases")]
    pub databases: Vec<DatabaseConfig>,

    /// Harness settings.
    #[serde(default)]
    pub atomic: AtomicConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            databases: default_databases(),
            atomic: AtomicConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::InvalidValue`] for a malformed override.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `ATOMIC_ENABLED` is not a bool.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `ATOMIC_ENABLED` is not a bool.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("CI").is_some_and(|v| v == "true") {
            self.atomic.enabled = true;
        }

        if let Some(value) = lookup("ATOMIC_ENABLED") {
            self.atomic.enabled = value.parse().map_err(|_bad_bool| ConfigError::InvalidValue {
                name: "ATOMIC_ENABLED".to_owned(),
                value: value.clone(),
            })?;
        }

        let default_db = self.databases.iter_mut().find(|d| d.alias == DEFAULT_ALIAS);
        if let (Some(url), Some(db)) = (lookup("DATABASE_URL"), default_db) {
            db.url = url;
        }

        Ok(())
    }

    /// Check aliases are unique and every enrolled alias exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateAlias`] or
    /// [`ConfigError::UnknownEnrolledAlias`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut aliases = BTreeSet::new();
        for db in &self.databases {
            if !aliases.insert(db.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias(db.alias.clone()));
            }
        }

        if let Some(unknown) = self
            .atomic
            .enrolled
            .iter()
            .find(|alias| !aliases.contains(alias.as_str()))
        {
            return Err(ConfigError::UnknownEnrolledAlias(unknown.clone()));
        }

        Ok(())
    }
}

/// Bind address section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
        }
    }
}

/// One configured database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Unique alias.
    pub alias: String,
    /// Connection URL.
    pub url: String,
    /// Whether the database is a read mirror.
    #[serde(default)]
    pub mirror: bool,
    /// Pool size when the harness is disabled.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Convert into the data layer's store configuration.
    pub fn to_store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.alias, &self.url)
            .with_mirror(self.mirror)
            .with_max_connections(self.max_connections)
    }
}

/// Harness settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AtomicConfig {
    /// Whether the control endpoints and pinned connections are active.
    #[serde(default)]
    pub enabled: bool,
    /// Aliases allowed to take part in scopes.
    #[serde(default = "default_enrolled")]
    pub enrolled: Vec<String>,
    /// Whether a scope is opened as soon as the server starts.
    #[serde(default = "default_true")]
    pub begin_on_start: bool,
    /// SQL script run by the `setup` endpoint.
    #[serde(default)]
    pub fixtures: Option<PathBuf>,
}

impl Default for AtomicConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enrolled: default_enrolled(),
            begin_on_start: true,
            fixtures: None,
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

const fn default_true() -> bool {
    true
}

fn default_enrolled() -> Vec<String> {
    vec![DEFAULT_ALIAS.to_owned()]
}

fn default_databases() -> Vec<DatabaseConfig> {
    vec![DatabaseConfig {
        alias: DEFAULT_ALIAS.to_owned(),
        url: DEFAULT_DATABASE_URL.to_owned(),
        mirror: false,
        max_connections: DEFAULT_MAX_CONNECTIONS,
    }]
}
