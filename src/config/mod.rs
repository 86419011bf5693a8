//! Typed configuration.
//!
//! Process settings come from environment variables and load once at
//! startup. Engine tuning lives in [`EngineConfig`], which can be read
//! from a TOML file and overridden per variable. The database URL is
//! wrapped in `SecretString` so it never lands in logs.

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Namespace todos are mirrored under unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "event-driven-todos";

/// Retention hint for freshly created todos: seven days.
pub const DEFAULT_TODO_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug)]
pub struct Config {
    /// Postgres URL for the memory store. In-process memory when unset.
    pub database_url: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut engine = match optional_var("HIVE_TODO_CONFIG") {
            Some(path) => EngineConfig::load(Path::new(&path))?,
            None => EngineConfig::default(),
        };
        if let Some(namespace) = optional_var("HIVE_TODO_NAMESPACE") {
            engine.namespace = namespace;
        }
        if let Some(ttl) = optional_var("HIVE_TODO_TTL_SECS") {
            engine.todo_ttl_secs = ttl
                .parse()
                .map_err(|e| Error::Config(format!("HIVE_TODO_TTL_SECS is not a number: {e}")))?;
        }
        engine.validate()?;

        Ok(Self {
            database_url: optional_var("DATABASE_URL").map(SecretString::from),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            engine,
        })
    }
}

/// Engine tuning. Every field has a default, so an empty TOML file is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memory-store namespace for mirrored todos.
    pub namespace: String,
    /// TTL hint sent with newly created todos.
    pub todo_ttl_secs: u64,
    /// Buffer size of the notification channel.
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            todo_ttl_secs: DEFAULT_TODO_TTL_SECS,
            notification_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read engine config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Config("namespace must not be empty".to_string()));
        }
        if self.notification_capacity == 0 {
            return Err(Error::Config(
                "notification_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
