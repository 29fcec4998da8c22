//! Configuration file discovery and loading
//!
//! Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/<app>/config.toml`), if present
//! 4. Compiled defaults (fallback)
//!
//! An explicitly requested file (1 or 2) must exist and parse. A missing file
//! in the platform directory just means compiled defaults apply.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SPEECHPIPE_CONFIG";

/// Logging configuration (`[logging]` table)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error, or a full
    /// `tracing_subscriber::EnvFilter` directive)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to the console if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the effective configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path given on the command line
    Explicit(PathBuf),
    /// Path taken from the environment variable
    Environment(PathBuf),
    /// Existing file in the platform config directory
    PlatformDefault(PathBuf),
    /// No file; compiled defaults
    CompiledDefaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(p) | ConfigSource::Environment(p) | ConfigSource::PlatformDefault(p) => {
                Some(p.as_path())
            }
            ConfigSource::CompiledDefaults => None,
        }
    }
}

/// Resolves the configuration source for one application
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    app_name: String,
    env_var: String,
}

impl ConfigResolver {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            env_var: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Use a different environment variable (tests, embedding applications)
    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = env_var.into();
        self
    }

    /// Platform config path for this application, whether or not it exists
    pub fn platform_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(&self.app_name).join("config.toml"))
    }

    /// Pick the configuration source following the priority order
    pub fn resolve(&self, cli_arg: Option<&Path>) -> ConfigSource {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return ConfigSource::Explicit(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.trim().is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        if let Some(path) = self.platform_path() {
            if path.exists() {
                return ConfigSource::PlatformDefault(path);
            }
            debug!("No config file at {}", path.display());
        }

        // Priority 4: Compiled defaults
        ConfigSource::CompiledDefaults
    }
}

/// Load a configuration of type `T` from the resolved source
pub fn load_config<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match source.path() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            parse_config_file(path)
        }
        None => {
            info!("No configuration file found, using compiled defaults");
            Ok(T::default())
        }
    }
}

/// Parse a TOML file into `T`
pub fn parse_config_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::Config(format!("Config file not found: {}", path.display())));
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}
