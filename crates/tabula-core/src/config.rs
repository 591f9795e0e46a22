//! Layered configuration
//!
//! Values come from defaults, then an optional TOML file, then `TABULA_*`
//! environment variables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `gateway.workflow_url`
pub const ENV_WORKFLOW_URL: &str = "TABULA_WORKFLOW_URL";
/// Environment variable overriding `gateway.proxy_url`
pub const ENV_PROXY_URL: &str = "TABULA_PROXY_URL";
/// Environment variable overriding `default_model`
pub const ENV_MODEL: &str = "TABULA_MODEL";
/// Environment variable overriding `session.path`
pub const ENV_SESSION_PATH: &str = "TABULA_SESSION_PATH";
/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "tabula.toml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulaConfig {
    pub gateway: GatewayConfig,
    pub polling: PollingConfig,
    pub access: AccessConfig,
    pub session: SessionConfig,
    /// Model name sent to the planner and executor
    pub default_model: String,
}

impl TabulaConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path` (or `tabula.toml` if present), apply environment
    /// overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_file = Path::new(DEFAULT_CONFIG_FILE);
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if default_file.is_file() => Self::from_file(default_file)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without environment overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from a variable lookup (the process env in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_WORKFLOW_URL) {
            self.gateway.workflow_url = url;
        }
        if let Some(url) = lookup(ENV_PROXY_URL) {
            self.gateway.proxy_url = url;
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.default_model = model;
        }
        if let Some(path) = lookup(ENV_SESSION_PATH) {
            self.session.path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.polling.stall_threshold == 0 {
            return Err(ConfigError::Invalid(
                "polling.stall_threshold must be greater than zero".to_string(),
            ));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "gateway.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid("default_model must not be empty".to_string()));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_unassigned_policy(mut self, policy: UnassignedPolicy) -> Self {
        self.access.unassigned_policy = policy;
        self
    }
}

impl Default for TabulaConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            polling: PollingConfig::default(),
            access: AccessConfig::default(),
            session: SessionConfig::default(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Endpoints of the workflow engine and the relational-data proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub workflow_url: String,
    pub proxy_url: String,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fail if a URL the caller needs was never configured
    pub fn require_workflow_url(&self) -> Result<&str, ConfigError> {
        require_url("gateway.workflow_url", &self.workflow_url)
    }

    pub fn require_proxy_url(&self) -> Result<&str, ConfigError> {
        require_url("gateway.proxy_url", &self.proxy_url)
    }
}

fn require_url<'a>(name: &str, value: &'a str) -> Result<&'a str, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{name} is not configured")));
    }
    Ok(trimmed.trim_end_matches('/'))
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            workflow_url: String::new(),
            proxy_url: String::new(),
            timeout_secs: 60,
        }
    }
}

/// Report progress polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Recurring poll period
    pub interval_secs: u64,
    /// Delay of the catch-up poll after submission
    pub initial_delay_secs: u64,
    /// Consecutive all-terminal polls before a synthetic timeout
    pub stall_threshold: u32,
}

impl PollingConfig {
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[inline]
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            initial_delay_secs: 2,
            stall_threshold: 24,
        }
    }
}

/// What happens to datasets that carry no profile code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnassignedPolicy {
    /// Only the uploading owner sees the dataset
    #[default]
    OwnerOnly,
    /// Every authenticated user sees the dataset
    VisibleToAll,
}

impl std::str::FromStr for UnassignedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "owner-only" => Ok(Self::OwnerOnly),
            "visible-to-all" => Ok(Self::VisibleToAll),
            other => Err(ConfigError::Invalid(format!(
                "unknown unassigned policy `{other}` (expected owner-only or visible-to-all)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub unassigned_policy: UnassignedPolicy,
}

/// Persisted session location and lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub path: PathBuf,
    pub ttl_hours: i64,
}

impl SessionConfig {
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".tabula/session.json"),
            ttl_hours: 24,
        }
    }
}
