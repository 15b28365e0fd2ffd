//! TOML-based configuration for the gateway.
//!
//! The config file is read from an explicit `--config <path>` when given,
//! otherwise from the platform-appropriate location:
//! - Windows:  `%APPDATA%\VitalsGateway\config.toml`
//! - Linux:    `~/.config/vitals-gateway/config.toml`
//! - macOS:    `~/Library/Application Support/VitalsGateway/config.toml`
//!
//! A missing file is not an error: the gateway runs on defaults.
//!
//! # Example
//!
//! ```toml
//! [gateway]
//! log_level = "info"
//!
//! [network]
//! discovery_port = 6000
//! bind_address = "0.0.0.0"
//!
//! [dispatch]
//! workers = 10
//! idle_poll_ms = 50
//! max_connect_attempts = 1
//! evict_on_read_failure = false
//!
//! [liveness]
//! probe_initial_delay_secs = 5
//! probe_interval_secs = 10
//! probe_len = 3
//! cleaner_initial_delay_secs = 5
//! cleaner_interval_secs = 10
//! # probe_timeout_ms = 2000
//! ```
//!
//! # Serde default values (for beginners)
//!
//! Every field carries `#[serde(default = "some_fn")]`, and every section
//! `#[serde(default)]`, so a partial file only overrides what it names.  An
//! empty file is a valid config.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dispatch::DispatchPolicy;
use crate::application::liveness::LivenessPolicy;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewaySection {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Discovery socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// UDP port monitors broadcast their announcements to.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// IP address to bind the discovery socket to.  `"0.0.0.0"` binds all
    /// interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum concurrent sample cycles.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Sleep when there is neither pending work nor a live session.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Connect attempts before a discovered monitor is dropped.
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
    /// Retire a session immediately when its sample read fails.
    #[serde(default)]
    pub evict_on_read_failure: bool,
}

/// Prober and cleaner schedules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub probe_initial_delay_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub probe_interval_secs: u64,
    /// Marker bytes written per probe.
    #[serde(default = "default_probe_len")]
    pub probe_len: usize,
    /// Optional bound on one probe write; unset means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
    #[serde(default = "default_initial_delay_secs")]
    pub cleaner_initial_delay_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub cleaner_interval_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_port() -> u16 {
    6000
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_workers() -> usize {
    10
}
fn default_idle_poll_ms() -> u64 {
    50
}
fn default_max_connect_attempts() -> u32 {
    1
}
fn default_initial_delay_secs() -> u64 {
    5
}
fn default_interval_secs() -> u64 {
    10
}
fn default_probe_len() -> usize {
    vitals_core::protocol::liveness::DEFAULT_PROBE_LEN
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            idle_poll_ms: default_idle_poll_ms(),
            max_connect_attempts: default_max_connect_attempts(),
            evict_on_read_failure: false,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_initial_delay_secs: default_initial_delay_secs(),
            probe_interval_secs: default_interval_secs(),
            probe_len: default_probe_len(),
            probe_timeout_ms: None,
            cleaner_initial_delay_secs: default_initial_delay_secs(),
            cleaner_interval_secs: default_interval_secs(),
        }
    }
}

// ── Validation and conversion ─────────────────────────────────────────────────

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl GatewayConfig {
    /// Checks every value that would make the gateway misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network
            .bind_address
            .parse::<IpAddr>()
            .map_err(|e| invalid("network.bind_address", e.to_string()))?;
        if self.dispatch.workers == 0 {
            return Err(invalid("dispatch.workers", "must be at least 1"));
        }
        if self.dispatch.idle_poll_ms == 0 {
            return Err(invalid("dispatch.idle_poll_ms", "must be at least 1"));
        }
        if self.dispatch.max_connect_attempts == 0 {
            return Err(invalid("dispatch.max_connect_attempts", "must be at least 1"));
        }
        if self.liveness.probe_len == 0 {
            return Err(invalid("liveness.probe_len", "must be at least 1"));
        }
        if self.liveness.probe_interval_secs == 0 {
            return Err(invalid("liveness.probe_interval_secs", "must be at least 1"));
        }
        if self.liveness.cleaner_interval_secs == 0 {
            return Err(invalid("liveness.cleaner_interval_secs", "must be at least 1"));
        }
        if self.liveness.probe_timeout_ms == Some(0) {
            return Err(invalid("liveness.probe_timeout_ms", "must be at least 1 when set"));
        }
        Ok(())
    }

    /// Address the discovery socket binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP literal.
    pub fn discovery_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .network
            .bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid("network.bind_address", e.to_string()))?;
        Ok(SocketAddr::new(ip, self.network.discovery_port))
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            workers: self.dispatch.workers,
            idle_poll: Duration::from_millis(self.dispatch.idle_poll_ms),
            max_connect_attempts: self.dispatch.max_connect_attempts,
            evict_on_read_failure: self.dispatch.evict_on_read_failure,
        }
    }

    pub fn liveness_policy(&self) -> LivenessPolicy {
        let l = &self.liveness;
        LivenessPolicy {
            probe_initial_delay: Duration::from_secs(l.probe_initial_delay_secs),
            probe_interval: Duration::from_secs(l.probe_interval_secs),
            probe_len: l.probe_len,
            probe_timeout: l.probe_timeout_ms.map(Duration::from_millis),
            cleaner_initial_delay: Duration::from_secs(l.cleaner_initial_delay_secs),
            cleaner_interval: Duration::from_secs(l.cleaner_interval_secs),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads and validates a [`GatewayConfig`].
///
/// Reads `path` when given, otherwise the platform default.  A missing file
/// yields `GatewayConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    let cfg = match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str::<GatewayConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => GatewayConfig::default(),
        Err(e) => return Err(ConfigError::Io { path, source: e }),
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Writes `config` to `path`, or to the platform default when `None`.
///
/// Creates the parent directory if needed and returns the path written.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &GatewayConfig, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("VitalsGateway"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("vitals-gateway"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("VitalsGateway")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
