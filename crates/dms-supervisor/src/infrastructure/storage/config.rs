//! TOML-based configuration file for the supervisor.
//!
//! The file lives in the platform-appropriate config directory unless a path
//! is given on the command line:
//! - Windows:  `%APPDATA%\dms\config.toml`
//! - Linux:    `~/.config/dms/config.toml`
//! - macOS:    `~/Library/Application Support/dms/config.toml`
//!
//! # What is TOML? (for beginners)
//!
//! TOML (Tom's Obvious Minimal Language) is a configuration file format
//! designed to be easy to read and write.  Example:
//!
//! ```toml
//! [cache]
//! path = "/var/lib/dms/ffprobe-cache"
//! capacity_bytes = 33554432
//!
//! [network]
//! bind_address = "0.0.0.0:1338"
//! interface = "eth0"
//! allowed_ips = "192.168.1.0/24,10.0.0.7"
//! poll_interval_secs = 30
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! # Serde default values
//!
//! Every field carries a `#[serde(default = "...")]`, and every section is
//! optional, so an empty file (or no file at all) yields the defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dms_core::{parse_allowed_nets, DEFAULT_CACHE_CAPACITY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    SupervisorConfig, DEFAULT_CACHE_FILE_NAME, DEFAULT_HTTP_PORT, DEFAULT_POLL_INTERVAL,
};

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

    /// A field parsed as TOML but its value is not acceptable.
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Probe cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSection {
    /// Snapshot file path.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// Capacity in bytes of serialized entries.
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
}

/// Listener and interface monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// `ip:port` for the HTTP listener.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Only serve on this interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Comma separated allowed client networks; empty allows everyone.
    #[serde(default)]
    pub allowed_ips: String,
    /// Seconds between interface monitor ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

/// `$HOME/.dms-ffprobe-cache`, or the bare file name when no home directory
/// is known.
pub fn default_cache_path() -> PathBuf {
    home_dir()
        .map(|home| home.join(DEFAULT_CACHE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE_NAME))
}
fn default_capacity_bytes() -> u64 {
    DEFAULT_CACHE_CAPACITY
}
fn default_bind_address() -> String {
    format!("0.0.0.0:{DEFAULT_HTTP_PORT}")
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            capacity_bytes: default_capacity_bytes(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            interface: None,
            allowed_ips: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl FileConfig {
    /// Resolves the file contents into a runtime [`SupervisorConfig`].
    ///
    /// Unparseable allowed-network entries are logged and skipped (see
    /// [`parse_allowed_nets`]); an empty interface name means "all".
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the bind address is not an
    /// `ip:port` pair or the poll interval is zero.
    pub fn into_supervisor_config(self) -> Result<SupervisorConfig, ConfigError> {
        let bind_addr: SocketAddr =
            self.network
                .bind_address
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    field: "network.bind_address",
                    value: self.network.bind_address.clone(),
                })?;

        if self.network.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.poll_interval_secs",
                value: "0".to_string(),
            });
        }

        Ok(SupervisorConfig {
            cache_path: self.cache.path,
            cache_capacity: self.cache.capacity_bytes,
            poll_interval: Duration::from_secs(self.network.poll_interval_secs),
            if_name: self.network.interface.filter(|name| !name.is_empty()),
            bind_addr,
            allowed_nets: parse_allowed_nets(&self.network.allowed_ips),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path in the platform config directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the configuration at `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("USERPROFILE").map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}

/// Resolves the platform config directory, including the `dms` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("dms"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home_dir().map(|h| h.join(".config")))?;
        Some(base.join("dms"))
    }

    #[cfg(target_os = "macos")]
    {
        home_dir().map(|h| h.join("Library").join("Application Support").join("dms"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_cache_path_ends_with_snapshot_file_name() {
        assert!(default_cache_path().ends_with(DEFAULT_CACHE_FILE_NAME));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        // Arrange / Act
        let cfg: FileConfig = toml::from_str("").expect("deserialize empty");

        // Assert
        assert_eq!(cfg, FileConfig::default());
        assert_eq!(cfg.network.bind_address, "0.0.0.0:1338");
        assert_eq!(cfg.network.poll_interval_secs, 30);
        assert_eq!(cfg.cache.capacity_bytes, DEFAULT_CACHE_CAPACITY);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
[network]
interface = "eth0"
"#;

        // Act
        let cfg: FileConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.network.interface.as_deref(), Some("eth0"));
        assert_eq!(cfg.network.bind_address, "0.0.0.0:1338");
        assert_eq!(cfg.cache, CacheSection::default());
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<FileConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");

        assert!(result.is_err());
    }

    // ── Resolution into SupervisorConfig ─────────────────────────────────────

    #[test]
    fn test_into_supervisor_config_resolves_every_field() {
        // Arrange
        let toml_str = r#"
[cache]
path = "/var/lib/dms/cache.json"
capacity_bytes = 1024

[network]
bind_address = "127.0.0.1:8200"
interface = "wlan0"
allowed_ips = "192.168.1.0/24, 10.0.0.7"
poll_interval_secs = 5

[logging]
level = "debug"
"#;
        let file: FileConfig = toml::from_str(toml_str).expect("deserialize");

        // Act
        let cfg = file.into_supervisor_config().expect("resolve");

        // Assert
        assert_eq!(cfg.cache_path, PathBuf::from("/var/lib/dms/cache.json"));
        assert_eq!(cfg.cache_capacity, 1024);
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:8200");
        assert_eq!(cfg.if_name.as_deref(), Some("wlan0"));
        assert_eq!(cfg.allowed_nets.len(), 2);
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_into_supervisor_config_treats_empty_interface_as_all() {
        let mut file = FileConfig::default();
        file.network.interface = Some(String::new());

        let cfg = file.into_supervisor_config().expect("resolve");

        assert_eq!(cfg.if_name, None);
    }

    #[test]
    fn test_into_supervisor_config_rejects_bad_bind_address() {
        let mut file = FileConfig::default();
        file.network.bind_address = "not-an-address".to_string();

        let result = file.into_supervisor_config();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "network.bind_address", .. })
        ));
    }

    #[test]
    fn test_into_supervisor_config_rejects_zero_poll_interval() {
        let mut file = FileConfig::default();
        file.network.poll_interval_secs = 0;

        assert!(file.into_supervisor_config().is_err());
    }

    // ── load_config / save_config ─────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let dir = tempfile::tempdir().expect("tempdir");

        let cfg = load_config(&dir.path().join("config.toml")).expect("load");

        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = FileConfig::default();
        cfg.network.poll_interval_secs = 12;
        cfg.logging.level = "trace".to_string();

        // Act
        save_config(&path, &cfg).expect("save");
        let loaded = load_config(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_load_config_reports_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[network\nbind_address = ").expect("write");

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir is acceptable in a stripped CI environment.
    }
}
