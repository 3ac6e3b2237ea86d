//! TOML configuration of the host process.
//!
//! Reads and writes [`HostConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Libria\config.toml`
//! - Linux:    `~/.config/libria/config.toml`
//! - macOS:    `~/Library/Application Support/Libria/config.toml`
//!
//! ```toml
//! [shell]
//! app_name = "Libria"
//! log_level = "info"
//!
//! [ipc]
//! bind_address = "127.0.0.1"
//! port = 0
//!
//! [[surfaces]]
//! label = "main"
//! command = "/usr/bin/libria-ui"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section or a
//! missing key all fall back to the values below.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::ipc::IpcServerConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    /// UI processes to launch at start-up.
    #[serde(default)]
    pub surfaces: Vec<SurfaceEntry>,
}

/// Application identity and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellConfig {
    /// Shown by the about panel.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcConfig {
    /// Loopback unless UI processes run elsewhere.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// `0` picks an ephemeral port; UI processes learn it from their environment.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

/// One window rendered by its own UI process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfaceEntry {
    pub label: String,
    /// Executable of the UI process.  Absent means the UI is started by hand
    /// and connects on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default)]
    pub devtools_on_start: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_app_name() -> String {
    "Libria".to_string()
}
fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_hello_timeout_secs() -> u64 {
    5
}
fn default_ping_interval_secs() -> u64 {
    10
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_version(),
            log_level: default_log_level(),
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: 0,
            hello_timeout_secs: default_hello_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl IpcConfig {
    /// The socket address the IPC server binds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindAddress`] when `bind_address` is not an IP.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Converts the file settings into the server's runtime settings.
    pub fn server_config(&self) -> Result<IpcServerConfig, ConfigError> {
        Ok(IpcServerConfig {
            bind_addr: self.socket_addr()?,
            hello_timeout: Duration::from_secs(self.hello_timeout_secs),
            // A zero interval would make the pinger spin.
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
        })
    }
}

impl Default for SurfaceEntry {
    fn default() -> Self {
        Self {
            label: String::new(),
            command: None,
            args: Vec::new(),
            devtools_on_start: false,
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

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform path, or defaults when it is absent.
pub fn load_config() -> Result<HostConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `HostConfig` from `path`, returning `HostConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<HostConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &HostConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
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

pub fn save_config(config: &HostConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Libria"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("libria"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Libria"))
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
    use uuid::Uuid;

    #[test]
    fn test_host_config_default_binds_ephemeral_loopback_port() {
        // Arrange / Act
        let cfg = HostConfig::default();

        // Assert
        assert_eq!(cfg.ipc.bind_address, "127.0.0.1");
        assert_eq!(cfg.ipc.port, 0);
        assert!(cfg.surfaces.is_empty());
    }

    #[test]
    fn test_shell_config_default_log_level_is_info() {
        let cfg = ShellConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.app_name, "Libria");
    }

    #[test]
    fn test_host_config_with_surfaces_round_trips() {
        // Arrange
        let mut cfg = HostConfig::default();
        cfg.ipc.port = 47000;
        cfg.surfaces.push(SurfaceEntry {
            label: "main".to_string(),
            command: Some(PathBuf::from("/usr/bin/libria-ui")),
            args: vec!["--verbose".to_string()],
            devtools_on_start: true,
        });

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: HostConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_surface_without_command_omits_it() {
        let mut cfg = HostConfig::default();
        cfg.surfaces.push(SurfaceEntry {
            label: "torrent".to_string(),
            ..SurfaceEntry::default()
        });

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");

        assert!(!toml_str.contains("command"), "None command must be omitted");
        let restored: HostConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(restored.surfaces[0].command, None);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: HostConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, HostConfig::default());
    }

    #[test]
    fn test_deserialize_partial_ipc_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[ipc]
port = 47123
"#;

        // Act
        let cfg: HostConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.ipc.port, 47123);
        assert_eq!(cfg.ipc.hello_timeout_secs, 5);
        assert_eq!(cfg.shell.log_level, "info");
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let path = std::env::temp_dir().join(format!("libria_bad_{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        let cfg = load_config_from(&path).unwrap();

        assert_eq!(cfg, HostConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("libria_test_{}", Uuid::new_v4()));
        let path = dir.join("nested").join("config.toml");
        let mut cfg = HostConfig::default();
        cfg.shell.log_level = "debug".to_string();

        // Act
        save_config_to(&path, &cfg).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded.shell.log_level, "debug");

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_server_config_converts_seconds_and_address() {
        let mut ipc = IpcConfig::default();
        ipc.port = 47001;
        ipc.ping_interval_secs = 0;

        let server = ipc.server_config().unwrap();

        let expected: SocketAddr = "127.0.0.1:47001".parse().unwrap();
        assert_eq!(server.bind_addr, expected);
        assert_eq!(server.hello_timeout, Duration::from_secs(5));
        assert_eq!(server.ping_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let ipc = IpcConfig {
            bind_address: "localhost".to_string(),
            ..IpcConfig::default()
        };

        assert!(matches!(ipc.socket_addr(), Err(ConfigError::BindAddress(_))));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
