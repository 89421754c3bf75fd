//! Configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority, handled by the binary)
//! 2. Environment variable (also surfaced through the binary's argument parser)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is not an error: the daemon logs a warning and starts
//! with defaults. A config file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default TCP address the control protocol listens on
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:6600";

/// Default tracing filter when neither RUST_LOG nor the config file set one
pub const DEFAULT_LOG_LEVEL: &str = "rmpd=info,rmpd_ap=info,rmpd_common=info";

/// Which clients share a playback queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueScope {
    /// One daemon-wide queue controlled by every connected client
    #[default]
    Shared,
    /// Each connection gets a private queue that is dropped on disconnect
    PerConnection,
}

impl std::str::FromStr for QueueScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared" => Ok(QueueScope::Shared),
            "per-connection" => Ok(QueueScope::PerConnection),
            other => Err(Error::Config(format!(
                "unknown queue scope \"{}\" (expected \"shared\" or \"per-connection\")",
                other
            ))),
        }
    }
}

/// Audio output backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// System audio device via cpal
    #[default]
    Cpal,
    /// Real-time paced sink that discards samples (headless hosts, CI)
    Null,
}

impl std::str::FromStr for OutputKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpal" => Ok(OutputKind::Cpal),
            "null" => Ok(OutputKind::Null),
            other => Err(Error::Config(format!(
                "unknown output \"{}\" (expected \"cpal\" or \"null\")",
                other
            ))),
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub queue_scope: QueueScope,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            queue_scope: QueueScope::default(),
        }
    }
}

/// `[audio]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub output: OutputKind,
    /// Output device name (None = system default)
    pub device: Option<String>,
    /// Output buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
    /// Directories searched for relative track paths that do not resolve
    /// against the working directory
    pub scan_directories: Vec<PathBuf>,
    /// Extensions `audio add` accepts, without the dot (empty = every
    /// format the decoder supports)
    pub scan_formats: Vec<String>,
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub audio: AudioConfig,
}

impl TomlConfig {
    /// Parse a config file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Parse config file contents
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load the explicit config file if given, else the first platform config
    /// file that exists; fall back to defaults when none is found.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                None
            }
            None => default_config_path(),
        };

        match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Effective log filter: config value or compiled default
    pub fn log_filter(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }
}

/// First existing config file: `<config_dir>/rmpd/config.toml`, then
/// `/etc/rmpd/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rmpd").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/rmpd/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:6600");
        assert_eq!(config.server.queue_scope, QueueScope::Shared);
        assert_eq!(config.audio.output, OutputKind::Cpal);
        assert!(config.audio.scan_directories.is_empty());
        assert!(config.audio.scan_formats.is_empty());
        assert_eq!(config.log_filter(), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = TomlConfig::parse(
            r#"
            [server]
            queue_scope = "per-connection"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.queue_scope, QueueScope::PerConnection);
        assert_eq!(config.server.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_from_str_round_trips_config_values() {
        assert_eq!("shared".parse::<QueueScope>().unwrap(), QueueScope::Shared);
        assert_eq!(
            "per-connection".parse::<QueueScope>().unwrap(),
            QueueScope::PerConnection
        );
        assert!("global".parse::<QueueScope>().is_err());

        assert_eq!("null".parse::<OutputKind>().unwrap(), OutputKind::Null);
        assert!("alsa".parse::<OutputKind>().is_err());
    }
}
