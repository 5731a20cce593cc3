//! Collector configuration
//!
//! TOML sections with full defaults - an empty file (or a missing one) runs
//! a UDP listener on 4739 dumping to stdout. Only override what you need:
//!
//! ```toml
//! [global]
//! queue_size = 128
//!
//! [input.file]
//! path = "capture.ipfix"
//!
//! [join]
//! to_odid = 1
//!
//! [storage]
//! plugins = ["null"]
//! ```

use std::path::{Path, PathBuf};

use flowcol_protocol::DEFAULT_MAX_SETS;
use flowcol_templates::UDP_TEMPLATE_LIFETIME_SECS;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level collector configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub input: InputConfig,
    /// Merge all Observation Domains into one synthetic domain
    pub join: Option<JoinConfig>,
    pub storage: StorageConfig,
}

/// Settings that apply across the pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Slots per ring buffer
    /// Default: 64
    pub queue_size: usize,

    /// Maximum Sets accepted in one message
    /// Default: 1024
    pub max_sets: usize,

    /// Seconds before a UDP-learned template's refresh is overdue
    /// Default: 1800
    pub udp_template_lifetime_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            queue_size: 64,
            max_sets: DEFAULT_MAX_SETS,
            udp_template_lifetime_secs: UDP_TEMPLATE_LIFETIME_SECS,
        }
    }
}

/// Which input feeds the pipeline
///
/// Exactly one of `udp` and `file` is active; `file` wins when both are
/// set (replay is always deliberate).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub udp: UdpInputConfig,
    pub file: Option<FileInputConfig>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            udp: UdpInputConfig::default(),
            file: None,
        }
    }
}

/// UDP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UdpInputConfig {
    /// Listen address
    /// Default: "0.0.0.0:4739" (the IANA IPFIX port)
    pub listen: String,

    /// Receive buffer size in bytes
    /// Default: 65535 (one maximal IPFIX message)
    pub buffer_size: usize,
}

impl Default for UdpInputConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4739".into(),
            buffer_size: 65535,
        }
    }
}

/// Replay a file of concatenated IPFIX messages
#[derive(Debug, Clone, Deserialize)]
pub struct FileInputConfig {
    pub path: PathBuf,
}

/// Domain-join stage settings
#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    /// The synthetic Observation Domain ID everything merges into
    pub to_odid: u32,
}

/// Storage plugin chain applied in every Domain Context
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Plugin names in application order ("null", "dump")
    pub plugins: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            plugins: vec!["dump".into()],
        }
    }
}

impl Config {
    /// Load from a TOML file; a missing file falls back to the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global.queue_size == 0 {
            return Err(ConfigError::Invalid("global.queue_size must be non-zero".into()));
        }
        if self.global.max_sets == 0 {
            return Err(ConfigError::Invalid("global.max_sets must be non-zero".into()));
        }
        if self.storage.plugins.is_empty() {
            return Err(ConfigError::Invalid("storage.plugins must not be empty".into()));
        }
        for name in &self.storage.plugins {
            if name != "null" && name != "dump" {
                return Err(ConfigError::Invalid(format!("unknown storage plugin {name:?}")));
            }
        }
        if self.input.udp.buffer_size < 16 {
            return Err(ConfigError::Invalid(
                "input.udp.buffer_size cannot hold a message header".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.global.queue_size, 64);
        assert_eq!(config.global.udp_template_lifetime_secs, 1800);
        assert_eq!(config.storage.plugins, vec!["dump"]);
        assert!(config.join.is_none());
    }

    #[test]
    fn deserialize_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.input.udp.listen, "0.0.0.0:4739");
        assert_eq!(config.global.max_sets, 1024);
    }

    #[test]
    fn deserialize_partial() {
        let toml = r#"
[global]
queue_size = 128

[join]
to_odid = 7

[storage]
plugins = ["null", "dump"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.global.queue_size, 128);
        assert_eq!(config.join.unwrap().to_odid, 7);
        assert_eq!(config.storage.plugins.len(), 2);
        // Defaults still apply
        assert_eq!(config.global.udp_template_lifetime_secs, 1800);
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        let toml = r#"
[storage]
plugins = ["clickhouse"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_queue_is_rejected() {
        let toml = r#"
[global]
queue_size = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
