//! Configuration file loading.
//!
//! Two shapes are accepted:
//!
//! ```json
//! { "tftp": { "bind": "0.0.0.0:69" }, "nfs": { "enabled": false }, "images": [ ... ] }
//! ```
//!
//! or a bare array of image records, in which case every server setting
//! takes its default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pxefs_types::Image;

use crate::constants::{DEFAULT_NFS_BIND, DEFAULT_POLL_INTERVAL, DEFAULT_TFTP_BIND};

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// TFTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TftpConfig {
    pub bind: SocketAddr,
    /// Receive timeout of the server loop, in milliseconds.
    pub poll_interval_ms: u64,
}

impl TftpConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for TftpConfig {
    fn default() -> Self {
        Self {
            bind: default_addr(DEFAULT_TFTP_BIND),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// NFS server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
}

impl Default for NfsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_addr(DEFAULT_NFS_BIND),
        }
    }
}

fn default_addr(addr: &str) -> SocketAddr {
    addr.parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tftp: TftpConfig,
    #[serde(default)]
    pub nfs: NfsConfig,
    #[serde(default)]
    pub images: Vec<Image>,
}

impl Config {
    /// Load and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse either accepted shape and expand `~` in image locations.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let mut config = if value.is_array() {
            Config {
                images: serde_json::from_value(value)?,
                ..Config::default()
            }
        } else {
            serde_json::from_value::<Config>(value)?
        };

        for image in &mut config.images {
            let raw = image.location.to_string_lossy().into_owned();
            image.location = PathBuf::from(shellexpand::tilde(&raw).as_ref());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxefs_types::ImageFormat;

    #[test]
    fn test_full_config() {
        let config = Config::from_json(
            r#"{
                "tftp": { "bind": "127.0.0.1:6969", "poll_interval_ms": 250 },
                "nfs": { "enabled": false },
                "images": [
                    { "id": 16777216, "name": "debian", "format": "iso",
                      "location": "/srv/debian.iso", "root": true }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.tftp.bind, "127.0.0.1:6969".parse().unwrap());
        assert_eq!(config.tftp.poll_interval(), Duration::from_millis(250));
        assert!(!config.nfs.enabled);
        assert_eq!(config.nfs.bind, "0.0.0.0:2049".parse().unwrap());
        assert_eq!(config.images.len(), 1);
        assert!(config.images[0].is_root);
    }

    #[test]
    fn test_legacy_catalog() {
        let config = Config::from_json(
            r#"[
                { "id": 16777216, "name": "debian", "format": "LOCAL_ISO", "location": "/srv/debian.iso", "isRoot": true },
                { "id": 33554432, "name": "tools", "format": "LOCAL_DIR", "location": "/srv/tools" }
            ]"#,
        )
        .unwrap();
        assert_eq!(config.tftp, TftpConfig::default());
        assert!(config.nfs.enabled);
        assert_eq!(config.images[1].format, ImageFormat::Directory);
        assert!(config.images[0].is_root);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.tftp.bind, "0.0.0.0:69".parse().unwrap());
        assert_eq!(config.tftp.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(config.images.is_empty());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = Config::from_json(
            r#"[{ "id": 16777216, "name": "x", "format": "vmdk", "location": "/x" }]"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_reserved_id_bits_are_rejected() {
        let err = Config::from_json(
            r#"{ "images": [{ "id": 16777217, "name": "x", "format": "iso", "location": "/x" }] }"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_tilde_is_expanded() {
        let config = Config::from_json(
            r#"[{ "id": 16777216, "name": "x", "format": "directory", "location": "~/images" }]"#,
        )
        .unwrap();
        assert!(!config.images[0].location.starts_with("~"));
        assert!(config.images[0].location.ends_with("images"));
    }

    #[test]
    fn test_load_reports_path() {
        let err = Config::load("/definitely/missing.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/missing.json"));
    }
}
