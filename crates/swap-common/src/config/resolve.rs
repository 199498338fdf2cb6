//! Configuration resolution for SWAP.
//!
//! Implements deterministic config resolution order:
//! 1. Explicit CLI flag (`--config`)
//! 2. Environment variable (`SWAP_CONFIG`)
//! 3. XDG config (`$XDG_CONFIG_HOME/swap/config.json`, then `~/.config/swap/config.json`)
//! 4. Built-in defaults
//!
//! The data directory holding snapshots and reports resolves the same way
//! through `--data-dir`, `SWAP_DATA_DIR`, and the platform data dir.

use std::env;
use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use super::Config;
use crate::error::{Error, Result};

const CONFIG_DIR_NAME: &str = "swap";
const CONFIG_FILE_NAME: &str = "config.json";

/// How the config file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigResolution {
    /// From explicit CLI flag
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigResolution::CliFlag => write!(f, "cli"),
            ConfigResolution::EnvVar => write!(f, "env"),
            ConfigResolution::XdgConfig => write!(f, "xdg"),
            ConfigResolution::Default => write!(f, "default"),
        }
    }
}

/// Provenance of a loaded config.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file, or None if using defaults
    pub path: Option<PathBuf>,
    /// SHA-256 hash of file contents, or None if defaults
    pub hash: Option<String>,
    /// How this source was resolved
    pub resolution: ConfigResolution,
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    cli_config: Option<PathBuf>,
    cli_data_dir: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a resolver with CLI overrides.
    pub fn new(cli_config: Option<PathBuf>, cli_data_dir: Option<PathBuf>) -> Self {
        ConfigResolver {
            cli_config,
            cli_data_dir,
        }
    }

    /// Resolve the config file path.
    pub fn resolve_config_path(&self) -> (Option<PathBuf>, ConfigResolution) {
        if let Some(ref path) = self.cli_config {
            return (Some(path.clone()), ConfigResolution::CliFlag);
        }

        if let Ok(path) = env::var("SWAP_CONFIG") {
            return (Some(PathBuf::from(path)), ConfigResolution::EnvVar);
        }

        let xdg = env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(dirs::config_dir);
        if let Some(dir) = xdg {
            let path = dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if path.exists() {
                return (Some(path), ConfigResolution::XdgConfig);
            }
        }

        (None, ConfigResolution::Default)
    }

    /// Resolve the directory that holds estimator snapshots and reports.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.cli_data_dir {
            return dir.clone();
        }
        if let Ok(dir) = env::var("SWAP_DATA_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join(CONFIG_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("swap-data"))
    }

    /// Load config from the resolved path or defaults.
    ///
    /// An explicitly requested file that does not exist is an error; an
    /// absent XDG file silently falls through to defaults.
    pub fn load(&self) -> Result<(Config, ConfigSource)> {
        let (path, resolution) = self.resolve_config_path();

        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::ConfigNotFound { path: p });
                }
                let content = fs::read_to_string(&p).map_err(|e| {
                    Error::Config(format!("failed to read config from {}: {}", p.display(), e))
                })?;
                let hash = compute_sha256(&content);
                let config = Config::from_json(&content)?;
                Ok((
                    config,
                    ConfigSource {
                        path: Some(p),
                        hash: Some(hash),
                        resolution,
                    },
                ))
            }
            None => Ok((
                Config::default(),
                ConfigSource {
                    path: None,
                    hash: None,
                    resolution: ConfigResolution::Default,
                },
            )),
        }
    }
}

/// SHA-256 hex digest of file content.
pub fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn cli_path_wins() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("swap.json");
        fs::write(&path, r#"{"p0": 0.05}"#).expect("write");

        let resolver = ConfigResolver::new(Some(path.clone()), None);
        let (config, source) = resolver.load().expect("load");
        assert_eq!(config.p0, 0.05);
        assert_eq!(source.resolution, ConfigResolution::CliFlag);
        assert_eq!(source.path.as_deref(), Some(path.as_path()));
        assert_eq!(source.hash.as_ref().map(|h| h.len()), Some(64));
    }

    #[test]
    fn missing_cli_path_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let resolver = ConfigResolver::new(Some(dir.path().join("absent.json")), None);
        assert!(matches!(
            resolver.load().unwrap_err(),
            Error::ConfigNotFound { .. }
        ));
    }

    #[test]
    fn cli_data_dir_wins() {
        let resolver = ConfigResolver::new(None, Some(PathBuf::from("/tmp/swap-test")));
        assert_eq!(resolver.resolve_data_dir(), PathBuf::from("/tmp/swap-test"));
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            compute_sha256(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
