//! # GitHub App Configuration
//!
//! Identity of the GitHub App the operator authenticates as.
//!
//! Values come from an optional YAML file (`$GTM_CONFIG_PATH`, default
//! `/config/gtm.yaml`) and are then overridden by environment variables:
//!
//! | Key               | Environment                                   |
//! |-------------------|-----------------------------------------------|
//! | `app_id`          | `GTM_APP_ID`, `GITHUB_APP_ID`                 |
//! | `installation_id` | `GTM_INSTALLATION_ID`, `GITHUB_INSTALLATION_ID` |
//! | `provider`        | `GTM_PROVIDER`, `KMS_PROVIDER`                |
//! | `key`             | `GTM_KEY`, `KMS_KEY`, `GITHUB_PRIVATE_KEY`    |

use crate::constants::DEFAULT_CONFIG_PATH;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value {value:?} for {key}: {source}")]
    InvalidValue {
        key: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("GitHub App ID is not configured (set app_id or GTM_APP_ID)")]
    MissingAppId,
    #[error("GitHub App private key is not configured (set key or GTM_KEY)")]
    MissingKey,
    #[error("key provider {0:?} is not supported (expected \"file\" or \"env\")")]
    UnsupportedProvider(String),
    #[error("failed to read private key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where the App's private key comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyProvider {
    /// `key` is a path to a PEM file
    #[default]
    File,
    /// `key` is the PEM content itself
    Env,
}

impl FromStr for KeyProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "file" => Ok(KeyProvider::File),
            "env" => Ok(KeyProvider::Env),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KeyProvider::File => "file",
            KeyProvider::Env => "env",
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct AppConfigFile {
    #[serde(default)]
    app_id: Option<i64>,
    #[serde(default)]
    installation_id: Option<i64>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

/// GitHub App identity
#[derive(Clone)]
pub struct AppConfig {
    pub app_id: i64,
    /// Default installation used when an owner does not override it
    pub installation_id: Option<i64>,
    pub provider: KeyProvider,
    key: Zeroizing<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key: &str = match self.provider {
            KeyProvider::File => &self.key,
            KeyProvider::Env => "***",
        };
        f.debug_struct("AppConfig")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("provider", &self.provider)
            .field("key", &key)
            .finish()
    }
}

impl AppConfig {
    /// Load from `$GTM_CONFIG_PATH` (or the default path) and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GTM_CONFIG_PATH")
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    /// Load from a config file path and an arbitrary variable lookup
    ///
    /// A missing file is not an error; configuration may come entirely from
    /// the environment.
    pub fn load_from(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match std::fs::read_to_string(path) {
            Ok(content) => {
                info!("Loaded GitHub App configuration from {}", path.display());
                serde_yaml::from_str::<Option<AppConfigFile>>(&content)
                    .map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?
                    .unwrap_or_default()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No configuration file at {}, continuing with environment variables only",
                    path.display()
                );
                AppConfigFile::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k)).filter(|v| !v.is_empty());

        let app_id = match first(&["GTM_APP_ID", "GITHUB_APP_ID"]) {
            Some(v) => parse_id("app_id", &v)?,
            None => file.app_id.ok_or(ConfigError::MissingAppId)?,
        };
        if app_id <= 0 {
            return Err(ConfigError::MissingAppId);
        }

        let installation_id = match first(&["GTM_INSTALLATION_ID", "GITHUB_INSTALLATION_ID"]) {
            Some(v) => Some(parse_id("installation_id", &v)?),
            None => file.installation_id,
        }
        .filter(|id| *id != 0);

        let provider = first(&["GTM_PROVIDER", "KMS_PROVIDER"])
            .or(file.provider)
            .map_or(Ok(KeyProvider::File), |p| p.parse())?;

        let key = first(&["GTM_KEY", "KMS_KEY", "GITHUB_PRIVATE_KEY"])
            .or(file.key)
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingKey)?;

        Ok(Self {
            app_id,
            installation_id,
            provider,
            key: Zeroizing::new(key),
        })
    }

    /// PEM encoded private key, read according to the provider
    pub fn private_key_pem(&self) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
        match self.provider {
            KeyProvider::Env => Ok(Zeroizing::new(self.key.as_bytes().to_vec())),
            KeyProvider::File => {
                let path = PathBuf::from(self.key.as_str());
                std::fs::read(&path)
                    .map(Zeroizing::new)
                    .map_err(|source| ConfigError::KeyFile { path, source })
            }
        }
    }
}

fn parse_id(key: &'static str, value: &str) -> Result<i64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            source,
        })
}
