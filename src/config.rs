use crate::controller::DEFAULT_CLUSTER_RESOURCE_NAMESPACE;
use crate::scheduler::queue::Backoff;
use crate::utils::errors::{Result, VaultIssuerError};
use crate::utils::paths::VaultIssuerPaths;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `retry_max`
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Host configuration, read from YAML. Every field is optional.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// YAML file with issuers, cluster issuers and secrets
    pub inventory: PathBuf,
    /// Directory scanned for request files by `run`
    pub requests_dir: PathBuf,
    /// Issued certificates are written below this directory
    pub output_dir: PathBuf,
    pub cluster_resource_namespace: String,
    pub workers: usize,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sign_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub resync_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_base: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            inventory: VaultIssuerPaths::inventory_file()
                .unwrap_or_else(|_| PathBuf::from("inventory.yaml")),
            requests_dir: VaultIssuerPaths::requests_dir()
                .unwrap_or_else(|_| PathBuf::from("requests")),
            output_dir: VaultIssuerPaths::issued_dir().unwrap_or_else(|_| PathBuf::from("issued")),
            cluster_resource_namespace: DEFAULT_CLUSTER_RESOURCE_NAMESPACE.to_string(),
            workers: 2,
            sign_timeout: Duration::from_secs(60),
            resync_interval: Duration::from_secs(300),
            retry_base: backoff.base,
            retry_max: backoff.max,
        }
    }
}

impl Config {
    /// Load `path`, or the default config file when `path` is `None`.
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (VaultIssuerPaths::config_file()?, false),
        };

        if !path.exists() {
            if required {
                return Err(VaultIssuerError::Config(format!(
                    "Config file '{}' does not exist",
                    path.display()
                )));
            }
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: self.retry_base,
            max: self.retry_max,
        }
    }

    fn expand_paths(&mut self) {
        for path in [
            &mut self.inventory,
            &mut self.requests_dir,
            &mut self.output_dir,
        ] {
            let expanded = VaultIssuerPaths::expand_home(&path.to_string_lossy());
            *path = expanded;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(VaultIssuerError::Config(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.sign_timeout.is_zero() {
            return Err(VaultIssuerError::Config(
                "sign_timeout must be positive".to_string(),
            ));
        }
        if self.retry_base > self.retry_max {
            return Err(VaultIssuerError::Config(
                "retry_base must not exceed retry_max".to_string(),
            ));
        }
        if self.retry_max > MAX_RETRY_DELAY {
            return Err(VaultIssuerError::Config(format!(
                "retry_max must not exceed {}s",
                MAX_RETRY_DELAY.as_secs()
            )));
        }
        Ok(())
    }
}
