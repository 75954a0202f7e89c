use crate::utils::errors::{Result, VaultIssuerError};
use std::fs;
use std::path::{Path, PathBuf};

pub struct VaultIssuerPaths;
const PROGRAM_NAME: &str = "vault-issuer";

impl VaultIssuerPaths {
    /// Get the base data directory: ~/.local/share/vault-issuer/
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join(PROGRAM_NAME))
            .ok_or_else(|| {
                VaultIssuerError::Config("Cannot determine local data directory".to_string())
            })
    }

    /// Get the config directory: ~/.config/vault-issuer/
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(PROGRAM_NAME))
            .ok_or_else(|| {
                VaultIssuerError::Config("Cannot determine config directory".to_string())
            })
    }

    /// Get the default config file: ~/.config/vault-issuer/config.yaml
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Default inventory of issuers and secrets: ~/.config/vault-issuer/inventory.yaml
    pub fn inventory_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("inventory.yaml"))
    }

    /// Default directory scanned for request files: ~/.local/share/vault-issuer/requests/
    pub fn requests_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("requests"))
    }

    /// Default output directory for issued certificates: ~/.local/share/vault-issuer/issued/
    pub fn issued_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("issued"))
    }

    /// Directory holding the certificate issued for one request
    pub fn issued_cert_dir(base: &Path, namespace: &str, name: &str) -> PathBuf {
        base.join(namespace).join(name)
    }

    /// Expand a leading `~/` to the home directory
    pub fn expand_home(path: &str) -> PathBuf {
        match (path.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(path),
        }
    }

    /// Ensure a directory exists with proper permissions
    pub fn ensure_dir_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;

            // Owner-only permissions (700)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(path)?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(path, perms)?;
            }
        }
        Ok(())
    }
}
