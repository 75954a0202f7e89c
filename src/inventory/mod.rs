use crate::issuer::{Issuer, IssuerKind, IssuerLister, LookupError, Secret, SecretLister};
use crate::utils::errors::{Result, VaultIssuerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// On-disk layout of the inventory file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryData {
    #[serde(default)]
    pub issuers: Vec<Issuer>,
    #[serde(default)]
    pub cluster_issuers: Vec<Issuer>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

#[derive(Debug, Default)]
struct InventoryIndex {
    issuers: HashMap<(String, String), Issuer>,
    cluster_issuers: HashMap<String, Issuer>,
    secrets: HashMap<(String, String), Secret>,
}

impl InventoryIndex {
    fn build(data: InventoryData) -> Result<Self> {
        let mut index = InventoryIndex::default();

        for issuer in data.issuers {
            let namespace = issuer.namespace.clone().ok_or_else(|| {
                VaultIssuerError::Inventory(format!("issuer {:?} has no namespace", issuer.name))
            })?;
            index.issuers.insert((namespace, issuer.name.clone()), issuer);
        }

        for issuer in data.cluster_issuers {
            index.cluster_issuers.insert(issuer.name.clone(), issuer);
        }

        for secret in data.secrets {
            index
                .secrets
                .insert((secret.namespace.clone(), secret.name.clone()), secret);
        }

        Ok(index)
    }

    fn len(&self) -> usize {
        self.issuers.len() + self.cluster_issuers.len()
    }
}

/// Issuers, cluster issuers and secrets read from a YAML file.
///
/// Lookups before the first successful load fail as unavailable, never as not found.
/// A failed reload keeps the previously loaded state.
#[derive(Debug)]
pub struct FileInventory {
    path: PathBuf,
    index: RwLock<Option<InventoryIndex>>,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: RwLock::new(None),
        }
    }

    /// Build an inventory from in-memory data, e.g. for tests or embedding
    pub fn from_data(data: InventoryData) -> Result<Self> {
        Ok(Self {
            path: PathBuf::new(),
            index: RwLock::new(Some(InventoryIndex::build(data)?)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the inventory file, returning the number of issuers loaded
    pub fn reload(&self) -> Result<usize> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            VaultIssuerError::Inventory(format!(
                "Failed to read inventory '{}': {e}",
                self.path.display()
            ))
        })?;
        let data: InventoryData = serde_yaml::from_str(&content)?;
        let index = InventoryIndex::build(data)?;
        let count = index.len();

        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
        tracing::debug!("Loaded {count} issuers from {}", self.path.display());
        Ok(count)
    }

    fn with_index<T>(
        &self,
        lookup: impl FnOnce(&InventoryIndex) -> std::result::Result<T, LookupError>,
    ) -> std::result::Result<T, LookupError> {
        let guard = self.index.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(index) => lookup(index),
            None => Err(LookupError::Unavailable(format!(
                "inventory '{}' has not been loaded",
                self.path.display()
            ))),
        }
    }
}

impl IssuerLister for FileInventory {
    fn get_issuer(&self, namespace: &str, name: &str) -> std::result::Result<Issuer, LookupError> {
        self.with_index(|index| {
            index
                .issuers
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| LookupError::NotFound {
                    kind: IssuerKind::NAMESPACED,
                    name: name.to_string(),
                })
        })
    }

    fn get_cluster_issuer(&self, name: &str) -> std::result::Result<Issuer, LookupError> {
        self.with_index(|index| {
            index
                .cluster_issuers
                .get(name)
                .cloned()
                .ok_or_else(|| LookupError::NotFound {
                    kind: IssuerKind::CLUSTER_SCOPED,
                    name: name.to_string(),
                })
        })
    }
}

impl SecretLister for FileInventory {
    fn get_secret(&self, namespace: &str, name: &str) -> std::result::Result<Secret, LookupError> {
        self.with_index(|index| {
            index
                .secrets
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| LookupError::NotFound {
                    kind: "Secret",
                    name: name.to_string(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
issuers:
  - name: vault
    namespace: team-a
    spec:
      vault:
        server: https://vault.example.com:8200
        path: pki_int/sign/team-a
        auth:
          token_secret_ref:
            name: vault-token
            key: token
cluster_issuers:
  - name: vault-cluster
    spec:
      vault:
        server: https://vault.example.com:8200
        path: pki_int/sign/cluster
        namespace: platform
        auth:
          app_role:
            path: approle
            role_id: cluster-role
            secret_ref:
              name: vault-approle
              key: secret_id
secrets:
  - name: vault-token
    namespace: team-a
    data:
      token: cy50b2tlbg==
"#;

    #[test]
    fn test_unloaded_inventory_is_unavailable() {
        let inventory = FileInventory::new("/nonexistent/inventory.yaml");
        let err = inventory.get_issuer("team-a", "vault").unwrap_err();
        assert!(matches!(err, LookupError::Unavailable(_)));
        assert!(inventory.reload().is_err());
        assert!(matches!(
            inventory.get_secret("team-a", "vault-token"),
            Err(LookupError::Unavailable(_))
        ));
    }

    #[test]
    fn test_reload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yaml");
        fs::write(&path, INVENTORY).unwrap();

        let inventory = FileInventory::new(&path);
        assert_eq!(inventory.reload().unwrap(), 2);

        let issuer = inventory.get_issuer("team-a", "vault").unwrap();
        let vault = issuer.spec.vault.unwrap();
        assert_eq!(vault.path, "pki_int/sign/team-a");

        let cluster = inventory.get_cluster_issuer("vault-cluster").unwrap();
        let cluster_vault = cluster.spec.vault.unwrap();
        assert_eq!(cluster_vault.namespace.as_deref(), Some("platform"));
        assert_eq!(cluster_vault.auth.app_role.unwrap().role_id, "cluster-role");

        assert!(inventory.get_issuer("team-b", "vault").unwrap_err().is_not_found());
        assert!(inventory.get_cluster_issuer("vault").unwrap_err().is_not_found());

        let secret = inventory.get_secret("team-a", "vault-token").unwrap();
        assert_eq!(secret.value("token").unwrap().unwrap(), b"s.token");
    }

    #[test]
    fn test_failed_reload_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yaml");
        fs::write(&path, INVENTORY).unwrap();

        let inventory = FileInventory::new(&path);
        inventory.reload().unwrap();

        fs::write(&path, "issuers: [not: valid").unwrap();
        assert!(inventory.reload().is_err());
        assert!(inventory.get_issuer("team-a", "vault").is_ok());
    }

    #[test]
    fn test_namespaced_issuer_requires_namespace() {
        let data: InventoryData =
            serde_yaml::from_str("issuers:\n  - name: vault\n").unwrap();
        assert!(FileInventory::from_data(data).is_err());
    }
}
