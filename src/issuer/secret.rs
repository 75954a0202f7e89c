use crate::issuer::resolver::LookupError;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selects one key of a secret in the credential namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

/// A secret object; values are base64 encoded as in Kubernetes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Decoded value for `key`, `None` when the key is absent
    pub fn value(&self, key: &str) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.data
            .get(key)
            .map(|encoded| general_purpose::STANDARD.decode(encoded.trim()))
    }
}

/// Read access to secrets, owned and synchronised by the caller
pub trait SecretLister: Send + Sync {
    fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, LookupError>;
}
