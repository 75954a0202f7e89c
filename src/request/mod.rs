pub mod csr;

pub use csr::{decode_csr, InvalidRequest, ParsedCsr};

use crate::issuer::IssuerKind;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// cert-manager's default certificate lifetime (2160h)
pub const DEFAULT_DURATION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Namespace-scoped identity of a request; also the work queue key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// A namespace or name that is not a DNS-1123 subdomain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field} {value:?}: {reason}")]
pub struct InvalidName {
    pub field: &'static str,
    pub value: String,
    pub reason: &'static str,
}

const MAX_NAME_LENGTH: usize = 253;

fn check_name(field: &'static str, value: &str) -> Result<(), InvalidName> {
    let invalid = |reason| {
        Err(InvalidName {
            field,
            value: value.to_string(),
            reason,
        })
    };

    if value.is_empty() {
        return invalid("must not be empty");
    }
    if value.len() > MAX_NAME_LENGTH {
        return invalid("must be at most 253 characters");
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return invalid("must consist of lower case alphanumerics, '-' or '.'");
    }
    // Rejects "", ".", ".." and leading or trailing dashes in every label
    let labels_ok = value.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
            }
            _ => false,
        }
    });
    if !labels_ok {
        return invalid("must start and end with an alphanumeric character in every label");
    }
    Ok(())
}

impl ObjectKey {
    /// Both parts must be usable as single path segments below the output directory
    pub fn validate(&self) -> Result<(), InvalidName> {
        check_name("namespace", &self.namespace)?;
        check_name("name", &self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference from a request to the issuer that should sign it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRef {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub group: String,
}

impl IssuerRef {
    /// Parse the free-form kind into its scope. Empty means a namespaced Issuer.
    pub fn issuer_kind(&self) -> Option<IssuerKind> {
        match self.kind.as_str() {
            "" | IssuerKind::NAMESPACED => Some(IssuerKind::Namespaced),
            IssuerKind::CLUSTER_SCOPED => Some(IssuerKind::ClusterScoped),
            _ => None,
        }
    }

    /// Human readable kind used in status messages
    pub fn display_kind(&self) -> &str {
        match self.issuer_kind() {
            Some(kind) => kind.as_str(),
            None => &self.kind,
        }
    }
}

/// One request to issue a certificate, read-only for the duration of a pass
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub namespace: String,
    pub name: String,
    pub issuer_ref: IssuerRef,
    /// PEM encoded PKCS#10 request
    #[serde(with = "pem_text")]
    pub csr: Vec<u8>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_duration")]
    pub duration: Duration,
}

fn default_duration() -> Duration {
    DEFAULT_DURATION
}

impl SigningRequest {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// SHA-256 over everything a pass depends on: issuer reference, CSR and duration
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.issuer_ref.name.as_bytes(),
            self.issuer_ref.kind.as_bytes(),
            self.issuer_ref.group.as_bytes(),
            self.csr.as_slice(),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        hasher.update(self.duration.as_secs().to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Load a request from its YAML representation
    pub fn from_yaml(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }
}

/// Certificate material produced by a successful pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueResult {
    /// Leaf certificate followed by any intermediates, PEM
    pub certificate: Vec<u8>,
    /// Issuing CA, PEM
    pub ca: Vec<u8>,
}

/// CSRs are stored as PEM text in YAML rather than a byte sequence
mod pem_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}
