pub mod resolver;
pub mod secret;

pub use resolver::{IssuerLister, IssuerResolver, LookupError, ResolvedIssuer};
pub use secret::{Secret, SecretKeySelector, SecretLister};

use serde::{Deserialize, Serialize};

/// Scope of an issuer, decided by the `kind` of the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssuerKind {
    Namespaced,
    ClusterScoped,
}

impl IssuerKind {
    pub const NAMESPACED: &'static str = "Issuer";
    pub const CLUSTER_SCOPED: &'static str = "ClusterIssuer";

    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerKind::Namespaced => Self::NAMESPACED,
            IssuerKind::ClusterScoped => Self::CLUSTER_SCOPED,
        }
    }
}

/// An issuer or cluster issuer object as served by the lister layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub name: String,
    /// Unset for cluster issuers
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub spec: IssuerSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerSpec {
    #[serde(default)]
    pub vault: Option<VaultIssuerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultIssuerSpec {
    /// Vault server base URL, e.g. https://vault.example.com:8200
    pub server: String,
    /// Signing endpoint below /v1, e.g. pki_int/sign/example-dot-com
    pub path: String,
    /// Base64 encoded PEM bundle used to verify the Vault TLS endpoint
    #[serde(default)]
    pub ca_bundle: Option<String>,
    /// Vault Enterprise namespace sent as X-Vault-Namespace
    #[serde(default)]
    pub namespace: Option<String>,
    pub auth: VaultAuthSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAuthSpec {
    #[serde(default)]
    pub token_secret_ref: Option<SecretKeySelector>,
    #[serde(default)]
    pub app_role: Option<VaultAppRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAppRole {
    /// Mount path of the AppRole auth method, e.g. "approle"
    pub path: String,
    pub role_id: String,
    pub secret_ref: SecretKeySelector,
}
