pub mod auth;
pub mod client;
pub mod sign;

pub use client::{VaultBackendFactory, VaultClient};

use crate::issuer::{LookupError, ResolvedIssuer, SecretLister};
use crate::request::IssueResult;
use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Errors talking to the Vault HTTP API
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("request to Vault failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vault responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response from Vault: {0}")]
    Response(String),
}

/// Failure to build a backend client for an issuer
#[derive(Error, Debug)]
pub enum BackendInitError {
    #[error("issuer {0:?} has no Vault configuration")]
    NotVault(String),

    #[error("tokenSecretRef or appRole must be set")]
    NoAuth,

    #[error("error reading secret {namespace}/{name}: {source}")]
    Secret {
        namespace: String,
        name: String,
        source: LookupError,
    },

    #[error("no usable value for key {key:?} in secret {namespace}/{name}")]
    SecretKey {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("cannot decode key {key:?} in secret {namespace}/{name}: {reason}")]
    SecretValue {
        namespace: String,
        name: String,
        key: String,
        reason: String,
    },

    #[error("error loading Vault CA bundle: {0}")]
    CaBundle(String),

    #[error("error initializing HTTP client: {0}")]
    HttpClient(reqwest::Error),

    #[error("error logging in to Vault: {0}")]
    Login(VaultError),
}

/// The backend could not sign this exact request
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("failed to sign certificate by vault: {0}")]
    Vault(#[from] VaultError),

    #[error("cannot build signing parameters: {0}")]
    Request(String),

    #[error("no certificate in signing response")]
    MissingCertificate,
}

/// A per-request client able to sign one CSR
#[async_trait]
pub trait SigningBackend: Send + Sync {
    async fn sign(&self, csr_pem: &[u8], duration: Duration) -> Result<IssueResult, SigningError>;
}

/// Builds a [`SigningBackend`] from an issuer and the credentials it references
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn new_client(
        &self,
        namespace: &str,
        secrets: &dyn SecretLister,
        issuer: &ResolvedIssuer,
    ) -> Result<Box<dyn SigningBackend>, BackendInitError>;
}

/// Create a standardized HTTP client, trusting `ca_bundle` in addition to the system roots
pub fn create_http_client(ca_bundle: Option<&[u8]>) -> Result<Client, BackendInitError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(30))
        .use_rustls_tls();

    if let Some(pem) = ca_bundle {
        let certificates = Certificate::from_pem_bundle(pem)
            .map_err(|e| BackendInitError::CaBundle(e.to_string()))?;
        if certificates.is_empty() {
            return Err(BackendInitError::CaBundle(
                "no certificates found in bundle".to_string(),
            ));
        }
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }

    builder.build().map_err(BackendInitError::HttpClient)
}
