use crate::issuer::{ResolvedIssuer, SecretLister, VaultIssuerSpec};
use crate::vault::{
    auth, create_http_client, BackendFactory, BackendInitError, SigningBackend, VaultError,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
const VAULT_NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// HTTP client bound to one Vault server, optionally authenticated
pub struct VaultClient {
    client: Client,
    vault_addr: String,
    vault_namespace: Option<String>,
    token: Option<String>,
    sign_path: String,
}

impl VaultClient {
    /// Build an unauthenticated client from the issuer's Vault settings
    pub fn from_spec(spec: &VaultIssuerSpec) -> Result<Self, BackendInitError> {
        let ca_bundle = spec
            .ca_bundle
            .as_deref()
            .filter(|bundle| !bundle.trim().is_empty())
            .map(|bundle| general_purpose::STANDARD.decode(bundle.trim()))
            .transpose()
            .map_err(|e| BackendInitError::CaBundle(format!("invalid base64: {e}")))?;

        Ok(Self {
            client: create_http_client(ca_bundle.as_deref())?,
            vault_addr: spec.server.trim_end_matches('/').to_string(),
            vault_namespace: spec.namespace.clone().filter(|ns| !ns.is_empty()),
            token: None,
            sign_path: spec.path.trim_matches('/').to_string(),
        })
    }

    /// Get vault address
    pub fn vault_addr(&self) -> &str {
        &self.vault_addr
    }

    /// Signing endpoint path below /v1
    pub fn sign_path(&self) -> &str {
        &self.sign_path
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    /// Generic POST request to Vault API
    pub async fn post(&self, path: &str, data: &Value) -> Result<Value, VaultError> {
        let url = format!("{}/v1/{}", self.vault_addr, path);
        tracing::debug!("Making POST request to: {url}");

        let response = self.decorate(self.client.post(&url)).json(data).send().await?;

        self.handle_response(response).await
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(token) = &self.token {
            request = request.header(VAULT_TOKEN_HEADER, token);
        }
        if let Some(namespace) = &self.vault_namespace {
            request = request.header(VAULT_NAMESPACE_HEADER, namespace);
        }
        request
    }

    /// Handle HTTP response from Vault
    async fn handle_response(&self, response: Response) -> Result<Value, VaultError> {
        let status = response.status();
        tracing::debug!("Response status: {status}");

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(VaultError::Status { status, body })
    }
}

/// Builds authenticated [`VaultClient`]s for Vault issuers
#[derive(Debug, Default, Clone, Copy)]
pub struct VaultBackendFactory;

#[async_trait]
impl BackendFactory for VaultBackendFactory {
    async fn new_client(
        &self,
        namespace: &str,
        secrets: &dyn SecretLister,
        issuer: &ResolvedIssuer,
    ) -> Result<Box<dyn SigningBackend>, BackendInitError> {
        let spec = issuer
            .issuer
            .spec
            .vault
            .as_ref()
            .ok_or_else(|| BackendInitError::NotVault(issuer.issuer.name.clone()))?;

        let client = VaultClient::from_spec(spec)?;
        let token = auth::resolve_token(&client, secrets, namespace, &spec.auth).await?;

        tracing::debug!(
            vault_addr = client.vault_addr(),
            path = client.sign_path(),
            "Initialised Vault client"
        );

        Ok(Box::new(client.with_token(token)))
    }
}
