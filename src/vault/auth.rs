use crate::issuer::{SecretKeySelector, SecretLister, VaultAppRole, VaultAuthSpec};
use crate::vault::{BackendInitError, VaultClient, VaultError};
use serde_json::json;

/// Obtain a Vault token for the issuer, reading credentials from `namespace`
pub async fn resolve_token(
    client: &VaultClient,
    secrets: &dyn SecretLister,
    namespace: &str,
    auth: &VaultAuthSpec,
) -> Result<String, BackendInitError> {
    if let Some(token_ref) = &auth.token_secret_ref {
        tracing::trace!("Using token from secret {namespace}/{}", token_ref.name);
        return read_secret_value(secrets, namespace, token_ref);
    }

    if let Some(app_role) = &auth.app_role {
        let secret_id = read_secret_value(secrets, namespace, &app_role.secret_ref)?;
        return login_app_role(client, app_role, &secret_id)
            .await
            .map_err(BackendInitError::Login);
    }

    Err(BackendInitError::NoAuth)
}

/// Read one key of a secret as trimmed UTF-8, rejecting empty values
fn read_secret_value(
    secrets: &dyn SecretLister,
    namespace: &str,
    selector: &SecretKeySelector,
) -> Result<String, BackendInitError> {
    let secret = secrets
        .get_secret(namespace, &selector.name)
        .map_err(|source| BackendInitError::Secret {
            namespace: namespace.to_string(),
            name: selector.name.clone(),
            source,
        })?;

    let missing_key = || BackendInitError::SecretKey {
        namespace: namespace.to_string(),
        name: selector.name.clone(),
        key: selector.key.clone(),
    };

    let undecodable = |reason: String| BackendInitError::SecretValue {
        namespace: namespace.to_string(),
        name: selector.name.clone(),
        key: selector.key.clone(),
        reason,
    };

    let bytes = secret
        .value(&selector.key)
        .ok_or_else(missing_key)?
        .map_err(|e| undecodable(e.to_string()))?;
    let value = String::from_utf8(bytes).map_err(|e| undecodable(e.to_string()))?;
    let value = value.trim();

    if value.is_empty() {
        return Err(missing_key());
    }

    Ok(value.to_string())
}

/// Authenticate with the AppRole auth method
async fn login_app_role(
    client: &VaultClient,
    app_role: &VaultAppRole,
    secret_id: &str,
) -> Result<String, VaultError> {
    let payload = json!({
        "role_id": app_role.role_id,
        "secret_id": secret_id,
    });

    let path = format!("auth/{}/login", app_role.path.trim_matches('/'));
    let auth_response = client.post(&path, &payload).await?;

    let token = auth_response["auth"]["client_token"]
        .as_str()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| VaultError::Response("no client_token in login response".to_string()))?;

    tracing::info!("Successfully authenticated with AppRole {}", app_role.role_id);
    Ok(token.to_string())
}
