use crate::request::{decode_csr, IssueResult, ParsedCsr};
use crate::utils::pem::{parse_certificate_chain, PemCertificateChain};
use crate::vault::{SigningBackend, SigningError, VaultClient, VaultError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SignResponse {
    data: SignResponseData,
}

#[derive(Debug, Deserialize)]
struct SignResponseData {
    #[serde(default)]
    certificate: String,
    #[serde(default)]
    issuing_ca: String,
    #[serde(default)]
    ca_chain: Vec<String>,
}

/// Parameters for the PKI sign endpoint
pub fn sign_parameters(csr_pem: &[u8], csr: &ParsedCsr, duration: Duration) -> Value {
    let ip_sans = csr
        .ip_addresses
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>();

    json!({
        "common_name": csr.common_name,
        "alt_names": csr.dns_names.join(","),
        "ip_sans": ip_sans.join(","),
        "uri_sans": csr.uris.join(","),
        "ttl": format!("{}s", duration.as_secs()),
        "csr": String::from_utf8_lossy(csr_pem),
        "exclude_cn_from_sans": true,
    })
}

/// Assemble the certificate bundle and CA from a sign response.
/// The bundle is the leaf followed by every chain entry other than the issuing CA.
fn issue_result(data: SignResponseData) -> Result<IssueResult, SigningError> {
    let mut certificates = parse_certificate_chain(&data.certificate).into_iter();
    let leaf = certificates.next().ok_or(SigningError::MissingCertificate)?;

    // Some Vault versions return intermediates inside the certificate field
    let chain_entries = certificates
        .chain(data.ca_chain.iter().flat_map(|pem| parse_certificate_chain(pem)))
        .collect::<Vec<_>>();

    let issuing_ca = parse_certificate_chain(&data.issuing_ca)
        .into_iter()
        .next()
        .or_else(|| chain_entries.last().cloned());

    let mut bundle = PemCertificateChain::new();
    bundle.push_unique(leaf);
    for cert in chain_entries {
        if Some(&cert) != issuing_ca.as_ref() {
            bundle.push_unique(cert);
        }
    }

    Ok(IssueResult {
        certificate: bundle.pem_data().into_bytes(),
        ca: issuing_ca
            .map(|ca| ca.pem_data().as_bytes().to_vec())
            .unwrap_or_default(),
    })
}

#[async_trait]
impl SigningBackend for VaultClient {
    async fn sign(&self, csr_pem: &[u8], duration: Duration) -> Result<IssueResult, SigningError> {
        let csr = decode_csr(csr_pem).map_err(|e| SigningError::Request(e.to_string()))?;
        let parameters = sign_parameters(csr_pem, &csr, duration);

        tracing::debug!(
            common_name = %csr.common_name,
            ttl = %parameters["ttl"],
            "Requesting certificate from Vault"
        );

        let response = self.post(self.sign_path(), &parameters).await?;
        let response: SignResponse = serde_json::from_value(response)
            .map_err(|e| VaultError::Response(format!("failed to decode sign response: {e}")))?;

        issue_result(response.data)
    }
}
