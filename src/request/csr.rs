use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use x509_parser::prelude::*;

const CSR_PEM_LABEL: &str = "CERTIFICATE REQUEST";

/// Any failure to decode the signing request. There is no partial success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidRequest(pub String);

/// The parts of a PKCS#10 request the signing backend needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsr {
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
}

/// Decode a PEM encoded certificate request and check its structure
pub fn decode_csr(csr_pem: &[u8]) -> Result<ParsedCsr, InvalidRequest> {
    let (_, pem) = parse_x509_pem(csr_pem)
        .map_err(|e| InvalidRequest(format!("error decoding certificate request PEM block: {e}")))?;

    if pem.label != CSR_PEM_LABEL {
        return Err(InvalidRequest(format!(
            "PEM block type must be {CSR_PEM_LABEL:?}, got {:?}",
            pem.label
        )));
    }

    let (_, csr) = X509CertificationRequest::from_der(&pem.contents)
        .map_err(|e| InvalidRequest(format!("error parsing certificate request: {e}")))?;

    let info = &csr.certification_request_info;
    let common_name = info
        .subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut parsed = ParsedCsr {
        common_name,
        ..Default::default()
    };

    if let Some(extensions) = csr.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                collect_alt_names(&mut parsed, &san.general_names)?;
            }
        }
    }

    Ok(parsed)
}

fn collect_alt_names(parsed: &mut ParsedCsr, names: &[GeneralName]) -> Result<(), InvalidRequest> {
    for name in names {
        match name {
            GeneralName::DNSName(dns) => parsed.dns_names.push(dns.to_string()),
            GeneralName::URI(uri) => parsed.uris.push(uri.to_string()),
            GeneralName::IPAddress(ip) => parsed.ip_addresses.push(ip_from_bytes(ip)?),
            _ => {}
        }
    }
    Ok(())
}

fn ip_from_bytes(bytes: &[u8]) -> Result<IpAddr, InvalidRequest> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(octets)));
    }
    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(octets)));
    }
    Err(InvalidRequest(format!(
        "invalid IP address SAN of {} bytes",
        bytes.len()
    )))
}
