/// A single PEM-encoded certificate, normalised to end with one newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemCertificate {
    pem_data: String,
}

/// An ordered chain of PEM certificates, leaf first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PemCertificateChain {
    certificates: Vec<PemCertificate>,
}

impl PemCertificate {
    /// Create a new PEM certificate from PEM data
    pub fn new(pem_data: &str) -> Self {
        Self {
            pem_data: normalize_pem(pem_data),
        }
    }

    /// Get the raw PEM data
    pub fn pem_data(&self) -> &str {
        &self.pem_data
    }

    pub fn is_empty(&self) -> bool {
        self.pem_data.is_empty()
    }
}

impl PemCertificateChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a certificate unless it is empty or already present
    pub fn push_unique(&mut self, cert: PemCertificate) {
        if cert.is_empty() || self.certificates.contains(&cert) {
            return;
        }
        self.certificates.push(cert);
    }

    /// Get all certificates in the chain
    pub fn certificates(&self) -> &[PemCertificate] {
        &self.certificates
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Get raw PEM data for all certificates concatenated
    pub fn pem_data(&self) -> String {
        self.certificates
            .iter()
            .map(|cert| cert.pem_data())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Normalize PEM data to ensure consistent formatting
fn normalize_pem(pem_data: &str) -> String {
    let trimmed = pem_data.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    format!("{trimmed}\n")
}

/// Parse multiple certificates from a PEM string
pub fn parse_certificate_chain(pem_data: &str) -> Vec<PemCertificate> {
    let mut certificates = Vec::new();
    let mut current_cert = String::new();
    let mut in_cert = false;

    for line in pem_data.lines() {
        let line = line.trim();
        if line.starts_with("-----BEGIN CERTIFICATE-----") {
            in_cert = true;
            current_cert.clear();
            current_cert.push_str(line);
            current_cert.push('\n');
        } else if line.starts_with("-----END CERTIFICATE-----") && in_cert {
            current_cert.push_str(line);
            current_cert.push('\n');
            certificates.push(PemCertificate::new(&current_cert));
            current_cert.clear();
            in_cert = false;
        } else if in_cert {
            current_cert.push_str(line);
            current_cert.push('\n');
        }
    }

    certificates
}
