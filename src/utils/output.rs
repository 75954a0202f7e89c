use crate::controller::RequestPhase;
use crate::request::{IssueResult, ObjectKey};
use crate::utils::errors::{Result, VaultIssuerError};
use crate::utils::paths::VaultIssuerPaths;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

pub const CERTIFICATE_FILE: &str = "tls.crt";
pub const CA_FILE: &str = "ca.crt";

/// Output format configuration
#[derive(Clone, Debug)]
pub struct OutputFormat {
    pub raw: bool,
}

impl OutputFormat {
    pub fn new(raw: bool) -> Self {
        Self { raw }
    }

    /// Print tabular data - either raw (tab-separated) or formatted (column-aligned)
    pub fn print_table<T>(&self, data: &[Vec<T>])
    where
        T: Display + AsRef<str>,
    {
        for line in self.format_table(data) {
            println!("{line}");
        }
    }

    /// Print key-value pairs
    pub fn print_key_value<K, V>(&self, pairs: &[(K, V)])
    where
        K: Display + AsRef<str>,
        V: Display + AsRef<str>,
    {
        let data: Vec<Vec<String>> = pairs
            .iter()
            .map(|(k, v)| vec![k.to_string(), v.to_string()])
            .collect();

        self.print_table(&data);
    }

    fn format_table<T>(&self, data: &[Vec<T>]) -> Vec<String>
    where
        T: Display + AsRef<str>,
    {
        if self.raw {
            return data
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| cell.as_ref())
                        .collect::<Vec<_>>()
                        .join("\t")
                })
                .collect();
        }

        // Column-aligned like `column -t`
        let num_cols = data.iter().map(Vec::len).max().unwrap_or(0);
        let mut col_widths = vec![0; num_cols];
        for row in data {
            for (i, cell) in row.iter().enumerate() {
                col_widths[i] = col_widths[i].max(cell.as_ref().len());
            }
        }

        data.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        if i == row.len() - 1 {
                            cell.to_string()
                        } else {
                            format!("{:<width$}", cell.as_ref(), width = col_widths[i])
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect()
    }
}

/// Table row describing the recorded phase of a request
pub fn phase_row(key: &ObjectKey, phase: &RequestPhase) -> Vec<String> {
    match phase {
        RequestPhase::Issued => vec![key.to_string(), "Issued".to_string(), String::new()],
        RequestPhase::Pending(report) => vec![
            key.to_string(),
            format!("Pending ({})", report.reason),
            report.message.clone(),
        ],
        RequestPhase::Failed(report) => vec![
            key.to_string(),
            format!("Failed ({})", report.reason),
            report.message.clone(),
        ],
    }
}

/// Write the certificate bundle and CA to `<base>/<namespace>/<name>/`
pub fn write_issue_result(base: &Path, key: &ObjectKey, issued: &IssueResult) -> Result<PathBuf> {
    key.validate().map_err(|e| VaultIssuerError::InvalidInput(e.to_string()))?;
    let dir = VaultIssuerPaths::issued_cert_dir(base, &key.namespace, &key.name);
    VaultIssuerPaths::ensure_dir_exists(&dir)?;

    fs::write(dir.join(CERTIFICATE_FILE), &issued.certificate)?;
    fs::write(dir.join(CA_FILE), &issued.ca)?;

    tracing::debug!("Wrote certificate for {key} to {}", dir.display());
    Ok(dir)
}
