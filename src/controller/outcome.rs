//! Maps every failure of a signing pass to a reported outcome and a requeue decision.
//!
//! | Error                  | Outcome | Reason            | Requeue |
//! |------------------------|---------|-------------------|---------|
//! | issuer not found       | Pending | `Pending`         | no      |
//! | other issuer lookup    | Pending | `Pending`         | yes     |
//! | CSR cannot be decoded  | Failed  | `ErrorParsingCSR` | no      |
//! | backend construction   | Pending | `ErrorVaultInit`  | no      |
//! | backend rejected sign  | Failed  | `ErrorSigning`    | no      |
//! | deadline or cancel     | Pending | `Pending`         | yes     |

use crate::issuer::LookupError;
use crate::request::{InvalidRequest, IssueResult, IssuerRef};
use crate::vault::{BackendInitError, SigningError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Step of the pass at which an error originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureSite {
    IssuerResolver,
    RequestValidator,
    BackendConstruction,
    BackendSign,
}

impl fmt::Display for FailureSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureSite::IssuerResolver => "issuer lookup",
            FailureSite::RequestValidator => "request validation",
            FailureSite::BackendConstruction => "backend initialisation",
            FailureSite::BackendSign => "signing",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("referenced {kind} not found: {source}")]
    IssuerNotFound { kind: String, source: LookupError },

    #[error("failed to look up referenced {kind}: {source}")]
    IssuerLookup { kind: String, source: LookupError },

    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),

    #[error(transparent)]
    BackendInit(#[from] BackendInitError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("{site} was interrupted before Vault responded")]
    Interrupted { site: FailureSite },
}

impl ProcessError {
    /// Split issuer lookup failures into not-found and everything else
    pub fn lookup(issuer_ref: &IssuerRef, source: LookupError) -> Self {
        let kind = issuer_ref.display_kind().to_string();
        if source.is_not_found() {
            ProcessError::IssuerNotFound { kind, source }
        } else {
            ProcessError::IssuerLookup { kind, source }
        }
    }

    pub fn site(&self) -> FailureSite {
        match self {
            ProcessError::IssuerNotFound { .. } | ProcessError::IssuerLookup { .. } => {
                FailureSite::IssuerResolver
            }
            ProcessError::InvalidRequest(_) => FailureSite::RequestValidator,
            ProcessError::BackendInit(_) => FailureSite::BackendConstruction,
            ProcessError::Signing(_) => FailureSite::BackendSign,
            ProcessError::Interrupted { site } => *site,
        }
    }
}

/// Stable reason identifiers consumed outside this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReasonCode {
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "ErrorParsingCSR")]
    ErrorParsingCsr,
    #[serde(rename = "ErrorVaultInit")]
    ErrorVaultInit,
    #[serde(rename = "ErrorSigning")]
    ErrorSigning,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Pending => "Pending",
            ReasonCode::ErrorParsingCsr => "ErrorParsingCSR",
            ReasonCode::ErrorVaultInit => "ErrorVaultInit",
            ReasonCode::ErrorSigning => "ErrorSigning",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Pending,
    Failed,
}

/// Structured status written for every pass that did not issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub severity: Severity,
    pub reason: ReasonCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The single result of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Issued(IssueResult),
    Pending { reason: ReasonCode, message: String },
    Failed { reason: ReasonCode, message: String },
}

impl Outcome {
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Outcome::Issued(_) => None,
            Outcome::Pending { .. } => Some(Severity::Pending),
            Outcome::Failed { .. } => Some(Severity::Failed),
        }
    }

    /// Status report for Pending and Failed outcomes
    pub fn report(&self) -> Option<StatusReport> {
        let (severity, reason, message) = match self {
            Outcome::Issued(_) => return None,
            Outcome::Pending { reason, message } => (Severity::Pending, reason, message),
            Outcome::Failed { reason, message } => (Severity::Failed, reason, message),
        };

        Some(StatusReport {
            severity,
            reason: *reason,
            message: message.clone(),
            timestamp: Utc::now(),
        })
    }
}

/// Whether the scheduler should retry with backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueDecision {
    Requeue,
    NoRequeue,
}

#[derive(Debug)]
pub struct Classification {
    pub outcome: Outcome,
    pub requeue: RequeueDecision,
    /// The error that ended the pass early, if any
    pub error: Option<ProcessError>,
}

pub fn classify(result: Result<IssueResult, ProcessError>) -> Classification {
    let error = match result {
        Ok(issued) => {
            return Classification {
                outcome: Outcome::Issued(issued),
                requeue: RequeueDecision::NoRequeue,
                error: None,
            }
        }
        Err(error) => error,
    };

    let (outcome, requeue) = classify_error(&error);
    Classification {
        outcome,
        requeue,
        error: Some(error),
    }
}

fn classify_error(error: &ProcessError) -> (Outcome, RequeueDecision) {
    use RequeueDecision::{NoRequeue, Requeue};

    match error {
        // The issuer watch re-triggers the pass once the issuer exists
        ProcessError::IssuerNotFound { kind, .. } => (
            pending(ReasonCode::Pending, format!("Referenced {kind} not found")),
            NoRequeue,
        ),
        ProcessError::IssuerLookup { kind, source } => (
            pending(
                ReasonCode::Pending,
                format!("Failed to look up referenced {kind}: {source}"),
            ),
            Requeue,
        ),
        ProcessError::InvalidRequest(e) => (
            failed(
                ReasonCode::ErrorParsingCsr,
                format!("Failed to decode CSR in spec: {e}"),
            ),
            NoRequeue,
        ),
        // Includes credential reads that may be transient; these are not requeued either
        ProcessError::BackendInit(e) => (
            pending(
                ReasonCode::ErrorVaultInit,
                format!("Failed to initialise vault client for signing: {e}"),
            ),
            NoRequeue,
        ),
        ProcessError::Signing(e) => (
            failed(
                ReasonCode::ErrorSigning,
                format!("Vault failed to sign certificate: {e}"),
            ),
            NoRequeue,
        ),
        ProcessError::Interrupted { site } => (
            pending(
                ReasonCode::Pending,
                format!("Processing was interrupted during {site}, will retry"),
            ),
            Requeue,
        ),
    }
}

fn pending(reason: ReasonCode, message: String) -> Outcome {
    Outcome::Pending { reason, message }
}

fn failed(reason: ReasonCode, message: String) -> Outcome {
    Outcome::Failed { reason, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::VaultError;

    fn issuer_ref(kind: &str) -> IssuerRef {
        IssuerRef {
            name: "vault".to_string(),
            kind: kind.to_string(),
            group: String::new(),
        }
    }

    #[test]
    fn test_not_found_is_pending_without_requeue() {
        let err = ProcessError::lookup(
            &issuer_ref("ClusterIssuer"),
            LookupError::NotFound {
                kind: "ClusterIssuer",
                name: "vault".to_string(),
            },
        );
        let classification = classify(Err(err));

        assert_eq!(
            classification.outcome,
            Outcome::Pending {
                reason: ReasonCode::Pending,
                message: "Referenced ClusterIssuer not found".to_string(),
            }
        );
        assert_eq!(classification.requeue, RequeueDecision::NoRequeue);
    }

    #[test]
    fn test_lookup_failure_requeues() {
        let err = ProcessError::lookup(
            &issuer_ref(""),
            LookupError::Unavailable("cache not synced".to_string()),
        );
        assert_eq!(err.site(), FailureSite::IssuerResolver);

        let classification = classify(Err(err));
        assert_eq!(classification.outcome.severity(), Some(Severity::Pending));
        assert_eq!(classification.requeue, RequeueDecision::Requeue);
        assert!(classification.error.is_some());
    }

    #[test]
    fn test_reason_codes_per_error() {
        let cases = vec![
            (
                ProcessError::from(InvalidRequest("bad".to_string())),
                Severity::Failed,
                ReasonCode::ErrorParsingCsr,
            ),
            (
                ProcessError::from(BackendInitError::NoAuth),
                Severity::Pending,
                ReasonCode::ErrorVaultInit,
            ),
            (
                ProcessError::from(SigningError::from(VaultError::Response("denied".to_string()))),
                Severity::Failed,
                ReasonCode::ErrorSigning,
            ),
        ];

        for (err, severity, reason) in cases {
            let classification = classify(Err(err));
            let report = classification.outcome.report().unwrap();
            assert_eq!(report.severity, severity);
            assert_eq!(report.reason, reason);
            assert_eq!(classification.requeue, RequeueDecision::NoRequeue);
        }
    }

    #[test]
    fn test_interrupted_requeues() {
        let classification = classify(Err(ProcessError::Interrupted {
            site: FailureSite::BackendSign,
        }));
        assert_eq!(classification.requeue, RequeueDecision::Requeue);
        assert_eq!(classification.outcome.severity(), Some(Severity::Pending));
    }

    #[test]
    fn test_success_has_no_report() {
        let classification = classify(Ok(IssueResult {
            certificate: b"cert".to_vec(),
            ca: b"ca".to_vec(),
        }));
        assert!(classification.outcome.report().is_none());
        assert_eq!(classification.requeue, RequeueDecision::NoRequeue);
        assert!(classification.error.is_none());
    }

    #[test]
    fn test_reason_code_strings_are_stable() {
        assert_eq!(ReasonCode::ErrorParsingCsr.to_string(), "ErrorParsingCSR");
        assert_eq!(ReasonCode::ErrorVaultInit.as_str(), "ErrorVaultInit");
        assert_eq!(ReasonCode::ErrorSigning.as_str(), "ErrorSigning");
        assert_eq!(ReasonCode::Pending.as_str(), "Pending");
    }
}
