use crate::controller::outcome::{Outcome, Severity, StatusReport};
use crate::request::{ObjectKey, SigningRequest};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Status and event sink, called exactly once per pass
pub trait Reporter: Send + Sync {
    fn record(&self, request: &SigningRequest, outcome: &Outcome);
}

/// Emits every outcome as a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn record(&self, request: &SigningRequest, outcome: &Outcome) {
        let key = request.key();
        let issuer = request.issuer_ref.name.as_str();

        match outcome {
            Outcome::Issued(_) => {
                tracing::info!(request = %key, issuer, "certificate issued");
            }
            Outcome::Pending { reason, message } => {
                tracing::info!(request = %key, issuer, reason = %reason, "{message}");
            }
            Outcome::Failed { reason, message } => {
                tracing::error!(request = %key, issuer, reason = %reason, "{message}");
            }
        }
    }
}

/// Last recorded state of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPhase {
    Issued,
    Pending(StatusReport),
    Failed(StatusReport),
}

impl RequestPhase {
    /// Issued and Failed requests are not picked up again by a resync
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestPhase::Pending(_))
    }
}

#[derive(Debug, Clone)]
struct Recorded {
    phase: RequestPhase,
    /// Fingerprint of the request content the phase was recorded for
    fingerprint: String,
}

/// Keeps the latest status per request and forwards every outcome to the log
#[derive(Debug, Default)]
pub struct StatusBoard {
    phases: Mutex<HashMap<ObjectKey, Recorded>>,
    log: TracingReporter,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, key: &ObjectKey) -> Option<RequestPhase> {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|recorded| recorded.phase.clone())
    }

    /// Terminal only while the request content matches what the phase was recorded for
    pub fn is_terminal(&self, request: &SigningRequest) -> bool {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.key())
            .is_some_and(|recorded| {
                recorded.phase.is_terminal() && recorded.fingerprint == request.fingerprint()
            })
    }

    /// Snapshot of all phases, sorted by key
    pub fn snapshot(&self) -> Vec<(ObjectKey, RequestPhase)> {
        let phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = phases
            .iter()
            .map(|(key, recorded)| (key.clone(), recorded.phase.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl Reporter for StatusBoard {
    fn record(&self, request: &SigningRequest, outcome: &Outcome) {
        self.log.record(request, outcome);

        let phase = match (outcome.report(), outcome.severity()) {
            (Some(report), Some(Severity::Failed)) => RequestPhase::Failed(report),
            (Some(report), _) => RequestPhase::Pending(report),
            (None, _) => RequestPhase::Issued,
        };

        let recorded = Recorded {
            phase,
            fingerprint: request.fingerprint(),
        };
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.key(), recorded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::outcome::ReasonCode;
    use crate::request::{IssuerRef, DEFAULT_DURATION};

    fn request(name: &str) -> SigningRequest {
        SigningRequest {
            namespace: "default".to_string(),
            name: name.to_string(),
            issuer_ref: IssuerRef {
                name: "vault".to_string(),
                ..Default::default()
            },
            csr: Vec::new(),
            duration: DEFAULT_DURATION,
        }
    }

    #[test]
    fn test_status_board_tracks_latest_phase() {
        let board = StatusBoard::new();
        let web = request("web");

        board.record(
            &web,
            &Outcome::Pending {
                reason: ReasonCode::Pending,
                message: "Referenced Issuer not found".to_string(),
            },
        );
        assert!(!board.is_terminal(&web));
        assert!(matches!(board.phase(&web.key()), Some(RequestPhase::Pending(_))));

        board.record(
            &web,
            &Outcome::Failed {
                reason: ReasonCode::ErrorSigning,
                message: "denied".to_string(),
            },
        );
        assert!(board.is_terminal(&web));

        match board.phase(&web.key()) {
            Some(RequestPhase::Failed(report)) => {
                assert_eq!(report.severity, Severity::Failed);
                assert_eq!(report.reason, ReasonCode::ErrorSigning);
                assert_eq!(report.message, "denied");
            }
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[test]
    fn test_unknown_request_is_not_terminal() {
        let board = StatusBoard::new();
        assert!(!board.is_terminal(&request("missing")));
        assert!(board.snapshot().is_empty());
    }

    #[test]
    fn test_changed_request_is_no_longer_terminal() {
        let board = StatusBoard::new();
        let web = request("web");
        board.record(
            &web,
            &Outcome::Failed {
                reason: ReasonCode::ErrorParsingCsr,
                message: "Failed to decode CSR in spec".to_string(),
            },
        );
        assert!(board.is_terminal(&web));

        let mut new_csr = web.clone();
        new_csr.csr = b"-----BEGIN CERTIFICATE REQUEST-----".to_vec();
        assert!(!board.is_terminal(&new_csr));

        let mut new_duration = web.clone();
        new_duration.duration = std::time::Duration::from_secs(3600);
        assert!(!board.is_terminal(&new_duration));
    }
}
