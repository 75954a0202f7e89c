pub mod outcome;
pub mod reporter;

pub use outcome::{
    classify, Classification, FailureSite, Outcome, ProcessError, ReasonCode, RequeueDecision,
    Severity, StatusReport,
};
pub use reporter::{Reporter, RequestPhase, StatusBoard, TracingReporter};

use crate::issuer::{IssuerKind, IssuerLister, IssuerResolver, SecretLister};
use crate::request::{decode_csr, IssueResult, SigningRequest};
use crate::vault::BackendFactory;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Namespace holding credentials of cluster scoped issuers
pub const DEFAULT_CLUSTER_RESOURCE_NAMESPACE: &str = "cert-manager";

/// Returned to the scheduler only when the pass should be retried with backoff
#[derive(Error, Debug)]
#[error(transparent)]
pub struct RequeueError(#[from] pub ProcessError);

/// Signs certificate requests against Vault issuers.
///
/// One call to [`process_signing_request`](Self::process_signing_request) is one pass:
/// resolve the issuer, decode the CSR, build a backend client and sign. The first
/// failing step ends the pass. Every pass records exactly one [`Outcome`].
pub struct CertificateRequestSigner {
    resolver: IssuerResolver,
    secrets: Arc<dyn SecretLister>,
    backend: Arc<dyn BackendFactory>,
    reporter: Arc<dyn Reporter>,
    cluster_resource_namespace: String,
}

impl CertificateRequestSigner {
    pub fn new(
        issuers: Arc<dyn IssuerLister>,
        secrets: Arc<dyn SecretLister>,
        backend: Arc<dyn BackendFactory>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            resolver: IssuerResolver::new(issuers),
            secrets,
            backend,
            reporter,
            cluster_resource_namespace: DEFAULT_CLUSTER_RESOURCE_NAMESPACE.to_string(),
        }
    }

    pub fn with_cluster_resource_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cluster_resource_namespace = namespace.into();
        self
    }

    /// Process one request.
    ///
    /// Returns `Ok(Some(_))` when a certificate was issued, `Ok(None)` when the outcome
    /// was recorded and nothing further is needed from the scheduler, and `Err(_)` when
    /// the scheduler should requeue the request.
    #[tracing::instrument(skip_all, fields(request = %request.key()))]
    pub async fn process_signing_request(
        &self,
        cancel: &CancellationToken,
        request: &SigningRequest,
    ) -> Result<Option<IssueResult>, RequeueError> {
        let classification = classify(self.sign(cancel, request).await);

        self.reporter.record(request, &classification.outcome);

        match (classification.requeue, classification.error) {
            (RequeueDecision::Requeue, Some(error)) => Err(RequeueError(error)),
            _ => match classification.outcome {
                Outcome::Issued(issued) => Ok(Some(issued)),
                _ => Ok(None),
            },
        }
    }

    async fn sign(
        &self,
        cancel: &CancellationToken,
        request: &SigningRequest,
    ) -> Result<IssueResult, ProcessError> {
        let resolved = self
            .resolver
            .resolve(&request.issuer_ref, &request.namespace)
            .map_err(|e| ProcessError::lookup(&request.issuer_ref, e))?;

        decode_csr(&request.csr)?;

        // Cluster issuers read credentials from the cluster resource namespace, not the request's
        let namespace = match resolved.kind {
            IssuerKind::Namespaced => request.namespace.as_str(),
            IssuerKind::ClusterScoped => self.cluster_resource_namespace.as_str(),
        };

        // Backend futures are polled first so a result that is ready wins over cancellation
        let secrets = self.secrets.as_ref();
        let client = tokio::select! {
            biased;
            client = self.backend.new_client(namespace, secrets, &resolved) => client?,
            _ = cancel.cancelled() => {
                return Err(ProcessError::Interrupted {
                    site: FailureSite::BackendConstruction,
                })
            }
        };

        tokio::select! {
            biased;
            signed = client.sign(&request.csr, request.duration) => Ok(signed?),
            _ = cancel.cancelled() => Err(ProcessError::Interrupted {
                site: FailureSite::BackendSign,
            }),
        }
    }
}
