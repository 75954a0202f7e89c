use crate::issuer::{Issuer, IssuerKind};
use crate::request::IssuerRef;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error(
        "invalid value {0:?} for issuerRef.kind. Must be empty, \"Issuer\" or \"ClusterIssuer\""
    )]
    UnknownKind(String),

    #[error("lookup failed: {0}")]
    Unavailable(String),
}

impl LookupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound { .. })
    }
}

/// Read access to issuer objects, served from externally owned state
pub trait IssuerLister: Send + Sync {
    fn get_issuer(&self, namespace: &str, name: &str) -> Result<Issuer, LookupError>;

    fn get_cluster_issuer(&self, name: &str) -> Result<Issuer, LookupError>;
}

/// Issuer resolved for one pass, together with the scope it was found in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIssuer {
    pub kind: IssuerKind,
    pub issuer: Issuer,
}

pub struct IssuerResolver {
    lister: Arc<dyn IssuerLister>,
}

impl IssuerResolver {
    pub fn new(lister: Arc<dyn IssuerLister>) -> Self {
        Self { lister }
    }

    /// Look up the issuer named by `issuer_ref`. `namespace` only scopes namespaced issuers.
    pub fn resolve(
        &self,
        issuer_ref: &IssuerRef,
        namespace: &str,
    ) -> Result<ResolvedIssuer, LookupError> {
        let kind = issuer_ref
            .issuer_kind()
            .ok_or_else(|| LookupError::UnknownKind(issuer_ref.kind.clone()))?;

        let issuer = match kind {
            IssuerKind::Namespaced => self.lister.get_issuer(namespace, &issuer_ref.name)?,
            IssuerKind::ClusterScoped => self.lister.get_cluster_issuer(&issuer_ref.name)?,
        };

        Ok(ResolvedIssuer { kind, issuer })
    }
}
