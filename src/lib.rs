pub mod cli;
pub mod config;
pub mod controller;
pub mod inventory;
pub mod issuer;
pub mod request;
pub mod scheduler;
pub mod utils;
pub mod vault;

pub use controller::{
    CertificateRequestSigner, Outcome, ReasonCode, Reporter, RequeueDecision, RequeueError,
};
pub use issuer::{IssuerKind, IssuerLister, IssuerResolver, SecretLister};
pub use request::{IssueResult, IssuerRef, ObjectKey, SigningRequest};
pub use utils::{errors, paths};
pub use vault::{BackendFactory, SigningBackend, VaultBackendFactory};
