use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultIssuerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request file: {0}")]
    InvalidInput(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Request must be retried: {0}")]
    Requeue(#[from] crate::controller::RequeueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, VaultIssuerError>;
