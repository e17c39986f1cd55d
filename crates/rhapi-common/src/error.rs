//! Error types shared across RHAPI crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, RhapiError>;

#[derive(Error, Debug)]
pub enum RhapiError {
    #[error("Malformed worker payload: {0}")]
    Payload(#[from] serde_json::Error),
}
