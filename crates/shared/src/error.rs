//! Error types for CareLink

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
