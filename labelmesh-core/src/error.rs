//! Error types for labelmesh

use thiserror::Error;

/// Main error type for labelmesh operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

/// Result type alias for labelmesh operations
pub type Result<T> = std::result::Result<T, Error>;
