//! Error types for docseek.
//!
//! This module defines a unified error enum that covers every error category
//! of the indexing and retrieval engine: configuration, vector store
//! connectivity, embedding generation, collection readiness, identity
//! resolution and answer generation, plus the ambient I/O and serialization
//! failures.

use thiserror::Error;

/// Unified error type for docseek.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or inconsistent dimension, invalid distance/quantization
    /// parameters, invalid arguments.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport or connectivity failure talking to the vector store
    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// Embedding provider error or malformed provider output
    #[error("Embedding failure: {0}")]
    Embedding(String),

    /// Operation attempted before the collection exists
    #[error("Collection not ready: {0}")]
    NotReady(String),

    /// Identity resolution miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// Answer generation failed at the LLM runtime
    #[error("LLM error: {0}")]
    Llm(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Coarse error category for outer layers (HTTP status mapping, exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request or configuration is wrong; retrying will not help.
    Validation,
    /// A collaborator failed; a bounded, backed-off retry may succeed.
    Transient,
    /// The referenced collection or identity does not exist.
    NotFound,
}

impl AppError {
    /// Classify this error for the caller.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Config(_) | AppError::Serialization(_) => ErrorCategory::Validation,
            AppError::NotReady(_) | AppError::NotFound(_) => ErrorCategory::NotFound,
            AppError::StoreUnavailable(_)
            | AppError::Embedding(_)
            | AppError::Llm(_)
            | AppError::Io(_)
            | AppError::Other(_) => ErrorCategory::Transient,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
