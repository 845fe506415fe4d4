use std::time::Duration;

use thiserror::Error;

use crate::error_classifier::{ClassifiedError, ErrorKind};

/// Application-wide error types for Quotient.
#[derive(Error, Debug)]
pub enum AppError {
    /// Circuit breaker is open - the call was rejected without any I/O.
    #[error(
        "Service '{service}' is temporarily unavailable (circuit open, retry after {} seconds)",
        retry_after.as_secs()
    )]
    CircuitOpen {
        service: String,
        retry_after: Duration,
    },

    /// A resilient call failed terminally (non-retryable or retries exhausted).
    #[error("{service} failed after {attempts} attempt(s): {source}")]
    ServiceCall {
        service: String,
        attempts: u32,
        #[source]
        source: ClassifiedError,
    },

    /// Document-intelligence failure re-wrapped with an operator-facing message.
    #[error("{operation} failed: {message}")]
    DocumentIntelligence {
        operation: &'static str,
        message: String,
        #[source]
        source: Box<AppError>,
    },

    /// Upload succeeded at the HTTP level but no job id came back.
    #[error("Document service accepted the upload but returned no job id (response: {0})")]
    MissingJobId(String),

    /// The service reported the job as failed.
    #[error("Parsing job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// The job did not reach a terminal state within the polling budget.
    #[error("Parsing job {job_id} did not complete after {polls} status checks ({elapsed_secs}s)")]
    JobTimedOut {
        job_id: String,
        polls: u32,
        elapsed_secs: u64,
    },

    /// Fetching document bytes from storage failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The caller's deadline or cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Caller supplied something unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// The failure kind from the shared taxonomy, when one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::ServiceCall { source, .. } => Some(source.kind),
            AppError::DocumentIntelligence { source, .. } => source.kind(),
            AppError::JobTimedOut { .. } => Some(ErrorKind::Timeout),
            AppError::JobFailed { .. } | AppError::MissingJobId(_) => Some(ErrorKind::Permanent),
            _ => None,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::CircuitOpen { .. } => true,
            AppError::ServiceCall { source, .. } => source.retryable,
            AppError::DocumentIntelligence { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if the failure came from an open circuit rather than the call itself.
    pub fn is_circuit_open(&self) -> bool {
        match self {
            AppError::CircuitOpen { .. } => true,
            AppError::DocumentIntelligence { source, .. } => source.is_circuit_open(),
            _ => false,
        }
    }
}
