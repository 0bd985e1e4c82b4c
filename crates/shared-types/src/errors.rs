//! # Error Taxonomy
//!
//! Every fallible operation in the ingestion pipeline returns [`IngestError`].
//! The discriminant decides the recovery strategy: transport errors are
//! retried with backoff, quota errors pause the caller, validation and
//! consistency errors surface immediately, and cancellation is not an error
//! at all; it propagates cleanly to the supervisor.

use crate::entities::FieldViolation;
use thiserror::Error;

/// Tagged errors for every ingestion operation.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// A row violated a schema or field constraint. Indicates a producer
    /// bug; fatal, never retried.
    #[error("validation failed on `{field}`: {reason}")]
    Validation {
        /// Column whose constraint was violated.
        field: String,
        /// Description of the violation.
        reason: String,
    },

    /// Network, TLS, auth, or 5xx failure talking to an external endpoint.
    /// Retried with exponential backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote refused for rate or capacity reasons. The caller pauses;
    /// the next scheduled tick retries.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The store disagrees with the chain invariants and repair did not
    /// resolve it. Alerted for operator intervention.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Shutdown was requested mid-operation. Not a failure.
    #[error("operation canceled")]
    Canceled,
}

impl IngestError {
    /// Whether an in-loop retry can help.
    ///
    /// Only transport failures qualify; quota pauses are handled at the
    /// scheduling layer and everything else is terminal for the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Transport(_))
    }

    /// Shorthand for a transport error from any displayable source.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        IngestError::Transport(err.to_string())
    }
}

impl From<FieldViolation> for IngestError {
    fn from(violation: FieldViolation) -> Self {
        IngestError::Validation {
            field: violation.field.to_string(),
            reason: violation.reason,
        }
    }
}
