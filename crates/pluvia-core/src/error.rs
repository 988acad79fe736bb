//! Error types for Pluvia

use crate::types::PolicyId;

/// Result type alias using Pluvia's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Pluvia operations
///
/// Eligibility outcomes (inactive, expired, cap reached, threshold not met,
/// cooldown active) are not errors and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No live or archived record exists for this id
    #[error("policy {0} not found")]
    NotFound(PolicyId),

    /// A live record with this id already exists
    #[error("policy {0} already exists")]
    AlreadyExists(PolicyId),

    /// The record changed between the snapshot read and the commit
    #[error("conflict on policy {policy_id}: {reason}")]
    Conflict {
        /// Policy whose commit was rejected
        policy_id: PolicyId,
        /// What no longer matched
        reason: String,
    },

    /// A registration payload failed validation
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The measurement source could not produce a value for this tick
    #[error("measurement unavailable: {0}")]
    MeasurementUnavailable(String),

    /// The ledger rejected or failed to accept a trigger request
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence I/O errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new conflict error
    pub fn conflict(policy_id: PolicyId, reason: impl Into<String>) -> Self {
        Self::Conflict {
            policy_id,
            reason: reason.into(),
        }
    }

    /// Create a new invalid policy error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidPolicy(msg.into())
    }

    /// Create a new measurement error
    pub fn measurement(msg: impl Into<String>) -> Self {
        Self::MeasurementUnavailable(msg.into())
    }

    /// Create a new submission error
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::SubmissionFailed(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the next scheduled pass is expected to resolve this on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::MeasurementUnavailable(_) | Self::SubmissionFailed(_) | Self::Timeout
        )
    }

    /// Whether this is a compare-and-commit rejection
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
