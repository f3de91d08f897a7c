//! Centralized error handling for the loan matching engine
//!
//! Every service operation returns a `MatchError`. Business-rule violations
//! are typed variants; storage and transport failures collapse into
//! `Internal`, which is logged at conversion and never carries driver text.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::storage::StorageError;

/// Domain error type with stable error codes
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Exposure cap exceeded: open exposure {open_exposure} plus requested {requested} is above cap {cap}")]
    CapExceeded {
        open_exposure: Decimal,
        requested: Decimal,
        cap: Decimal,
    },

    #[error("Loan request can no longer be modified")]
    RequestSealed,

    #[error("Loan proposal can no longer be modified")]
    ProposalLocked,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Loan request not found or already sealed")]
    NotFoundOrAlreadySealed,

    #[error("Loan proposal not found for this request")]
    ProposalNotFound,

    #[error("Internal error")]
    Internal { retryable: bool },
}

impl MatchError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            MatchError::Validation(_) => "VALIDATION_ERROR",
            MatchError::CapExceeded { .. } => "CAP_EXCEEDED",
            MatchError::RequestSealed => "REQUEST_SEALED",
            MatchError::ProposalLocked => "PROPOSAL_LOCKED",
            MatchError::NotFound(_) => "NOT_FOUND",
            MatchError::NotFoundOrAlreadySealed => "NOT_FOUND_OR_ALREADY_SEALED",
            MatchError::ProposalNotFound => "PROPOSAL_NOT_FOUND",
            MatchError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Business-rule rejections, as opposed to malformed input or failures
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            MatchError::CapExceeded { .. }
                | MatchError::RequestSealed
                | MatchError::ProposalLocked
                | MatchError::NotFoundOrAlreadySealed
        )
    }

    /// Transient storage failures the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::Internal { retryable: true })
    }

    pub fn not_found(what: &str) -> Self {
        MatchError::NotFound(format!("{} not found", what))
    }
}

impl From<StorageError> for MatchError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, retryable = err.is_retryable(), "Storage operation failed");
        MatchError::Internal {
            retryable: err.is_retryable(),
        }
    }
}

impl From<validator::ValidationErrors> for MatchError {
    fn from(err: validator::ValidationErrors) -> Self {
        MatchError::Validation(err.to_string())
    }
}

/// Result type alias using MatchError
pub type MatchResult<T> = Result<T, MatchError>;
