use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub use crate::models::{BorrowerId, LoanStatus};

/// Smallest value a borrower may ask for
pub const MIN_REQUEST_VALUE: Decimal = Decimal::from_parts(2_000, 0, 0, false, 0);

/// A borrower's funding request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanRequest {
    pub id: Uuid,
    pub borrower_id: BorrowerId,
    pub title: String,
    pub description: String,
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub status: LoanStatus,
    pub funded_at: Option<DateTime<Utc>>,
    pub accepted_proposal_id: Option<Uuid>,
}

impl LoanRequest {
    /// Build a pending request from validated input
    pub fn pending(borrower_id: BorrowerId, input: NewLoanRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            borrower_id,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            value: input.value,
            created_at: input.created_at,
            expire_at: input.expire_at,
            status: LoanStatus::Pending,
            funded_at: None,
            accepted_proposal_id: None,
        }
    }

    /// A request is sealed once a proposal has been accepted for it
    pub fn is_sealed(&self) -> bool {
        self.funded_at.is_some() || self.accepted_proposal_id.is_some()
    }

    /// Apply an already validated patch in place
    pub fn apply(&mut self, patch: &RequestPatch) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(value) = patch.value {
            self.value = value;
        }
    }
}

/// Input for creating a loan request
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_request_window"))]
pub struct NewLoanRequest {
    #[validate(custom = "not_blank")]
    pub title: String,
    #[validate(custom = "not_blank")]
    pub description: String,
    #[validate(custom = "at_least_min_value")]
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

/// Partial update of a loan request; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RequestPatch {
    #[validate(custom = "not_blank")]
    pub title: Option<String>,
    #[validate(custom = "not_blank")]
    pub description: Option<String>,
    #[validate(custom = "at_least_min_value")]
    pub value: Option<Decimal>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.value.is_none()
    }
}

/// A borrower's request together with how many proposals it has drawn
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RequestSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: LoanRequest,
    pub proposals: i64,
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}

fn at_least_min_value(value: &Decimal) -> Result<(), ValidationError> {
    if *value < MIN_REQUEST_VALUE {
        let mut err = ValidationError::new("min_value");
        err.message = Some(format!("must be at least {}", MIN_REQUEST_VALUE).into());
        return Err(err);
    }
    Ok(())
}

fn validate_request_window(input: &NewLoanRequest) -> Result<(), ValidationError> {
    if input.expire_at <= input.created_at {
        let mut err = ValidationError::new("expire_at");
        err.message = Some("expire_at must be after created_at".into());
        return Err(err);
    }
    Ok(())
}
