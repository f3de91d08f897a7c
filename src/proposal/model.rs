use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::loan_request::model::not_blank;
pub use crate::models::{BorrowerId, LenderId, LoanStatus};

/// A lender's offer against a loan request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanProposal {
    pub id: Uuid,
    pub lender_id: LenderId,
    pub loan_request_id: Uuid,
    pub title: String,
    pub description: String,
    pub requirements: Option<Vec<String>>,
    pub loan_amount: Decimal,
    pub interest_rate: Decimal,
    /// Months
    pub repayment_term: i32,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub update_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

impl LoanProposal {
    /// Build a pending proposal from validated terms
    pub fn pending(lender_id: LenderId, loan_request_id: Uuid, terms: ProposalTerms) -> Self {
        Self {
            id: Uuid::new_v4(),
            lender_id,
            loan_request_id,
            title: terms.title.trim().to_string(),
            description: terms.description.trim().to_string(),
            requirements: normalize_requirements(terms.requirements),
            loan_amount: terms.loan_amount,
            interest_rate: terms.interest_rate,
            repayment_term: terms.repayment_term,
            created_at: terms.created_at,
            expire_at: terms.expire_at,
            update_at: None,
            status: LoanStatus::Pending,
        }
    }

    /// Only pending proposals may change
    pub fn is_locked(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an already validated patch in place
    pub fn apply(&mut self, patch: &ProposalPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(requirements) = &patch.requirements {
            self.requirements = normalize_requirements(Some(requirements.clone()));
        }
        if let Some(amount) = patch.loan_amount {
            self.loan_amount = amount;
        }
        if let Some(rate) = patch.interest_rate {
            self.interest_rate = rate;
        }
        if let Some(term) = patch.repayment_term {
            self.repayment_term = term;
        }
        self.update_at = Some(now);
    }
}

/// Terms a lender submits when proposing on a request
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_terms_window"))]
pub struct ProposalTerms {
    #[validate(custom = "not_blank")]
    pub title: String,
    #[validate(custom = "not_blank")]
    pub description: String,
    #[validate(custom = "non_blank_items")]
    pub requirements: Option<Vec<String>>,
    #[validate(custom = "positive")]
    pub loan_amount: Decimal,
    #[validate(custom = "non_negative")]
    pub interest_rate: Decimal,
    #[validate(range(min = 1))]
    pub repayment_term: i32,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

/// Partial update of a pending proposal
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProposalPatch {
    #[validate(custom = "not_blank")]
    pub title: Option<String>,
    #[validate(custom = "not_blank")]
    pub description: Option<String>,
    /// `Some(vec![])` clears the requirements
    #[validate(custom = "non_blank_items")]
    pub requirements: Option<Vec<String>>,
    #[validate(custom = "positive")]
    pub loan_amount: Option<Decimal>,
    #[validate(custom = "non_negative")]
    pub interest_rate: Option<Decimal>,
    #[validate(range(min = 1))]
    pub repayment_term: Option<i32>,
}

impl ProposalPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.requirements.is_none()
            && self.loan_amount.is_none()
            && self.interest_rate.is_none()
            && self.repayment_term.is_none()
    }
}

/// A proposal as seen by the lender who made it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LenderProposal {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub proposal: LoanProposal,
    pub borrower_id: BorrowerId,
}

/// Empty requirement lists are stored as null
pub fn normalize_requirements(requirements: Option<Vec<String>>) -> Option<Vec<String>> {
    let items: Vec<String> = requirements?
        .into_iter()
        .map(|r| r.trim().to_string())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn non_blank_items(items: &[String]) -> Result<(), ValidationError> {
    if items.iter().any(|item| item.trim().is_empty()) {
        let mut err = ValidationError::new("requirements");
        err.message = Some("requirements must not contain empty entries".into());
        return Err(err);
    }
    Ok(())
}

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive");
        err.message = Some("must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_terms_window(terms: &ProposalTerms) -> Result<(), ValidationError> {
    if terms.expire_at <= terms.created_at {
        let mut err = ValidationError::new("expire_at");
        err.message = Some("expire_at must be after created_at".into());
        return Err(err);
    }
    Ok(())
}
