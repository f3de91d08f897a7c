//! Shared data models for the loan matching engine

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Borrower identity as supplied by the identity service
pub type BorrowerId = Uuid;

/// Lender identity as supplied by the identity service
pub type LenderId = Uuid;

/// Lifecycle status shared by loan requests and loan proposals.
///
/// Requests move `Pending -> Active` when sealed by an acceptance and never
/// become `Rejected`. Proposals move `Pending -> Active | Rejected`.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Active,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Active => "active",
            LoanStatus::Rejected => "rejected",
        }
    }

    /// Terminal statuses admit no further mutation
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanStatus::Pending)
    }
}

/// Borrower facets joined into feed rows. Owned by the profile service.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, Default)]
pub struct BorrowerProfile {
    pub id: BorrowerId,
    pub business_name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub industry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&LoanStatus::Rejected).unwrap(),
            "\"rejected\""
        );
        let parsed: LoanStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(parsed, LoanStatus::Active);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!LoanStatus::Pending.is_terminal());
        assert!(LoanStatus::Active.is_terminal());
        assert!(LoanStatus::Rejected.is_terminal());
    }
}
