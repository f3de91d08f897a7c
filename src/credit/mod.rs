//! Credit facts and requirement suggestions
//!
//! Scores come from an external bureau feed and are treated as opaque. The
//! engine only maps a current score onto the collateral requirements a lender
//! would typically ask for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::BorrowerId;
use crate::storage::StorageResult;

/// Latest credit score known for a borrower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CreditFact {
    pub borrower_id: BorrowerId,
    pub score: i32,
    pub valid_until: DateTime<Utc>,
}

impl CreditFact {
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.valid_until >= now
    }
}

/// Read-only source of credit facts
#[async_trait]
pub trait CreditFactProvider: Send + Sync {
    /// Most recent fact for the borrower, expired or not
    async fn credit_fact(&self, borrower_id: BorrowerId) -> StorageResult<Option<CreditFact>>;
}

/// Requirement tier derived from a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementTier {
    /// No current score on file
    Unscored,
    /// Below 700
    Elevated,
    /// 700 to 749
    Moderate,
    /// 750 and above
    Prime,
}

impl RequirementTier {
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s < 700 => RequirementTier::Elevated,
            s if s < 750 => RequirementTier::Moderate,
            _ => RequirementTier::Prime,
        }
    }

    /// Tier for an optional fact, treating a lapsed fact as missing
    pub fn for_fact(fact: Option<&CreditFact>, now: DateTime<Utc>) -> Self {
        match fact {
            Some(fact) if fact.is_current(now) => Self::from_score(fact.score),
            _ => RequirementTier::Unscored,
        }
    }

    pub fn requirements(&self) -> Vec<String> {
        let items: &[&str] = match self {
            RequirementTier::Unscored | RequirementTier::Elevated => {
                &["Personal Guarantee", "Downpayment"]
            }
            RequirementTier::Moderate => &["Downpayment"],
            RequirementTier::Prime => &[],
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

/// Advisory requirement set for a proposal
#[derive(Debug, Clone, Serialize)]
pub struct RequirementSuggestion {
    pub tier: RequirementTier,
    pub score: Option<i32>,
    pub requirements: Vec<String>,
}

/// Build a suggestion from whatever fact is on file
pub fn suggest(fact: Option<&CreditFact>, now: DateTime<Utc>) -> RequirementSuggestion {
    let tier = RequirementTier::for_fact(fact, now);
    RequirementSuggestion {
        tier,
        score: fact.filter(|f| f.is_current(now)).map(|f| f.score),
        requirements: tier.requirements(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn fact(score: i32, valid_for: Duration) -> CreditFact {
        CreditFact {
            borrower_id: Uuid::new_v4(),
            score,
            valid_until: Utc::now() + valid_for,
        }
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(RequirementTier::from_score(699), RequirementTier::Elevated);
        assert_eq!(RequirementTier::from_score(700), RequirementTier::Moderate);
        assert_eq!(RequirementTier::from_score(749), RequirementTier::Moderate);
        assert_eq!(RequirementTier::from_score(750), RequirementTier::Prime);
    }

    #[test]
    fn test_requirement_sets() {
        assert_eq!(
            RequirementTier::Elevated.requirements(),
            vec!["Personal Guarantee", "Downpayment"]
        );
        assert_eq!(RequirementTier::Moderate.requirements(), vec!["Downpayment"]);
        assert!(RequirementTier::Prime.requirements().is_empty());
        assert_eq!(
            RequirementTier::Unscored.requirements(),
            RequirementTier::Elevated.requirements()
        );
    }

    #[test]
    fn test_expired_fact_is_unscored() {
        let now = Utc::now();
        let lapsed = fact(800, Duration::days(-1));
        let suggestion = suggest(Some(&lapsed), now);
        assert_eq!(suggestion.tier, RequirementTier::Unscored);
        assert_eq!(suggestion.score, None);

        let current = fact(720, Duration::days(10));
        let suggestion = suggest(Some(&current), now);
        assert_eq!(suggestion.tier, RequirementTier::Moderate);
        assert_eq!(suggestion.score, Some(720));

        assert_eq!(suggest(None, now).tier, RequirementTier::Unscored);
    }
}
