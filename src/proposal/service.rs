use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::credit::{self, RequirementSuggestion};
use crate::error::{MatchError, MatchResult};
use crate::models::LenderId;
use crate::proposal::model::{LenderProposal, LoanProposal, ProposalPatch, ProposalTerms};
use crate::storage::{MatchStorage, ProposalInsert, ProposalRemoval, ProposalUpdate};

#[derive(Clone)]
pub struct ProposalService {
    store: Arc<dyn MatchStorage>,
}

impl ProposalService {
    pub fn new(store: Arc<dyn MatchStorage>) -> Self {
        Self { store }
    }

    /// Submit a pending proposal against an open request
    pub async fn create_proposal(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        terms: ProposalTerms,
    ) -> MatchResult<LoanProposal> {
        terms.validate()?;

        let proposal = LoanProposal::pending(lender_id, request_id, terms);
        match self.store.insert_proposal(proposal).await? {
            ProposalInsert::Created(created) => {
                tracing::info!(
                    proposal_id = %created.id,
                    request_id = %request_id,
                    lender_id = %lender_id,
                    loan_amount = %created.loan_amount,
                    "Loan proposal created"
                );
                Ok(created)
            }
            ProposalInsert::RequestMissing => Err(MatchError::not_found("Loan request")),
            ProposalInsert::RequestSealed => Err(MatchError::RequestSealed),
        }
    }

    /// A proposal under the given request
    pub async fn get_proposal(&self, request_id: Uuid, id: Uuid) -> MatchResult<LoanProposal> {
        self.store
            .get_proposal(id)
            .await?
            .filter(|p| p.loan_request_id == request_id)
            .ok_or_else(|| MatchError::not_found("Loan proposal"))
    }

    pub async fn get_proposals_for_request(
        &self,
        request_id: Uuid,
    ) -> MatchResult<Vec<LoanProposal>> {
        Ok(self.store.list_proposals_for_request(request_id).await?)
    }

    pub async fn get_proposals_for_lender(
        &self,
        lender_id: LenderId,
    ) -> MatchResult<Vec<LenderProposal>> {
        Ok(self.store.list_proposals_for_lender(lender_id).await?)
    }

    pub async fn get_lender_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
    ) -> MatchResult<LenderProposal> {
        self.store
            .get_lender_proposal(lender_id, id)
            .await?
            .ok_or_else(|| MatchError::not_found("Loan proposal"))
    }

    pub async fn update_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
        patch: ProposalPatch,
    ) -> MatchResult<LoanProposal> {
        // Settled proposals answer ProposalLocked whatever the patch holds
        let current = self.get_lender_proposal(lender_id, id).await?;
        if current.proposal.is_locked() {
            return Err(MatchError::ProposalLocked);
        }

        if patch.is_empty() {
            return Err(MatchError::Validation(
                "Update must change at least one field".to_string(),
            ));
        }
        patch.validate()?;

        match self
            .store
            .update_proposal(lender_id, id, &patch, Utc::now())
            .await?
        {
            ProposalUpdate::Updated(proposal) => {
                tracing::info!(proposal_id = %id, lender_id = %lender_id, "Loan proposal updated");
                Ok(proposal)
            }
            ProposalUpdate::Missing => Err(MatchError::not_found("Loan proposal")),
            ProposalUpdate::Locked => Err(MatchError::ProposalLocked),
        }
    }

    /// Withdraw a pending proposal
    pub async fn delete_proposal(&self, lender_id: LenderId, id: Uuid) -> MatchResult<()> {
        match self.store.delete_proposal(lender_id, id).await? {
            ProposalRemoval::Deleted => {
                tracing::info!(proposal_id = %id, lender_id = %lender_id, "Loan proposal deleted");
                Ok(())
            }
            ProposalRemoval::Missing => Err(MatchError::not_found("Loan proposal")),
            ProposalRemoval::Locked => Err(MatchError::ProposalLocked),
        }
    }

    /// Requirements suggested by the borrower's current credit standing
    pub async fn suggest_requirements(&self, request_id: Uuid) -> MatchResult<RequirementSuggestion> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| MatchError::not_found("Loan request"))?;

        let fact = self.store.credit_fact(request.borrower_id).await?;
        let suggestion = credit::suggest(fact.as_ref(), Utc::now());
        tracing::debug!(
            request_id = %request_id,
            tier = ?suggestion.tier,
            "Requirement suggestion computed"
        );
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::{CreditFact, RequirementTier};
    use crate::exposure::ExposureLimit;
    use crate::loan_request::{NewLoanRequest, RequestService};
    use crate::storage::InMemoryStorage;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Fixture {
        storage: InMemoryStorage,
        requests: RequestService,
        proposals: ProposalService,
    }

    fn fixture() -> Fixture {
        let storage = InMemoryStorage::new();
        let store: Arc<dyn MatchStorage> = Arc::new(storage.clone());
        Fixture {
            storage,
            requests: RequestService::new(store.clone(), ExposureLimit::default()),
            proposals: ProposalService::new(store),
        }
    }

    fn terms() -> ProposalTerms {
        let now = Utc::now();
        ProposalTerms {
            title: "Equipment loan".to_string(),
            description: "Secured on the equipment".to_string(),
            requirements: None,
            loan_amount: dec!(30000),
            interest_rate: dec!(0.08),
            repayment_term: 36,
            created_at: now,
            expire_at: now + Duration::days(14),
        }
    }

    async fn open_request(f: &Fixture, borrower: Uuid) -> Uuid {
        let now = Utc::now();
        f.requests
            .create_request(
                borrower,
                NewLoanRequest {
                    title: "Packaging line".to_string(),
                    description: "New packaging line".to_string(),
                    value: dec!(30000),
                    created_at: now,
                    expire_at: now + Duration::days(30),
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_proposal_on_missing_request() {
        let f = fixture();
        let result = f
            .proposals
            .create_proposal(Uuid::new_v4(), Uuid::new_v4(), terms())
            .await;
        assert!(matches!(result, Err(MatchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lender_views_include_borrower() {
        let f = fixture();
        let borrower = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let request_id = open_request(&f, borrower).await;

        let created = f
            .proposals
            .create_proposal(lender, request_id, terms())
            .await
            .unwrap();

        let mine = f.proposals.get_proposals_for_lender(lender).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].borrower_id, borrower);

        let one = f.proposals.get_lender_proposal(lender, created.id).await.unwrap();
        assert_eq!(one.proposal.id, created.id);
        assert!(f
            .proposals
            .get_lender_proposal(Uuid::new_v4(), created.id)
            .await
            .is_err());

        assert!(f.proposals.get_proposal(request_id, created.id).await.is_ok());
        assert!(f
            .proposals
            .get_proposal(Uuid::new_v4(), created.id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_pending_proposal_can_be_revised_and_withdrawn() {
        let f = fixture();
        let lender = Uuid::new_v4();
        let request_id = open_request(&f, Uuid::new_v4()).await;
        let created = f
            .proposals
            .create_proposal(lender, request_id, terms())
            .await
            .unwrap();

        let revised = f
            .proposals
            .update_proposal(
                lender,
                created.id,
                ProposalPatch {
                    repayment_term: Some(48),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(revised.repayment_term, 48);
        assert!(revised.update_at.is_some());

        f.proposals.delete_proposal(lender, created.id).await.unwrap();
        assert!(f
            .proposals
            .get_proposals_for_request(request_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_suggest_requirements_from_credit_fact() {
        let f = fixture();
        let borrower = Uuid::new_v4();
        let request_id = open_request(&f, borrower).await;

        let unscored = f.proposals.suggest_requirements(request_id).await.unwrap();
        assert_eq!(unscored.tier, RequirementTier::Unscored);

        f.storage
            .record_credit_fact(CreditFact {
                borrower_id: borrower,
                score: 710,
                valid_until: Utc::now() + Duration::days(30),
            })
            .await;
        let suggestion = f.proposals.suggest_requirements(request_id).await.unwrap();
        assert_eq!(suggestion.tier, RequirementTier::Moderate);
        assert_eq!(suggestion.requirements, vec!["Downpayment"]);
    }
}
