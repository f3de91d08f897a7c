//! Acceptance coordinator
//!
//! Accepting a proposal seals its request and settles every proposal on it in
//! one storage transaction: the accepted proposal becomes active and all of
//! its siblings are rejected. The `funded_at IS NULL` guard on the request
//! row decides races; the loser sees `NotFoundOrAlreadySealed`.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{MatchError, MatchResult};
use crate::loan_request::LoanRequest;
use crate::models::BorrowerId;
use crate::proposal::LoanProposal;
use crate::storage::{MatchStorage, SealOutcome};

/// A sealed request and its settled proposals
#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub request: LoanRequest,
    pub proposals: Vec<LoanProposal>,
}

impl Acceptance {
    /// The proposal that won
    pub fn accepted(&self) -> Option<&LoanProposal> {
        let id = self.request.accepted_proposal_id?;
        self.proposals.iter().find(|p| p.id == id)
    }
}

#[derive(Clone)]
pub struct AcceptanceCoordinator {
    store: Arc<dyn MatchStorage>,
}

impl AcceptanceCoordinator {
    pub fn new(store: Arc<dyn MatchStorage>) -> Self {
        Self { store }
    }

    pub async fn accept_proposal(
        &self,
        borrower_id: BorrowerId,
        request_id: Uuid,
        proposal_id: Uuid,
    ) -> MatchResult<Acceptance> {
        let belongs = self
            .store
            .get_proposal(proposal_id)
            .await?
            .map_or(false, |p| p.loan_request_id == request_id);
        if !belongs {
            return Err(MatchError::ProposalNotFound);
        }

        match self
            .store
            .seal_request(borrower_id, request_id, proposal_id, Utc::now())
            .await?
        {
            SealOutcome::Sealed { request, proposals } => {
                tracing::info!(
                    request_id = %request_id,
                    proposal_id = %proposal_id,
                    borrower_id = %borrower_id,
                    rejected = proposals.len().saturating_sub(1),
                    "Loan request sealed by acceptance"
                );
                Ok(Acceptance { request, proposals })
            }
            SealOutcome::NotFoundOrAlreadySealed => {
                tracing::warn!(
                    request_id = %request_id,
                    proposal_id = %proposal_id,
                    borrower_id = %borrower_id,
                    "Acceptance lost: request missing or already sealed"
                );
                Err(MatchError::NotFoundOrAlreadySealed)
            }
            SealOutcome::ProposalNotFound => {
                tracing::warn!(
                    request_id = %request_id,
                    proposal_id = %proposal_id,
                    "Acceptance aborted: proposal left the request"
                );
                Err(MatchError::ProposalNotFound)
            }
        }
    }
}
