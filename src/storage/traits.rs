//! Storage trait definitions
//!
//! Every multi-step mutation is a single call so the backend owns its
//! atomicity. Outcomes that are business results rather than failures are
//! returned as enums, leaving `StorageError` for genuine faults.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::StorageResult;
use crate::credit::CreditFactProvider;
use crate::exposure::{ExposureLimit, Reservation};
use crate::feed::{FeedFilter, FeedItem, LenderRequestOverlay, OpenTotals};
use crate::loan_request::{LoanRequest, RequestPatch, RequestSummary};
use crate::models::{BorrowerId, LenderId};
use crate::proposal::{LenderProposal, LoanProposal, ProposalPatch};

/// Combined storage trait
pub trait MatchStorage:
    RequestStorage + ProposalStorage + OverlayStorage + FeedStorage + CreditFactProvider + Send + Sync
{
}

/// Result of a guarded request update
#[derive(Debug, Clone)]
pub enum RequestUpdate {
    Updated(LoanRequest),
    /// No request with that id for the borrower
    Missing,
    /// The request was sealed before the write
    Sealed,
    /// A value increase would push open exposure over the cap
    CapExceeded { open_exposure: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRemoval {
    Deleted,
    Missing,
    Sealed,
}

/// Result of the acceptance transaction
#[derive(Debug, Clone)]
pub enum SealOutcome {
    /// The request is sealed and every proposal on it is settled
    Sealed {
        request: LoanRequest,
        proposals: Vec<LoanProposal>,
    },
    /// Wrong owner, unknown id, or an earlier acceptance won
    NotFoundOrAlreadySealed,
    /// The proposal is not (or no longer) under the request; nothing changed
    ProposalNotFound,
}

#[derive(Debug, Clone)]
pub enum ProposalInsert {
    Created(LoanProposal),
    RequestMissing,
    RequestSealed,
}

#[derive(Debug, Clone)]
pub enum ProposalUpdate {
    Updated(LoanProposal),
    Missing,
    /// Proposal is no longer pending
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalRemoval {
    Deleted,
    Missing,
    Locked,
}

/// Storage for loan requests
#[async_trait]
pub trait RequestStorage: Send + Sync {
    /// Insert a pending request if the borrower's open exposure admits its value.
    ///
    /// The exposure read and the insert form one unit; concurrent calls for
    /// the same borrower serialise.
    async fn insert_request_within_cap(
        &self,
        request: LoanRequest,
        limit: ExposureLimit,
    ) -> StorageResult<Reservation<LoanRequest>>;

    /// Sum of the borrower's unsealed request values
    async fn open_exposure(&self, borrower_id: BorrowerId) -> StorageResult<Decimal>;

    /// Get a request by ID regardless of owner
    async fn get_request(&self, id: Uuid) -> StorageResult<Option<LoanRequest>>;

    /// The borrower's requests, newest first, with proposal counts
    async fn list_requests_for_borrower(
        &self,
        borrower_id: BorrowerId,
    ) -> StorageResult<Vec<RequestSummary>>;

    /// Apply a validated patch while the request is unsealed
    async fn update_request(
        &self,
        borrower_id: BorrowerId,
        id: Uuid,
        patch: &RequestPatch,
        limit: ExposureLimit,
    ) -> StorageResult<RequestUpdate>;

    /// Delete an unsealed request with its proposals and overlay rows
    async fn delete_request(&self, borrower_id: BorrowerId, id: Uuid)
        -> StorageResult<RequestRemoval>;

    /// Seal the request on `proposal_id` and settle every sibling proposal
    async fn seal_request(
        &self,
        borrower_id: BorrowerId,
        request_id: Uuid,
        proposal_id: Uuid,
        funded_at: DateTime<Utc>,
    ) -> StorageResult<SealOutcome>;
}

/// Storage for loan proposals
#[async_trait]
pub trait ProposalStorage: Send + Sync {
    /// Insert a pending proposal while its request stays unsealed
    async fn insert_proposal(&self, proposal: LoanProposal) -> StorageResult<ProposalInsert>;

    /// Get a proposal by ID
    async fn get_proposal(&self, id: Uuid) -> StorageResult<Option<LoanProposal>>;

    /// All proposals on a request, oldest first
    async fn list_proposals_for_request(&self, request_id: Uuid)
        -> StorageResult<Vec<LoanProposal>>;

    /// All proposals by a lender, newest first
    async fn list_proposals_for_lender(
        &self,
        lender_id: LenderId,
    ) -> StorageResult<Vec<LenderProposal>>;

    /// One of the lender's proposals with its request's borrower
    async fn get_lender_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
    ) -> StorageResult<Option<LenderProposal>>;

    /// Apply a validated patch while the proposal is pending
    async fn update_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
        patch: &ProposalPatch,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ProposalUpdate>;

    /// Delete a pending proposal
    async fn delete_proposal(&self, lender_id: LenderId, id: Uuid)
        -> StorageResult<ProposalRemoval>;
}

/// Storage for per-lender request preferences
#[async_trait]
pub trait OverlayStorage: Send + Sync {
    /// Upsert the hide flag. `None` when the request does not exist.
    async fn set_hide(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        hide: bool,
    ) -> StorageResult<Option<LenderRequestOverlay>>;

    /// Upsert the favorite flag. `None` when the request does not exist.
    async fn set_favorite(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        favorite: bool,
    ) -> StorageResult<Option<LenderRequestOverlay>>;

    async fn get_overlay(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
    ) -> StorageResult<Option<LenderRequestOverlay>>;
}

/// Read-only feed queries
#[async_trait]
pub trait FeedStorage: Send + Sync {
    /// One page of open requests visible to the lender
    async fn list_open_requests(
        &self,
        lender_id: LenderId,
        filter: &FeedFilter,
    ) -> StorageResult<Vec<FeedItem>>;

    /// Totals over every open request
    async fn open_totals(&self) -> StorageResult<OpenTotals>;

    /// A single open request with the lender's overlay, ignoring hide
    async fn get_open_request(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
    ) -> StorageResult<Option<FeedItem>>;
}
