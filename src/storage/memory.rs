//! In-memory storage implementation
//!
//! All tables sit behind one `RwLock`, so each trait call observes and
//! mutates a consistent snapshot just as a single database transaction would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::StorageResult;
use super::traits::*;
use crate::credit::{CreditFact, CreditFactProvider};
use crate::exposure::{ExposureLimit, Reservation};
use crate::feed::{FeedFilter, FeedItem, LenderRequestOverlay, OpenTotals, SortField, SortOrder};
use crate::loan_request::{LoanRequest, RequestPatch, RequestSummary};
use crate::models::{BorrowerId, BorrowerProfile, LenderId, LoanStatus};
use crate::proposal::{LenderProposal, LoanProposal, ProposalPatch};

#[derive(Debug, Default)]
struct Tables {
    requests: HashMap<Uuid, LoanRequest>,
    proposals: HashMap<Uuid, LoanProposal>,
    overlays: HashMap<(LenderId, Uuid), LenderRequestOverlay>,
    borrowers: HashMap<BorrowerId, BorrowerProfile>,
    credit_facts: HashMap<BorrowerId, CreditFact>,
}

impl Tables {
    fn open_exposure(&self, borrower_id: BorrowerId) -> Decimal {
        self.requests
            .values()
            .filter(|r| r.borrower_id == borrower_id && !r.is_sealed())
            .map(|r| r.value)
            .sum()
    }

    fn is_open(request: &LoanRequest) -> bool {
        request.status == LoanStatus::Pending && !request.is_sealed()
    }

    fn feed_item(&self, lender_id: LenderId, request: &LoanRequest) -> FeedItem {
        let profile = self.borrowers.get(&request.borrower_id);
        let overlay = self.overlays.get(&(lender_id, request.id));
        FeedItem {
            id: request.id,
            borrower_id: request.borrower_id,
            title: request.title.clone(),
            description: request.description.clone(),
            value: request.value,
            created_at: request.created_at,
            expire_at: request.expire_at,
            business_name: profile.and_then(|p| p.business_name.clone()),
            city: profile.and_then(|p| p.city.clone()),
            state: profile.and_then(|p| p.state.clone()),
            industry: profile.and_then(|p| p.industry.clone()),
            credit_score: self.credit_facts.get(&request.borrower_id).map(|f| f.score),
            favorite: overlay.and_then(|o| o.favorite),
            hide: overlay.and_then(|o| o.hide),
        }
    }

    fn lender_proposal(&self, proposal: &LoanProposal) -> Option<LenderProposal> {
        let request = self.requests.get(&proposal.loan_request_id)?;
        Some(LenderProposal {
            proposal: proposal.clone(),
            borrower_id: request.borrower_id,
        })
    }
}

/// In-memory storage for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Register borrower profile facets shown in the feed
    pub async fn upsert_borrower(&self, profile: BorrowerProfile) {
        let mut tables = self.tables.write().await;
        tables.borrowers.insert(profile.id, profile);
    }

    /// Record a credit fact, replacing any earlier one for the borrower
    pub async fn record_credit_fact(&self, fact: CreditFact) {
        let mut tables = self.tables.write().await;
        tables.credit_facts.insert(fact.borrower_id, fact);
    }
}

#[async_trait]
impl RequestStorage for InMemoryStorage {
    async fn insert_request_within_cap(
        &self,
        request: LoanRequest,
        limit: ExposureLimit,
    ) -> StorageResult<Reservation<LoanRequest>> {
        let mut tables = self.tables.write().await;
        let open_exposure = tables.open_exposure(request.borrower_id);
        if !limit.admits(open_exposure, request.value) {
            return Ok(Reservation::CapExceeded { open_exposure });
        }
        tables.requests.insert(request.id, request.clone());
        Ok(Reservation::Reserved(request))
    }

    async fn open_exposure(&self, borrower_id: BorrowerId) -> StorageResult<Decimal> {
        let tables = self.tables.read().await;
        Ok(tables.open_exposure(borrower_id))
    }

    async fn get_request(&self, id: Uuid) -> StorageResult<Option<LoanRequest>> {
        let tables = self.tables.read().await;
        Ok(tables.requests.get(&id).cloned())
    }

    async fn list_requests_for_borrower(
        &self,
        borrower_id: BorrowerId,
    ) -> StorageResult<Vec<RequestSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<RequestSummary> = tables
            .requests
            .values()
            .filter(|r| r.borrower_id == borrower_id)
            .map(|r| RequestSummary {
                request: r.clone(),
                proposals: tables
                    .proposals
                    .values()
                    .filter(|p| p.loan_request_id == r.id)
                    .count() as i64,
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.request
                .created_at
                .cmp(&a.request.created_at)
                .then_with(|| a.request.id.cmp(&b.request.id))
        });
        Ok(summaries)
    }

    async fn update_request(
        &self,
        borrower_id: BorrowerId,
        id: Uuid,
        patch: &RequestPatch,
        limit: ExposureLimit,
    ) -> StorageResult<RequestUpdate> {
        let mut tables = self.tables.write().await;
        let current = match tables.requests.get(&id) {
            Some(r) if r.borrower_id == borrower_id => r.clone(),
            _ => return Ok(RequestUpdate::Missing),
        };
        if current.is_sealed() {
            return Ok(RequestUpdate::Sealed);
        }

        if let Some(value) = patch.value {
            if value > current.value {
                let others = tables.open_exposure(borrower_id) - current.value;
                if !limit.admits(others, value) {
                    return Ok(RequestUpdate::CapExceeded {
                        open_exposure: others,
                    });
                }
            }
        }

        let request = match tables.requests.get_mut(&id) {
            Some(r) => r,
            None => return Ok(RequestUpdate::Missing),
        };
        request.apply(patch);
        Ok(RequestUpdate::Updated(request.clone()))
    }

    async fn delete_request(
        &self,
        borrower_id: BorrowerId,
        id: Uuid,
    ) -> StorageResult<RequestRemoval> {
        let mut tables = self.tables.write().await;
        match tables.requests.get(&id) {
            Some(r) if r.borrower_id == borrower_id => {
                if r.is_sealed() {
                    return Ok(RequestRemoval::Sealed);
                }
            }
            _ => return Ok(RequestRemoval::Missing),
        }

        tables.requests.remove(&id);
        tables.proposals.retain(|_, p| p.loan_request_id != id);
        tables.overlays.retain(|(_, request_id), _| *request_id != id);
        Ok(RequestRemoval::Deleted)
    }

    async fn seal_request(
        &self,
        borrower_id: BorrowerId,
        request_id: Uuid,
        proposal_id: Uuid,
        funded_at: DateTime<Utc>,
    ) -> StorageResult<SealOutcome> {
        let mut tables = self.tables.write().await;

        match tables.requests.get(&request_id) {
            Some(r) if r.borrower_id == borrower_id && r.funded_at.is_none() => {}
            _ => return Ok(SealOutcome::NotFoundOrAlreadySealed),
        }
        let belongs = tables
            .proposals
            .get(&proposal_id)
            .map_or(false, |p| p.loan_request_id == request_id);
        if !belongs {
            return Ok(SealOutcome::ProposalNotFound);
        }

        let request = match tables.requests.get_mut(&request_id) {
            Some(r) => {
                r.funded_at = Some(funded_at);
                r.accepted_proposal_id = Some(proposal_id);
                r.status = LoanStatus::Active;
                r.clone()
            }
            None => return Ok(SealOutcome::NotFoundOrAlreadySealed),
        };

        let mut proposals: Vec<LoanProposal> = tables
            .proposals
            .values_mut()
            .filter(|p| p.loan_request_id == request_id)
            .map(|p| {
                p.status = if p.id == proposal_id {
                    LoanStatus::Active
                } else {
                    LoanStatus::Rejected
                };
                p.clone()
            })
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(SealOutcome::Sealed { request, proposals })
    }
}

#[async_trait]
impl ProposalStorage for InMemoryStorage {
    async fn insert_proposal(&self, proposal: LoanProposal) -> StorageResult<ProposalInsert> {
        let mut tables = self.tables.write().await;
        match tables.requests.get(&proposal.loan_request_id) {
            None => return Ok(ProposalInsert::RequestMissing),
            Some(r) if !Tables::is_open(r) => return Ok(ProposalInsert::RequestSealed),
            Some(_) => {}
        }
        tables.proposals.insert(proposal.id, proposal.clone());
        Ok(ProposalInsert::Created(proposal))
    }

    async fn get_proposal(&self, id: Uuid) -> StorageResult<Option<LoanProposal>> {
        let tables = self.tables.read().await;
        Ok(tables.proposals.get(&id).cloned())
    }

    async fn list_proposals_for_request(
        &self,
        request_id: Uuid,
    ) -> StorageResult<Vec<LoanProposal>> {
        let tables = self.tables.read().await;
        let mut proposals: Vec<LoanProposal> = tables
            .proposals
            .values()
            .filter(|p| p.loan_request_id == request_id)
            .cloned()
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(proposals)
    }

    async fn list_proposals_for_lender(
        &self,
        lender_id: LenderId,
    ) -> StorageResult<Vec<LenderProposal>> {
        let tables = self.tables.read().await;
        let mut proposals: Vec<LenderProposal> = tables
            .proposals
            .values()
            .filter(|p| p.lender_id == lender_id)
            .filter_map(|p| tables.lender_proposal(p))
            .collect();
        proposals.sort_by(|a, b| {
            b.proposal
                .created_at
                .cmp(&a.proposal.created_at)
                .then_with(|| a.proposal.id.cmp(&b.proposal.id))
        });
        Ok(proposals)
    }

    async fn get_lender_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
    ) -> StorageResult<Option<LenderProposal>> {
        let tables = self.tables.read().await;
        Ok(tables
            .proposals
            .get(&id)
            .filter(|p| p.lender_id == lender_id)
            .and_then(|p| tables.lender_proposal(p)))
    }

    async fn update_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
        patch: &ProposalPatch,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ProposalUpdate> {
        let mut tables = self.tables.write().await;
        let proposal = match tables.proposals.get_mut(&id) {
            Some(p) if p.lender_id == lender_id => p,
            _ => return Ok(ProposalUpdate::Missing),
        };
        if proposal.is_locked() {
            return Ok(ProposalUpdate::Locked);
        }
        proposal.apply(patch, updated_at);
        Ok(ProposalUpdate::Updated(proposal.clone()))
    }

    async fn delete_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
    ) -> StorageResult<ProposalRemoval> {
        let mut tables = self.tables.write().await;
        match tables.proposals.get(&id) {
            Some(p) if p.lender_id == lender_id => {
                if p.is_locked() {
                    return Ok(ProposalRemoval::Locked);
                }
            }
            _ => return Ok(ProposalRemoval::Missing),
        }
        tables.proposals.remove(&id);
        Ok(ProposalRemoval::Deleted)
    }
}

impl InMemoryStorage {
    async fn upsert_overlay<F>(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        set: F,
    ) -> StorageResult<Option<LenderRequestOverlay>>
    where
        F: FnOnce(&mut LenderRequestOverlay) + Send,
    {
        let mut tables = self.tables.write().await;
        if !tables.requests.contains_key(&request_id) {
            return Ok(None);
        }
        let overlay = tables
            .overlays
            .entry((lender_id, request_id))
            .or_insert_with(|| LenderRequestOverlay::empty(lender_id, request_id));
        set(overlay);
        Ok(Some(overlay.clone()))
    }
}

#[async_trait]
impl OverlayStorage for InMemoryStorage {
    async fn set_hide(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        hide: bool,
    ) -> StorageResult<Option<LenderRequestOverlay>> {
        self.upsert_overlay(lender_id, request_id, |o| o.hide = Some(hide))
            .await
    }

    async fn set_favorite(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        favorite: bool,
    ) -> StorageResult<Option<LenderRequestOverlay>> {
        self.upsert_overlay(lender_id, request_id, |o| o.favorite = Some(favorite))
            .await
    }

    async fn get_overlay(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
    ) -> StorageResult<Option<LenderRequestOverlay>> {
        let tables = self.tables.read().await;
        Ok(tables.overlays.get(&(lender_id, request_id)).cloned())
    }
}

/// `None` sorts after every value, matching PostgreSQL's ascending default
fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_feed_items(a: &FeedItem, b: &FeedItem, sort: SortField, order: SortOrder) -> Ordering {
    let primary = match sort {
        SortField::Title => a.title.cmp(&b.title),
        SortField::Value => a.value.cmp(&b.value),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Description => a.description.cmp(&b.description),
        SortField::Industry => nulls_last(&a.industry, &b.industry),
        SortField::State => nulls_last(&a.state, &b.state),
        SortField::CreditScore => nulls_last(&a.credit_score, &b.credit_score),
    };
    let primary = match order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl FeedStorage for InMemoryStorage {
    async fn list_open_requests(
        &self,
        lender_id: LenderId,
        filter: &FeedFilter,
    ) -> StorageResult<Vec<FeedItem>> {
        let tables = self.tables.read().await;
        let search = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut items: Vec<FeedItem> = tables
            .requests
            .values()
            .filter(|r| Tables::is_open(r))
            .filter(|r| {
                !tables
                    .proposals
                    .values()
                    .any(|p| p.loan_request_id == r.id && p.lender_id == lender_id)
            })
            .filter(|r| match &search {
                Some(term) => r.title.to_lowercase().contains(term.as_str()),
                None => true,
            })
            .filter(|r| {
                !filter.hide
                    || !tables
                        .overlays
                        .get(&(lender_id, r.id))
                        .is_some_and(LenderRequestOverlay::is_hidden)
            })
            .map(|r| tables.feed_item(lender_id, r))
            .collect();

        items.sort_by(|a, b| compare_feed_items(a, b, filter.sort, filter.order));

        Ok(items
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn open_totals(&self) -> StorageResult<OpenTotals> {
        let tables = self.tables.read().await;
        let open = tables.requests.values().filter(|r| Tables::is_open(r));
        let (total, aggregate_value) = open.fold((0i64, Decimal::ZERO), |(count, sum), r| {
            (count + 1, sum + r.value)
        });
        Ok(OpenTotals {
            total,
            aggregate_value,
        })
    }

    async fn get_open_request(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
    ) -> StorageResult<Option<FeedItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .get(&request_id)
            .filter(|r| Tables::is_open(r))
            .map(|r| tables.feed_item(lender_id, r)))
    }
}

#[async_trait]
impl CreditFactProvider for InMemoryStorage {
    async fn credit_fact(&self, borrower_id: BorrowerId) -> StorageResult<Option<CreditFact>> {
        let tables = self.tables.read().await;
        Ok(tables.credit_facts.get(&borrower_id).cloned())
    }
}

impl MatchStorage for InMemoryStorage {}
