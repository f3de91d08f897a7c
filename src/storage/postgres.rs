//! PostgreSQL storage implementation
//!
//! Schema lives in `migrations/`. Multi-statement operations run in one
//! transaction; dropping a transaction without commit rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::error::StorageResult;
use super::traits::*;
use crate::credit::{CreditFact, CreditFactProvider};
use crate::exposure::{ExposureLimit, Reservation};
use crate::feed::{like_pattern, FeedFilter, FeedItem, LenderRequestOverlay, OpenTotals};
use crate::loan_request::{LoanRequest, RequestPatch, RequestSummary};
use crate::models::{BorrowerId, LenderId, LoanStatus};
use crate::proposal::model::normalize_requirements;
use crate::proposal::{LenderProposal, LoanProposal, ProposalPatch};

const FEED_SELECT: &str = r#"
    SELECT r.id, r.borrower_id, r.title, r.description, r.value, r.created_at, r.expire_at,
           b.business_name, b.city, b.state, b.industry,
           c.score AS credit_score,
           o.favorite, o.hide
    FROM loan_requests r
    LEFT JOIN borrowers b ON b.id = r.borrower_id
    LEFT JOIN LATERAL (
        SELECT cr.score FROM credit_reports cr
        WHERE cr.borrower_id = r.borrower_id
        ORDER BY cr.expire_at DESC
        LIMIT 1
    ) c ON TRUE
    LEFT JOIN lender_loan_requests o
        ON o.loan_request_id = r.id AND o.lender_id = "#;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Serialise writers on one borrower's exposure until the transaction ends
    async fn lock_borrower(
        tx: &mut Transaction<'_, Postgres>,
        borrower_id: BorrowerId,
    ) -> StorageResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(borrower_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn exposure_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        borrower_id: BorrowerId,
        excluding: Option<Uuid>,
    ) -> StorageResult<Decimal> {
        let open = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(value), 0) FROM loan_requests
            WHERE borrower_id = $1
              AND funded_at IS NULL
              AND accepted_proposal_id IS NULL
              AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(borrower_id)
        .bind(excluding)
        .fetch_one(&mut **tx)
        .await?;
        Ok(open)
    }

    fn feed_select(lender_id: LenderId) -> QueryBuilder<'static, Postgres> {
        let mut query_builder = QueryBuilder::new(FEED_SELECT);
        query_builder.push_bind(lender_id);
        query_builder.push(" WHERE r.status = 'pending' AND r.funded_at IS NULL");
        query_builder
    }

    async fn upsert_overlay(
        &self,
        sql: &'static str,
        lender_id: LenderId,
        request_id: Uuid,
        flag: bool,
    ) -> StorageResult<Option<LenderRequestOverlay>> {
        let overlay = sqlx::query_as::<_, LenderRequestOverlay>(sql)
            .bind(lender_id)
            .bind(request_id)
            .bind(flag)
            .fetch_optional(&self.pool)
            .await?;
        Ok(overlay)
    }
}

#[async_trait]
impl RequestStorage for PostgresStorage {
    async fn insert_request_within_cap(
        &self,
        request: LoanRequest,
        limit: ExposureLimit,
    ) -> StorageResult<Reservation<LoanRequest>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_borrower(&mut tx, request.borrower_id).await?;

        let open_exposure = Self::exposure_in_tx(&mut tx, request.borrower_id, None).await?;
        if !limit.admits(open_exposure, request.value) {
            tx.rollback().await?;
            return Ok(Reservation::CapExceeded { open_exposure });
        }

        let created = sqlx::query_as::<_, LoanRequest>(
            r#"
            INSERT INTO loan_requests (
                id, borrower_id, title, description, value, created_at, expire_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(request.borrower_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.value)
        .bind(request.created_at)
        .bind(request.expire_at)
        .bind(LoanStatus::Pending)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Reservation::Reserved(created))
    }

    async fn open_exposure(&self, borrower_id: BorrowerId) -> StorageResult<Decimal> {
        let open = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(value), 0) FROM loan_requests
            WHERE borrower_id = $1 AND funded_at IS NULL AND accepted_proposal_id IS NULL
            "#,
        )
        .bind(borrower_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(open)
    }

    async fn get_request(&self, id: Uuid) -> StorageResult<Option<LoanRequest>> {
        let request = sqlx::query_as::<_, LoanRequest>("SELECT * FROM loan_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(request)
    }

    async fn list_requests_for_borrower(
        &self,
        borrower_id: BorrowerId,
    ) -> StorageResult<Vec<RequestSummary>> {
        let summaries = sqlx::query_as::<_, RequestSummary>(
            r#"
            SELECT r.*, COUNT(p.id) AS proposals
            FROM loan_requests r
            LEFT JOIN loan_proposals p ON p.loan_request_id = r.id
            WHERE r.borrower_id = $1
            GROUP BY r.id
            ORDER BY r.created_at DESC, r.id ASC
            "#,
        )
        .bind(borrower_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    async fn update_request(
        &self,
        borrower_id: BorrowerId,
        id: Uuid,
        patch: &RequestPatch,
        limit: ExposureLimit,
    ) -> StorageResult<RequestUpdate> {
        let mut tx = self.pool.begin().await?;
        Self::lock_borrower(&mut tx, borrower_id).await?;

        let current = sqlx::query_as::<_, LoanRequest>(
            "SELECT * FROM loan_requests WHERE id = $1 AND borrower_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(borrower_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = match current {
            Some(r) => r,
            None => return Ok(RequestUpdate::Missing),
        };
        if current.is_sealed() {
            return Ok(RequestUpdate::Sealed);
        }

        if let Some(value) = patch.value {
            if value > current.value {
                let others = Self::exposure_in_tx(&mut tx, borrower_id, Some(id)).await?;
                if !limit.admits(others, value) {
                    tx.rollback().await?;
                    return Ok(RequestUpdate::CapExceeded {
                        open_exposure: others,
                    });
                }
            }
        }

        let updated = sqlx::query_as::<_, LoanRequest>(
            r#"
            UPDATE loan_requests
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                value = COALESCE($5, value)
            WHERE id = $1 AND borrower_id = $2
              AND funded_at IS NULL AND accepted_proposal_id IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(borrower_id)
        .bind(patch.title.as_deref().map(str::trim))
        .bind(patch.description.as_deref().map(str::trim))
        .bind(patch.value)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(request) => {
                tx.commit().await?;
                Ok(RequestUpdate::Updated(request))
            }
            None => Ok(RequestUpdate::Sealed),
        }
    }

    async fn delete_request(
        &self,
        borrower_id: BorrowerId,
        id: Uuid,
    ) -> StorageResult<RequestRemoval> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, LoanRequest>(
            "SELECT * FROM loan_requests WHERE id = $1 AND borrower_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(borrower_id)
        .fetch_optional(&mut *tx)
        .await?;

        match current {
            None => return Ok(RequestRemoval::Missing),
            Some(r) if r.is_sealed() => return Ok(RequestRemoval::Sealed),
            Some(_) => {}
        }

        // Proposals and overlay rows go with it through ON DELETE CASCADE
        sqlx::query("DELETE FROM loan_requests WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RequestRemoval::Deleted)
    }

    async fn seal_request(
        &self,
        borrower_id: BorrowerId,
        request_id: Uuid,
        proposal_id: Uuid,
        funded_at: DateTime<Utc>,
    ) -> StorageResult<SealOutcome> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, LoanRequest>(
            r#"
            UPDATE loan_requests
            SET funded_at = $4, accepted_proposal_id = $3, status = 'active'
            WHERE id = $1 AND borrower_id = $2 AND funded_at IS NULL
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(borrower_id)
        .bind(proposal_id)
        .bind(funded_at)
        .fetch_optional(&mut *tx)
        .await?;

        let request = match request {
            Some(r) => r,
            None => {
                tx.rollback().await?;
                return Ok(SealOutcome::NotFoundOrAlreadySealed);
            }
        };

        // Row lock: a concurrent delete or edit of the winner waits, then finds it active
        let winner = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM loan_proposals WHERE id = $1 AND loan_request_id = $2 FOR UPDATE",
        )
        .bind(proposal_id)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;

        if winner.is_none() {
            tx.rollback().await?;
            return Ok(SealOutcome::ProposalNotFound);
        }

        let mut proposals = sqlx::query_as::<_, LoanProposal>(
            r#"
            UPDATE loan_proposals
            SET status = CASE WHEN id = $2 THEN 'active'::loan_status
                              ELSE 'rejected'::loan_status END
            WHERE loan_request_id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(proposal_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(SealOutcome::Sealed { request, proposals })
    }
}

#[async_trait]
impl ProposalStorage for PostgresStorage {
    async fn insert_proposal(&self, proposal: LoanProposal) -> StorageResult<ProposalInsert> {
        let mut tx = self.pool.begin().await?;

        // Shared row lock: an acceptance on this request waits for us, and we for it
        let request = sqlx::query_as::<_, LoanRequest>(
            "SELECT * FROM loan_requests WHERE id = $1 FOR SHARE",
        )
        .bind(proposal.loan_request_id)
        .fetch_optional(&mut *tx)
        .await?;

        match request {
            None => return Ok(ProposalInsert::RequestMissing),
            Some(r) if r.is_sealed() || r.status != LoanStatus::Pending => {
                return Ok(ProposalInsert::RequestSealed)
            }
            Some(_) => {}
        }

        let created = sqlx::query_as::<_, LoanProposal>(
            r#"
            INSERT INTO loan_proposals (
                id, lender_id, loan_request_id, title, description, requirements,
                loan_amount, interest_rate, repayment_term, created_at, expire_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.lender_id)
        .bind(proposal.loan_request_id)
        .bind(&proposal.title)
        .bind(&proposal.description)
        .bind(&proposal.requirements)
        .bind(proposal.loan_amount)
        .bind(proposal.interest_rate)
        .bind(proposal.repayment_term)
        .bind(proposal.created_at)
        .bind(proposal.expire_at)
        .bind(LoanStatus::Pending)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ProposalInsert::Created(created))
    }

    async fn get_proposal(&self, id: Uuid) -> StorageResult<Option<LoanProposal>> {
        let proposal =
            sqlx::query_as::<_, LoanProposal>("SELECT * FROM loan_proposals WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(proposal)
    }

    async fn list_proposals_for_request(
        &self,
        request_id: Uuid,
    ) -> StorageResult<Vec<LoanProposal>> {
        let proposals = sqlx::query_as::<_, LoanProposal>(
            "SELECT * FROM loan_proposals WHERE loan_request_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(proposals)
    }

    async fn list_proposals_for_lender(
        &self,
        lender_id: LenderId,
    ) -> StorageResult<Vec<LenderProposal>> {
        let proposals = sqlx::query_as::<_, LenderProposal>(
            r#"
            SELECT p.*, r.borrower_id
            FROM loan_proposals p
            JOIN loan_requests r ON r.id = p.loan_request_id
            WHERE p.lender_id = $1
            ORDER BY p.created_at DESC, p.id ASC
            "#,
        )
        .bind(lender_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(proposals)
    }

    async fn get_lender_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
    ) -> StorageResult<Option<LenderProposal>> {
        let proposal = sqlx::query_as::<_, LenderProposal>(
            r#"
            SELECT p.*, r.borrower_id
            FROM loan_proposals p
            JOIN loan_requests r ON r.id = p.loan_request_id
            WHERE p.id = $1 AND p.lender_id = $2
            "#,
        )
        .bind(id)
        .bind(lender_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(proposal)
    }

    async fn update_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
        patch: &ProposalPatch,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<ProposalUpdate> {
        let updated = sqlx::query_as::<_, LoanProposal>(
            r#"
            UPDATE loan_proposals
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                requirements = CASE WHEN $5 THEN $6 ELSE requirements END,
                loan_amount = COALESCE($7, loan_amount),
                interest_rate = COALESCE($8, interest_rate),
                repayment_term = COALESCE($9, repayment_term),
                update_at = $10
            WHERE id = $1 AND lender_id = $2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lender_id)
        .bind(patch.title.as_deref().map(str::trim))
        .bind(patch.description.as_deref().map(str::trim))
        .bind(patch.requirements.is_some())
        .bind(normalize_requirements(patch.requirements.clone()))
        .bind(patch.loan_amount)
        .bind(patch.interest_rate)
        .bind(patch.repayment_term)
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(proposal) = updated {
            return Ok(ProposalUpdate::Updated(proposal));
        }

        let existing = sqlx::query_scalar::<_, LoanStatus>(
            "SELECT status FROM loan_proposals WHERE id = $1 AND lender_id = $2",
        )
        .bind(id)
        .bind(lender_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match existing {
            Some(_) => ProposalUpdate::Locked,
            None => ProposalUpdate::Missing,
        })
    }

    async fn delete_proposal(
        &self,
        lender_id: LenderId,
        id: Uuid,
    ) -> StorageResult<ProposalRemoval> {
        let result = sqlx::query(
            "DELETE FROM loan_proposals WHERE id = $1 AND lender_id = $2 AND status = 'pending'",
        )
        .bind(id)
        .bind(lender_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ProposalRemoval::Deleted);
        }

        let existing = sqlx::query_scalar::<_, LoanStatus>(
            "SELECT status FROM loan_proposals WHERE id = $1 AND lender_id = $2",
        )
        .bind(id)
        .bind(lender_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match existing {
            Some(_) => ProposalRemoval::Locked,
            None => ProposalRemoval::Missing,
        })
    }
}

#[async_trait]
impl OverlayStorage for PostgresStorage {
    async fn set_hide(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        hide: bool,
    ) -> StorageResult<Option<LenderRequestOverlay>> {
        self.upsert_overlay(
            r#"
            INSERT INTO lender_loan_requests (lender_id, loan_request_id, hide)
            SELECT $1, r.id, $3 FROM loan_requests r WHERE r.id = $2
            ON CONFLICT (lender_id, loan_request_id) DO UPDATE SET hide = EXCLUDED.hide
            RETURNING *
            "#,
            lender_id,
            request_id,
            hide,
        )
        .await
    }

    async fn set_favorite(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        favorite: bool,
    ) -> StorageResult<Option<LenderRequestOverlay>> {
        self.upsert_overlay(
            r#"
            INSERT INTO lender_loan_requests (lender_id, loan_request_id, favorite)
            SELECT $1, r.id, $3 FROM loan_requests r WHERE r.id = $2
            ON CONFLICT (lender_id, loan_request_id) DO UPDATE SET favorite = EXCLUDED.favorite
            RETURNING *
            "#,
            lender_id,
            request_id,
            favorite,
        )
        .await
    }

    async fn get_overlay(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
    ) -> StorageResult<Option<LenderRequestOverlay>> {
        let overlay = sqlx::query_as::<_, LenderRequestOverlay>(
            "SELECT * FROM lender_loan_requests WHERE lender_id = $1 AND loan_request_id = $2",
        )
        .bind(lender_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(overlay)
    }
}

#[async_trait]
impl FeedStorage for PostgresStorage {
    async fn list_open_requests(
        &self,
        lender_id: LenderId,
        filter: &FeedFilter,
    ) -> StorageResult<Vec<FeedItem>> {
        let mut query_builder = Self::feed_select(lender_id);

        query_builder.push(
            " AND NOT EXISTS (SELECT 1 FROM loan_proposals p WHERE p.loan_request_id = r.id AND p.lender_id = ",
        );
        query_builder.push_bind(lender_id);
        query_builder.push(")");

        if filter.hide {
            query_builder.push(" AND o.hide IS NOT TRUE");
        }

        if let Some(term) = &filter.search {
            query_builder.push(" AND r.title ILIKE ");
            query_builder.push_bind(like_pattern(term));
            query_builder.push(" ESCAPE '\\'");
        }

        // Column and direction come from fixed enum mappings, never from input
        query_builder.push(format!(
            " ORDER BY {} {}, r.id ASC LIMIT ",
            filter.sort.as_column(),
            filter.order.as_sql()
        ));
        query_builder.push_bind(filter.limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(filter.offset);

        let items = query_builder
            .build_query_as::<FeedItem>()
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn open_totals(&self) -> StorageResult<OpenTotals> {
        let totals = sqlx::query_as::<_, OpenTotals>(
            r#"
            SELECT COUNT(*) AS total, COALESCE(SUM(value), 0) AS aggregate_value
            FROM loan_requests
            WHERE status = 'pending' AND funded_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    async fn get_open_request(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
    ) -> StorageResult<Option<FeedItem>> {
        let mut query_builder = Self::feed_select(lender_id);
        query_builder.push(" AND r.id = ");
        query_builder.push_bind(request_id);

        let item = query_builder
            .build_query_as::<FeedItem>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }
}

#[async_trait]
impl CreditFactProvider for PostgresStorage {
    async fn credit_fact(&self, borrower_id: BorrowerId) -> StorageResult<Option<CreditFact>> {
        let fact = sqlx::query_as::<_, CreditFact>(
            r#"
            SELECT borrower_id, score, expire_at AS valid_until
            FROM credit_reports
            WHERE borrower_id = $1
            ORDER BY expire_at DESC
            LIMIT 1
            "#,
        )
        .bind(borrower_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(fact)
    }
}

impl MatchStorage for PostgresStorage {}
