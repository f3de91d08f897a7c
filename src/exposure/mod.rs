//! Exposure ledger
//!
//! Tracks, per borrower, the aggregate value of requests that are not yet
//! sealed and enforces the funding cap. The arithmetic lives here; the
//! storage backend runs it inside the same transaction as the insert so the
//! check and the write cannot be separated by a concurrent creation.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{MatchError, MatchResult};
use crate::models::BorrowerId;
use crate::storage::MatchStorage;

/// Cap applied when `EXPOSURE_CAP` is not configured
pub const DEFAULT_EXPOSURE_CAP: Decimal = Decimal::from_parts(250_000, 0, 0, false, 0);

/// The exposure cap a borrower's open requests must stay within
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExposureLimit {
    pub cap: Decimal,
}

impl ExposureLimit {
    pub fn new(cap: Decimal) -> Self {
        Self { cap }
    }

    /// Whether `proposed` can be added on top of `open_exposure`
    pub fn admits(&self, open_exposure: Decimal, proposed: Decimal) -> bool {
        open_exposure + proposed <= self.cap
    }

    /// `Ok` when admitted, `CapExceeded` otherwise
    pub fn check(&self, open_exposure: Decimal, proposed: Decimal) -> MatchResult<()> {
        if self.admits(open_exposure, proposed) {
            Ok(())
        } else {
            Err(MatchError::CapExceeded {
                open_exposure,
                requested: proposed,
                cap: self.cap,
            })
        }
    }
}

impl Default for ExposureLimit {
    fn default() -> Self {
        Self::new(DEFAULT_EXPOSURE_CAP)
    }
}

/// Outcome of an atomic check-and-write against the ledger
#[derive(Debug, Clone)]
pub enum Reservation<T> {
    /// The write happened
    Reserved(T),
    /// Nothing was written; the borrower's open exposure at check time
    CapExceeded { open_exposure: Decimal },
}

impl<T> Reservation<T> {
    /// Convert into a result, attaching the cap context to a rejection
    pub fn into_result(self, limit: &ExposureLimit, requested: Decimal) -> MatchResult<T> {
        match self {
            Reservation::Reserved(value) => Ok(value),
            Reservation::CapExceeded { open_exposure } => Err(MatchError::CapExceeded {
                open_exposure,
                requested,
                cap: limit.cap,
            }),
        }
    }
}

/// Read side of the ledger plus the configured limit
#[derive(Clone)]
pub struct ExposureLedger {
    store: Arc<dyn MatchStorage>,
    limit: ExposureLimit,
}

impl ExposureLedger {
    pub fn new(store: Arc<dyn MatchStorage>, limit: ExposureLimit) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> ExposureLimit {
        self.limit
    }

    /// Sum of the borrower's unsealed request values
    pub async fn open_exposure(&self, borrower_id: BorrowerId) -> MatchResult<Decimal> {
        Ok(self.store.open_exposure(borrower_id).await?)
    }

    /// Advisory pre-check with no side effects.
    ///
    /// The binding check is repeated by storage inside the creating
    /// transaction; this one only lets callers reject early.
    pub async fn check_and_reserve(
        &self,
        borrower_id: BorrowerId,
        proposed_value: Decimal,
    ) -> MatchResult<()> {
        let open = self.open_exposure(borrower_id).await?;
        self.limit.check(open, proposed_value)
    }

    /// Remaining headroom under the cap, never negative
    pub async fn headroom(&self, borrower_id: BorrowerId) -> MatchResult<Decimal> {
        let open = self.open_exposure(borrower_id).await?;
        Ok((self.limit.cap - open).max(Decimal::ZERO))
    }
}
