use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{MatchError, MatchResult};
use crate::exposure::ExposureLimit;
use crate::loan_request::model::{LoanRequest, NewLoanRequest, RequestPatch, RequestSummary};
use crate::models::BorrowerId;
use crate::storage::{MatchStorage, RequestRemoval, RequestUpdate};

#[derive(Clone)]
pub struct RequestService {
    store: Arc<dyn MatchStorage>,
    limit: ExposureLimit,
}

impl RequestService {
    pub fn new(store: Arc<dyn MatchStorage>, limit: ExposureLimit) -> Self {
        Self { store, limit }
    }

    /// Create a pending request if the borrower's exposure admits it
    pub async fn create_request(
        &self,
        borrower_id: BorrowerId,
        input: NewLoanRequest,
    ) -> MatchResult<LoanRequest> {
        input.validate()?;

        let request = LoanRequest::pending(borrower_id, input);
        let value = request.value;

        match self
            .store
            .insert_request_within_cap(request, self.limit)
            .await?
            .into_result(&self.limit, value)
        {
            Ok(created) => {
                tracing::info!(
                    request_id = %created.id,
                    borrower_id = %borrower_id,
                    value = %created.value,
                    "Loan request created"
                );
                Ok(created)
            }
            Err(err) => {
                tracing::warn!(
                    borrower_id = %borrower_id,
                    value = %value,
                    cap = %self.limit.cap,
                    "Loan request rejected by exposure cap"
                );
                Err(err)
            }
        }
    }

    /// A request owned by the borrower
    pub async fn get_request(&self, borrower_id: BorrowerId, id: Uuid) -> MatchResult<LoanRequest> {
        self.store
            .get_request(id)
            .await?
            .filter(|r| r.borrower_id == borrower_id)
            .ok_or_else(|| MatchError::not_found("Loan request"))
    }

    /// The borrower's requests, newest first, with proposal counts
    pub async fn get_requests(&self, borrower_id: BorrowerId) -> MatchResult<Vec<RequestSummary>> {
        Ok(self.store.list_requests_for_borrower(borrower_id).await?)
    }

    pub async fn update_request(
        &self,
        borrower_id: BorrowerId,
        id: Uuid,
        patch: RequestPatch,
    ) -> MatchResult<LoanRequest> {
        // Sealed requests answer RequestSealed whatever the patch holds
        let current = self.get_request(borrower_id, id).await?;
        if current.is_sealed() {
            return Err(MatchError::RequestSealed);
        }

        if patch.is_empty() {
            return Err(MatchError::Validation(
                "Update must change at least one field".to_string(),
            ));
        }
        patch.validate()?;

        match self
            .store
            .update_request(borrower_id, id, &patch, self.limit)
            .await?
        {
            RequestUpdate::Updated(request) => {
                tracing::info!(request_id = %id, borrower_id = %borrower_id, "Loan request updated");
                Ok(request)
            }
            RequestUpdate::Missing => Err(MatchError::not_found("Loan request")),
            RequestUpdate::Sealed => Err(MatchError::RequestSealed),
            RequestUpdate::CapExceeded { open_exposure } => {
                let requested = patch.value.unwrap_or(current.value);
                tracing::warn!(
                    request_id = %id,
                    borrower_id = %borrower_id,
                    value = %requested,
                    "Loan request update rejected by exposure cap"
                );
                Err(MatchError::CapExceeded {
                    open_exposure,
                    requested,
                    cap: self.limit.cap,
                })
            }
        }
    }

    /// Delete an unsealed request along with its proposals
    pub async fn delete_request(&self, borrower_id: BorrowerId, id: Uuid) -> MatchResult<()> {
        match self.store.delete_request(borrower_id, id).await? {
            RequestRemoval::Deleted => {
                tracing::info!(request_id = %id, borrower_id = %borrower_id, "Loan request deleted");
                Ok(())
            }
            RequestRemoval::Missing => Err(MatchError::not_found("Loan request")),
            RequestRemoval::Sealed => Err(MatchError::RequestSealed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn service() -> RequestService {
        RequestService::new(
            Arc::new(InMemoryStorage::new()),
            ExposureLimit::new(dec!(250000)),
        )
    }

    fn input(title: &str, value: Decimal) -> NewLoanRequest {
        let now = Utc::now();
        NewLoanRequest {
            title: title.to_string(),
            description: "Expansion financing".to_string(),
            value,
            created_at: now,
            expire_at: now + Duration::days(60),
        }
    }

    #[tokio::test]
    async fn test_requests_are_scoped_to_owner() {
        let service = service();
        let owner = Uuid::new_v4();
        let created = service
            .create_request(owner, input("Forklifts", dec!(40000)))
            .await
            .unwrap();

        assert!(service.get_request(owner, created.id).await.is_ok());
        assert!(matches!(
            service.get_request(Uuid::new_v4(), created.id).await,
            Err(MatchError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_request(Uuid::new_v4(), created.id).await,
            Err(MatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_storage() {
        let service = service();
        let borrower = Uuid::new_v4();
        let result = service
            .create_request(borrower, input("Too small", dec!(500)))
            .await;
        assert!(matches!(result, Err(MatchError::Validation(_))));
        assert!(service.get_requests(borrower).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_rules() {
        let service = service();
        let borrower = Uuid::new_v4();
        let created = service
            .create_request(borrower, input("Cold storage", dec!(200000)))
            .await
            .unwrap();

        let empty = service
            .update_request(borrower, created.id, RequestPatch::default())
            .await;
        assert!(matches!(empty, Err(MatchError::Validation(_))));

        let raise = RequestPatch {
            value: Some(dec!(260000)),
            ..Default::default()
        };
        assert!(matches!(
            service.update_request(borrower, created.id, raise).await,
            Err(MatchError::CapExceeded { .. })
        ));

        // Own current value is excluded from the cap check
        let raise = RequestPatch {
            value: Some(dec!(250000)),
            ..Default::default()
        };
        let updated = service
            .update_request(borrower, created.id, raise)
            .await
            .unwrap();
        assert_eq!(updated.value, dec!(250000));
    }

    #[tokio::test]
    async fn test_summaries_count_proposals_and_include_zero() {
        let service = service();
        let borrower = Uuid::new_v4();
        service
            .create_request(borrower, input("A", dec!(10000)))
            .await
            .unwrap();
        service
            .create_request(borrower, input("B", dec!(20000)))
            .await
            .unwrap();

        let summaries = service.get_requests(borrower).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.proposals == 0));
    }
}
