//! Exposure cap tests over the in-memory backend

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use futures_util::future::join_all;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use loanmatch_engine::exposure::ExposureLimit;
    use loanmatch_engine::loan_request::NewLoanRequest;
    use loanmatch_engine::proposal::ProposalTerms;
    use loanmatch_engine::storage::{InMemoryStorage, MatchStorage};
    use loanmatch_engine::{AppState, MatchError};

    fn engine() -> AppState {
        let store: Arc<dyn MatchStorage> = Arc::new(InMemoryStorage::new());
        AppState::new(store, ExposureLimit::new(dec!(250000)), 20)
    }

    fn request(title: &str, value: Decimal) -> NewLoanRequest {
        let now = Utc::now();
        NewLoanRequest {
            title: title.to_string(),
            description: "Working capital".to_string(),
            value,
            created_at: now,
            expire_at: now + Duration::days(30),
        }
    }

    fn terms(amount: Decimal) -> ProposalTerms {
        let now = Utc::now();
        ProposalTerms {
            title: "Term loan".to_string(),
            description: "Fixed rate".to_string(),
            requirements: None,
            loan_amount: amount,
            interest_rate: dec!(0.06),
            repayment_term: 24,
            created_at: now,
            expire_at: now + Duration::days(10),
        }
    }

    #[tokio::test]
    async fn test_cap_rejects_request_over_limit() {
        let engine = engine();
        let borrower = Uuid::new_v4();

        engine
            .requests
            .create_request(borrower, request("Plant expansion", dec!(150000)))
            .await
            .unwrap();
        engine
            .requests
            .create_request(borrower, request("Fleet", dec!(90000)))
            .await
            .unwrap();

        let result = engine
            .requests
            .create_request(borrower, request("Warehouse", dec!(20000)))
            .await;

        match result {
            Err(MatchError::CapExceeded {
                open_exposure,
                requested,
                cap,
            }) => {
                assert_eq!(open_exposure, dec!(240000));
                assert_eq!(requested, dec!(20000));
                assert_eq!(cap, dec!(250000));
            }
            other => panic!("expected CapExceeded, got {:?}", other),
        }

        // Nothing was written by the rejected call
        assert_eq!(
            engine.exposure.open_exposure(borrower).await.unwrap(),
            dec!(240000)
        );
        assert_eq!(engine.requests.get_requests(borrower).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cap_is_per_borrower() {
        let engine = engine();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        engine
            .requests
            .create_request(first, request("A", dec!(250000)))
            .await
            .unwrap();
        engine
            .requests
            .create_request(second, request("B", dec!(250000)))
            .await
            .unwrap();

        assert!(engine
            .exposure
            .check_and_reserve(first, dec!(1))
            .await
            .is_err());
        assert_eq!(engine.exposure.headroom(second).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_sealed_request_releases_exposure() {
        let engine = engine();
        let borrower = Uuid::new_v4();

        let funded = engine
            .requests
            .create_request(borrower, request("Funded", dec!(240000)))
            .await
            .unwrap();
        let proposal = engine
            .proposals
            .create_proposal(Uuid::new_v4(), funded.id, terms(dec!(240000)))
            .await
            .unwrap();

        assert!(engine
            .exposure
            .check_and_reserve(borrower, dec!(20000))
            .await
            .is_err());

        engine
            .acceptance
            .accept_proposal(borrower, funded.id, proposal.id)
            .await
            .unwrap();

        assert_eq!(
            engine.exposure.open_exposure(borrower).await.unwrap(),
            Decimal::ZERO
        );
        engine
            .requests
            .create_request(borrower, request("Next", dec!(20000)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deleted_request_releases_exposure() {
        let engine = engine();
        let borrower = Uuid::new_v4();

        let created = engine
            .requests
            .create_request(borrower, request("Temporary", dec!(250000)))
            .await
            .unwrap();
        engine
            .requests
            .delete_request(borrower, created.id)
            .await
            .unwrap();

        assert_eq!(
            engine.exposure.open_exposure(borrower).await.unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creations_never_exceed_cap() {
        let engine = engine();
        let borrower = Uuid::new_v4();

        let handles = (0..20).map(|i| {
            let requests = engine.requests.clone();
            tokio::spawn(async move {
                requests
                    .create_request(borrower, request(&format!("Batch {}", i), dec!(20000)))
                    .await
            })
        });

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let capped = results
            .iter()
            .filter(|r| matches!(r, Err(MatchError::CapExceeded { .. })))
            .count();

        assert_eq!(accepted, 12);
        assert_eq!(capped, 8);
        assert_eq!(
            engine.exposure.open_exposure(borrower).await.unwrap(),
            dec!(240000)
        );
    }
}
