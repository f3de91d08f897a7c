//! Lender feed tests over the in-memory backend

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use loanmatch_engine::credit::CreditFact;
    use loanmatch_engine::exposure::ExposureLimit;
    use loanmatch_engine::feed::FeedQuery;
    use loanmatch_engine::loan_request::{LoanRequest, NewLoanRequest};
    use loanmatch_engine::models::BorrowerProfile;
    use loanmatch_engine::proposal::ProposalTerms;
    use loanmatch_engine::storage::{InMemoryStorage, MatchStorage};
    use loanmatch_engine::{AppState, MatchError};

    struct Fixture {
        storage: InMemoryStorage,
        engine: AppState,
    }

    fn fixture() -> Fixture {
        let storage = InMemoryStorage::new();
        let store: Arc<dyn MatchStorage> = Arc::new(storage.clone());
        Fixture {
            storage,
            engine: AppState::new(store, ExposureLimit::default(), 20),
        }
    }

    async fn post(f: &Fixture, title: &str, value: Decimal) -> LoanRequest {
        let now = Utc::now();
        f.engine
            .requests
            .create_request(
                Uuid::new_v4(),
                NewLoanRequest {
                    title: title.to_string(),
                    description: format!("{} financing", title),
                    value,
                    created_at: now,
                    expire_at: now + Duration::days(30),
                },
            )
            .await
            .unwrap()
    }

    fn terms() -> ProposalTerms {
        let now = Utc::now();
        ProposalTerms {
            title: "Offer".to_string(),
            description: "Standard terms".to_string(),
            requirements: None,
            loan_amount: dec!(10000),
            interest_rate: dec!(0.09),
            repayment_term: 12,
            created_at: now,
            expire_at: now + Duration::days(5),
        }
    }

    #[tokio::test]
    async fn test_search_sorted_by_value_desc() {
        let f = fixture();
        let lender = Uuid::new_v4();

        post(&f, "Steel mill retrofit", dec!(90000)).await;
        post(&f, "STEEL beams", dec!(40000)).await;
        post(&f, "Stainless steel tanks", dec!(120000)).await;
        post(&f, "Bakery ovens", dec!(30000)).await;
        let proposed = post(&f, "Steel coil line", dec!(200000)).await;

        f.engine
            .proposals
            .create_proposal(lender, proposed.id, terms())
            .await
            .unwrap();

        let page = f
            .engine
            .feed
            .list_open_requests(
                lender,
                FeedQuery {
                    search: Some("Steel".to_string()),
                    sort: Some("value".to_string()),
                    order: Some("desc".to_string()),
                    limit: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(page.items.len() <= 10);
        assert_eq!(page.items_count, page.items.len());
        assert_eq!(page.items.len(), 3);
        assert!(page
            .items
            .iter()
            .all(|item| item.title.to_lowercase().contains("steel")));
        assert!(page.items.windows(2).all(|w| w[0].value > w[1].value));
        assert!(page.items.iter().all(|item| item.id != proposed.id));
    }

    #[tokio::test]
    async fn test_hidden_requests_are_excluded_by_default() {
        let f = fixture();
        let lender = Uuid::new_v4();
        let hidden = post(&f, "Hidden", dec!(10000)).await;
        post(&f, "Visible", dec!(10000)).await;

        f.engine.feed.set_hide(lender, hidden.id, true).await.unwrap();

        let default_page = f
            .engine
            .feed
            .list_open_requests(lender, FeedQuery::default())
            .await
            .unwrap();
        assert!(default_page.items.iter().all(|i| i.id != hidden.id));

        let unfiltered = f
            .engine
            .feed
            .list_open_requests(
                lender,
                FeedQuery {
                    hide: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let row = unfiltered
            .items
            .iter()
            .find(|i| i.id == hidden.id)
            .expect("hidden request present when hide = false");
        assert_eq!(row.hide, Some(true));

        // Another lender's view is unaffected
        let other = f
            .engine
            .feed
            .list_open_requests(Uuid::new_v4(), FeedQuery::default())
            .await
            .unwrap();
        assert!(other.items.iter().any(|i| i.id == hidden.id));
    }

    #[tokio::test]
    async fn test_unhide_and_favorite_are_independent() {
        let f = fixture();
        let lender = Uuid::new_v4();
        let request = post(&f, "Greenhouse", dec!(25000)).await;

        f.engine.feed.set_hide(lender, request.id, true).await.unwrap();
        f.engine
            .feed
            .set_favorite(lender, request.id, true)
            .await
            .unwrap();
        let overlay = f.engine.feed.set_hide(lender, request.id, false).await.unwrap();
        assert_eq!(overlay.hide, Some(false));
        assert_eq!(overlay.favorite, Some(true));

        let item = f
            .engine
            .feed
            .get_open_request(lender, request.id)
            .await
            .unwrap();
        assert_eq!(item.favorite, Some(true));
        assert_eq!(item.hide, Some(false));
    }

    #[tokio::test]
    async fn test_totals_cover_all_open_requests() {
        let f = fixture();
        let lender = Uuid::new_v4();
        let a = post(&f, "A", dec!(10000)).await;
        post(&f, "B", dec!(15000)).await;

        f.engine.feed.set_hide(lender, a.id, true).await.unwrap();

        let page = f
            .engine
            .feed
            .list_open_requests(lender, FeedQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.aggregate_value, dec!(25000));
        assert_eq!(page.items_count, 1);
    }

    #[tokio::test]
    async fn test_sealed_requests_leave_the_feed() {
        let f = fixture();
        let borrower = Uuid::new_v4();
        let now = Utc::now();
        let request = f
            .engine
            .requests
            .create_request(
                borrower,
                NewLoanRequest {
                    title: "Delivery vans".to_string(),
                    description: "Three vans".to_string(),
                    value: dec!(60000),
                    created_at: now,
                    expire_at: now + Duration::days(30),
                },
            )
            .await
            .unwrap();
        let proposal = f
            .engine
            .proposals
            .create_proposal(Uuid::new_v4(), request.id, terms())
            .await
            .unwrap();
        f.engine
            .acceptance
            .accept_proposal(borrower, request.id, proposal.id)
            .await
            .unwrap();

        let page = f
            .engine
            .feed
            .list_open_requests(Uuid::new_v4(), FeedQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(matches!(
            f.engine
                .feed
                .get_open_request(Uuid::new_v4(), request.id)
                .await,
            Err(MatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sort_by_credit_score_puts_unscored_last_ascending() {
        let f = fixture();
        let lender = Uuid::new_v4();
        let scored = post(&f, "Scored", dec!(10000)).await;
        let unscored = post(&f, "Unscored", dec!(10000)).await;

        f.storage
            .upsert_borrower(BorrowerProfile {
                id: scored.borrower_id,
                business_name: Some("Acme Forge".to_string()),
                state: Some("OH".to_string()),
                industry: Some("Manufacturing".to_string()),
                ..Default::default()
            })
            .await;
        f.storage
            .record_credit_fact(CreditFact {
                borrower_id: scored.borrower_id,
                score: 720,
                valid_until: Utc::now() + Duration::days(30),
            })
            .await;

        let ascending = f
            .engine
            .feed
            .list_open_requests(
                lender,
                FeedQuery {
                    sort: Some("credit_score".to_string()),
                    order: Some("asc".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<Uuid> = ascending.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![scored.id, unscored.id]);
        assert_eq!(ascending.items[0].credit_score, Some(720));
        assert_eq!(ascending.items[0].business_name.as_deref(), Some("Acme Forge"));

        let descending = f
            .engine
            .feed
            .list_open_requests(
                lender,
                FeedQuery {
                    sort: Some("credit_score".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(descending.items[0].id, unscored.id);
    }

    #[tokio::test]
    async fn test_pagination() {
        let f = fixture();
        let lender = Uuid::new_v4();
        for i in 0..5 {
            post(&f, &format!("Request {}", i), Decimal::from(10_000 + i)).await;
        }

        let query = |offset| FeedQuery {
            sort: Some("value".to_string()),
            order: Some("asc".to_string()),
            limit: Some(2),
            offset: Some(offset),
            ..Default::default()
        };

        let first = f.engine.feed.list_open_requests(lender, query(0)).await.unwrap();
        let third = f.engine.feed.list_open_requests(lender, query(4)).await.unwrap();
        assert_eq!(first.items_count, 2);
        assert_eq!(first.items[0].value, dec!(10000));
        assert_eq!(third.items_count, 1);
        assert_eq!(third.items[0].value, dec!(10004));
        assert_eq!(third.total, 5);
    }

    #[tokio::test]
    async fn test_invalid_sort_lists_valid_values() {
        let f = fixture();
        let result = f
            .engine
            .feed
            .list_open_requests(
                Uuid::new_v4(),
                FeedQuery {
                    sort: Some("r.id; --".to_string()),
                    ..Default::default()
                },
            )
            .await;
        match result {
            Err(MatchError::Validation(msg)) => assert!(msg.contains("title")),
            other => panic!("expected validation error, got {:?}", other.map(|p| p.total)),
        }
    }
}
