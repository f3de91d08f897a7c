use std::sync::Arc;
use uuid::Uuid;

use crate::error::{MatchError, MatchResult};
use crate::feed::model::{FeedItem, FeedPage, FeedQuery, LenderRequestOverlay};
use crate::models::LenderId;
use crate::storage::MatchStorage;

/// Composes the lender-facing view of open requests
#[derive(Clone)]
pub struct LenderFeed {
    store: Arc<dyn MatchStorage>,
    default_limit: u32,
}

impl LenderFeed {
    pub fn new(store: Arc<dyn MatchStorage>, default_limit: u32) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    /// One page of open requests the lender has not proposed on
    pub async fn list_open_requests(
        &self,
        lender_id: LenderId,
        query: FeedQuery,
    ) -> MatchResult<FeedPage> {
        let filter = query.into_filter(self.default_limit)?;

        let totals = self.store.open_totals().await?;
        let items = self.store.list_open_requests(lender_id, &filter).await?;

        tracing::debug!(
            lender_id = %lender_id,
            sort = %filter.sort,
            returned = items.len(),
            total = totals.total,
            "Lender feed listed"
        );
        Ok(FeedPage::new(totals, items))
    }

    /// A single open request with the lender's marks
    pub async fn get_open_request(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
    ) -> MatchResult<FeedItem> {
        self.store
            .get_open_request(lender_id, request_id)
            .await?
            .ok_or_else(|| MatchError::not_found("Open loan request"))
    }

    pub async fn set_hide(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        hide: bool,
    ) -> MatchResult<LenderRequestOverlay> {
        let overlay = self
            .store
            .set_hide(lender_id, request_id, hide)
            .await?
            .ok_or_else(|| MatchError::not_found("Loan request"))?;
        tracing::debug!(lender_id = %lender_id, request_id = %request_id, hide, "Hide flag set");
        Ok(overlay)
    }

    pub async fn set_favorite(
        &self,
        lender_id: LenderId,
        request_id: Uuid,
        favorite: bool,
    ) -> MatchResult<LenderRequestOverlay> {
        let overlay = self
            .store
            .set_favorite(lender_id, request_id, favorite)
            .await?
            .ok_or_else(|| MatchError::not_found("Loan request"))?;
        tracing::debug!(
            lender_id = %lender_id,
            request_id = %request_id,
            favorite,
            "Favorite flag set"
        );
        Ok(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn test_unknown_sort_is_rejected() {
        let feed = LenderFeed::new(Arc::new(InMemoryStorage::new()), 20);
        let query = FeedQuery {
            sort: Some("borrower_id".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            feed.list_open_requests(Uuid::new_v4(), query).await,
            Err(MatchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_overlay_on_missing_request() {
        let feed = LenderFeed::new(Arc::new(InMemoryStorage::new()), 20);
        assert!(matches!(
            feed.set_favorite(Uuid::new_v4(), Uuid::new_v4(), true).await,
            Err(MatchError::NotFound(_))
        ));
        assert!(matches!(
            feed.get_open_request(Uuid::new_v4(), Uuid::new_v4()).await,
            Err(MatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_feed() {
        let feed = LenderFeed::new(Arc::new(InMemoryStorage::new()), 20);
        let page = feed
            .list_open_requests(Uuid::new_v4(), FeedQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.items_count, 0);
        assert!(page.items.is_empty());
    }
}
