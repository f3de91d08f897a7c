//! Lender feed
//!
//! Read-only view of open requests for one lender, with that lender's
//! hide/favorite overlay applied and already-proposed requests removed.

pub mod model;
pub mod service;

pub use model::{
    like_pattern, FeedFilter, FeedItem, FeedPage, FeedQuery, LenderRequestOverlay, OpenTotals,
    SortField, SortOrder, MAX_SEARCH_LEN,
};
pub use service::LenderFeed;
