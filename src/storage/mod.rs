//! Storage layer for the loan matching engine
//!
//! Provides persistent storage for requests, proposals, lender overlays and
//! the feed queries over them.

mod error;
mod memory;
mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{
    FeedStorage, MatchStorage, OverlayStorage, ProposalInsert, ProposalRemoval, ProposalStorage,
    ProposalUpdate, RequestRemoval, RequestStorage, RequestUpdate, SealOutcome,
};
