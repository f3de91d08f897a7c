//! Loan Matching Engine Library
//!
//! Borrowers post funding requests, lenders propose against them, and each
//! request accepts exactly one proposal. This library exports the services
//! and storage backends that enforce those rules.

pub mod acceptance;
pub mod config;
pub mod credit;
pub mod db;
pub mod error;
pub mod exposure;
pub mod feed;
pub mod loan_request;
pub mod models;
pub mod proposal;
pub mod state;
pub mod storage;

pub use error::{MatchError, MatchResult};
pub use state::AppState;
