//! Loan request lifecycle
//!
//! Borrowers create requests (gated by the exposure cap), read them back with
//! proposal counts, and may update or delete them until an acceptance seals
//! the request.

pub mod model;
pub mod service;

pub use model::{LoanRequest, NewLoanRequest, RequestPatch, RequestSummary, MIN_REQUEST_VALUE};
pub use service::RequestService;
