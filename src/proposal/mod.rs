//! Loan proposal lifecycle
//!
//! Lenders propose against open requests and may revise or withdraw a
//! proposal while it is pending. Acceptance settles every proposal on a
//! request, after which none of them change.

pub mod model;
pub mod service;

pub use model::{LenderProposal, LoanProposal, ProposalPatch, ProposalTerms};
pub use service::ProposalService;
