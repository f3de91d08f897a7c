//! Engine state shared by every caller

use std::sync::Arc;

use crate::acceptance::AcceptanceCoordinator;
use crate::config::Config;
use crate::exposure::{ExposureLedger, ExposureLimit};
use crate::feed::LenderFeed;
use crate::loan_request::RequestService;
use crate::proposal::ProposalService;
use crate::storage::MatchStorage;

/// The engine's services, all sharing one storage handle
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MatchStorage>,
    pub exposure: ExposureLedger,
    pub requests: RequestService,
    pub proposals: ProposalService,
    pub acceptance: AcceptanceCoordinator,
    pub feed: LenderFeed,
}

impl AppState {
    pub fn new(store: Arc<dyn MatchStorage>, limit: ExposureLimit, feed_default_limit: u32) -> Self {
        Self {
            exposure: ExposureLedger::new(store.clone(), limit),
            requests: RequestService::new(store.clone(), limit),
            proposals: ProposalService::new(store.clone()),
            acceptance: AcceptanceCoordinator::new(store.clone()),
            feed: LenderFeed::new(store.clone(), feed_default_limit),
            store,
        }
    }

    /// Wire the services from loaded configuration
    pub fn from_config(store: Arc<dyn MatchStorage>, config: &Config) -> Self {
        Self::new(
            store,
            ExposureLimit::new(config.exposure_cap),
            config.feed_default_limit,
        )
    }
}
