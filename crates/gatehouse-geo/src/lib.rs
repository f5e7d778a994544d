pub mod reputation;
pub mod reputation_service;
pub mod vpnapi;

pub use reputation::{LookupOutcome, ReputationRecord, UNKNOWN};
pub use reputation_service::{
    MockReputationProvider, ReputationError, ReputationLookup, ReputationProvider,
    ReputationService, MISSING_KEY_NOTE, NO_CLIENT_IP_NOTE,
};
pub use vpnapi::VpnApiClient;
