use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::reputation::{LookupOutcome, ReputationRecord, UNKNOWN};
use crate::vpnapi::VpnApiClient;

pub const NO_CLIENT_IP_NOTE: &str = "No client IP detected!";
pub const MISSING_KEY_NOTE: &str = "Missing VPNAPI_KEY in environment variables!";

#[derive(Error, Debug)]
pub enum ReputationError {
    #[error("invalid client address: {0}")]
    InvalidAddress(String),
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<ReputationError> for gatehouse_core::ServiceError {
    fn from(error: ReputationError) -> Self {
        gatehouse_core::ServiceError::ExternalService {
            service: "reputation".to_string(),
            message: error.to_string(),
        }
    }
}

/// Trait for classifying a client address by geography and anonymization network
#[async_trait]
pub trait ReputationLookup: Send + Sync {
    /// Never fails: every fault degrades to [`LookupOutcome::Undetermined`]
    async fn lookup(&self, client_ip: &str) -> LookupOutcome;
}

pub enum ReputationProvider {
    VpnApi(VpnApiClient),
    Mock(MockReputationProvider),
}

impl ReputationProvider {
    pub async fn lookup(&self, client_ip: &str) -> Result<ReputationRecord, ReputationError> {
        match self {
            Self::VpnApi(client) => client.lookup(client_ip).await,
            Self::Mock(mock) => mock.lookup(client_ip),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::VpnApi(_) => "vpnapi",
            Self::Mock(_) => "mock",
        }
    }
}

/// Mock reputation provider for local development.
///
/// Loopback and private addresses resolve to a clean record in the configured
/// country; every other address resolves to an unknown country.
pub struct MockReputationProvider {
    home_country: String,
}

impl MockReputationProvider {
    pub fn new(home_country: impl Into<String>) -> Self {
        Self {
            home_country: home_country.into(),
        }
    }

    pub fn lookup(&self, client_ip: &str) -> Result<ReputationRecord, ReputationError> {
        let ip: IpAddr = client_ip
            .trim()
            .parse()
            .map_err(|_| ReputationError::InvalidAddress(client_ip.to_string()))?;

        if ip.is_loopback() || Self::is_private_ip(&ip) {
            info!("Mock reputation lookup for {} (localhost/private)", ip);
            return Ok(ReputationRecord {
                country_code: self.home_country.clone(),
                is_vpn: false,
                is_proxy: false,
                is_tor: false,
                is_relay: false,
                organization: "Local Network".to_string(),
            });
        }

        info!("Mock reputation lookup for {} (external)", ip);
        Ok(ReputationRecord {
            country_code: UNKNOWN.to_string(),
            is_vpn: false,
            is_proxy: false,
            is_tor: false,
            is_relay: false,
            organization: UNKNOWN.to_string(),
        })
    }

    fn is_private_ip(ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local(),
            IpAddr::V6(ipv6) => ipv6.is_loopback() || ipv6.is_unique_local(),
        }
    }
}

/// Fail-open reputation lookup.
///
/// Wraps an optional provider; `None` means the API key was never configured.
pub struct ReputationService {
    provider: Option<ReputationProvider>,
}

impl ReputationService {
    pub fn new(provider: Option<ReputationProvider>) -> Self {
        Self { provider }
    }

    /// Pick a provider from the environment: `GATEHOUSE_REPUTATION_MOCK=true`
    /// selects the mock, otherwise `VPNAPI_KEY` enables vpnapi.io.
    pub fn from_env(
        base_url: Option<&str>,
        timeout: Duration,
        home_country: &str,
    ) -> Result<Self, ReputationError> {
        let use_mock = std::env::var("GATEHOUSE_REPUTATION_MOCK")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        if use_mock {
            info!("Using mock reputation provider for local development");
            return Ok(Self::new(Some(ReputationProvider::Mock(
                MockReputationProvider::new(home_country),
            ))));
        }

        let api_key = std::env::var("VPNAPI_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::with_api_key(api_key, base_url, timeout)
    }

    pub fn with_api_key(
        api_key: Option<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ReputationError> {
        let Some(api_key) = api_key else {
            warn!("VPNAPI_KEY is not set; reputation lookups are disabled and every request is admitted");
            return Ok(Self::new(None));
        };

        let client = match base_url {
            Some(base_url) => VpnApiClient::with_base_url(api_key, base_url, timeout)?,
            None => VpnApiClient::new(api_key, timeout)?,
        };
        Ok(Self::new(Some(ReputationProvider::VpnApi(client))))
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }
}

#[async_trait]
impl ReputationLookup for ReputationService {
    async fn lookup(&self, client_ip: &str) -> LookupOutcome {
        if client_ip.trim().is_empty() {
            return LookupOutcome::undetermined(NO_CLIENT_IP_NOTE);
        }

        let Some(provider) = &self.provider else {
            return LookupOutcome::undetermined(MISSING_KEY_NOTE);
        };

        match provider.lookup(client_ip).await {
            Ok(record) => {
                debug!(
                    client_ip = %client_ip,
                    provider = provider.name(),
                    country = %record.country_code,
                    vpn = record.is_vpn,
                    proxy = record.is_proxy,
                    tor = record.is_tor,
                    relay = record.is_relay,
                    "Reputation lookup succeeded"
                );
                LookupOutcome::Detected(record)
            }
            Err(e) => {
                warn!(
                    client_ip = %client_ip,
                    provider = provider.name(),
                    "Reputation lookup failed, admitting request: {}",
                    e
                );
                LookupOutcome::undetermined(format!("API lookup failed: {}", e))
            }
        }
    }
}
