//! vpnapi.io reputation client
//!
//! Looks up a single address per call with `GET /api/{ip}?key={key}` and maps
//! the `location`, `security` and `network` blocks of the answer onto a
//! [`ReputationRecord`].

use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::reputation::{ReputationRecord, UNKNOWN};
use crate::reputation_service::ReputationError;

const VPNAPI_BASE: &str = "https://vpnapi.io";

pub struct VpnApiClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VpnApiResponse {
    location: Option<VpnApiLocation>,
    security: Option<VpnApiSecurity>,
    network: Option<VpnApiNetwork>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VpnApiLocation {
    country_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VpnApiSecurity {
    vpn: bool,
    proxy: bool,
    tor: bool,
    relay: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VpnApiNetwork {
    organization: Option<String>,
    autonomous_system_organization: Option<String>,
    asn: Option<String>,
    autonomous_system_number: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl VpnApiResponse {
    fn into_record(self) -> ReputationRecord {
        let security = self.security.unwrap_or_default();
        let network = self.network.unwrap_or_default();

        let organization = non_empty(network.organization)
            .or_else(|| non_empty(network.autonomous_system_organization))
            .or_else(|| non_empty(network.asn))
            .or_else(|| non_empty(network.autonomous_system_number))
            .unwrap_or_else(|| UNKNOWN.to_string());

        ReputationRecord {
            country_code: non_empty(self.location.and_then(|l| l.country_code))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            is_vpn: security.vpn,
            is_proxy: security.proxy,
            is_tor: security.tor,
            is_relay: security.relay,
            organization,
        }
    }
}

impl VpnApiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ReputationError> {
        Self::with_base_url(api_key, VPNAPI_BASE, timeout)
    }

    /// Create a client against a different endpoint (mirrors, tests)
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReputationError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub async fn lookup(&self, client_ip: &str) -> Result<ReputationRecord, ReputationError> {
        // The address ends up in the request path, so only well-formed IPs go out
        let addr: IpAddr = client_ip
            .trim()
            .parse()
            .map_err(|_| ReputationError::InvalidAddress(client_ip.to_string()))?;

        let url = format!("{}/api/{}", self.base_url, addr);
        debug!("Querying reputation API for {}", addr);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReputationError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e))?;
        let payload: VpnApiResponse =
            serde_json::from_str(&body).map_err(|e| ReputationError::Decode(e.to_string()))?;

        Ok(payload.into_record())
    }

    fn map_request_error(&self, error: reqwest::Error) -> ReputationError {
        if error.is_timeout() {
            ReputationError::Timeout(self.timeout)
        } else {
            ReputationError::Request(error)
        }
    }
}
