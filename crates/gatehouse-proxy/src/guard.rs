//! The per-request access pipeline: classify, look up, decide

use gatehouse_core::{GatehouseSettings, ServiceResult};
use gatehouse_geo::{LookupOutcome, ReputationLookup};
use http::HeaderMap;
use rand::RngCore;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::classifier::RequestClassifier;
use crate::crawler_detector::CrawlerDetector;
use crate::decorator::ResponseDecorator;
use crate::policy::{AccessDecision, PolicyEngine, ResponseSignals};

pub const DEBUG_MESSAGE: &str = "VPNAPI.io Debug";

/// Outcome of evaluating one request
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Known crawler: forwarded without a reputation lookup
    Crawler { signature: String },
    /// Diagnostic route: answered with the snapshot, origin not consulted
    Debug(DebugSnapshot),
    Deny,
    Proceed(ResponseSignals),
}

/// JSON body of the diagnostic route
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub message: &'static str,
    #[serde(rename = "clientIP")]
    pub client_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_vpn: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_proxy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_tor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_relay: Option<bool>,
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DebugSnapshot {
    pub fn new(client_ip: impl Into<String>, outcome: &LookupOutcome) -> Self {
        let record = outcome.record();
        Self {
            message: DEBUG_MESSAGE,
            client_ip: client_ip.into(),
            country: record.map(|r| r.country_code.clone()),
            is_vpn: record.map(|r| r.is_vpn),
            is_proxy: record.map(|r| r.is_proxy),
            is_tor: record.map(|r| r.is_tor),
            is_relay: record.map(|r| r.is_relay),
            detected: outcome.is_detected(),
            org: record.map(|r| r.organization.clone()),
            note: outcome.note().map(str::to_string),
        }
    }
}

/// Source of the captcha coin flip
enum Sampler {
    /// Per-thread generator, borrowed only for the duration of one draw
    Thread,
    Seeded(Mutex<Box<dyn RngCore + Send>>),
}

impl Sampler {
    fn decide(&self, policy: &PolicyEngine, outcome: &LookupOutcome) -> AccessDecision {
        match self {
            Sampler::Thread => policy.decide(outcome, &mut rand::thread_rng()),
            Sampler::Seeded(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                policy.decide(outcome, &mut **rng)
            }
        }
    }
}

pub struct EdgeGuard {
    classifier: RequestClassifier,
    reputation: Arc<dyn ReputationLookup>,
    policy: PolicyEngine,
    decorator: ResponseDecorator,
    debug_path: String,
    sampler: Sampler,
}

impl EdgeGuard {
    pub fn new(
        settings: &GatehouseSettings,
        reputation: Arc<dyn ReputationLookup>,
    ) -> ServiceResult<Self> {
        settings.guard.validate()?;

        let detector = CrawlerDetector::new(&settings.guard.crawler_signatures);
        Ok(Self {
            classifier: RequestClassifier::new(detector, settings.guard.trust_forwarded_headers),
            reputation,
            policy: PolicyEngine::new(&settings.guard),
            decorator: ResponseDecorator::new(
                &settings.security_headers,
                &settings.content_policy,
            )?,
            debug_path: settings.guard.debug_path(),
            sampler: Sampler::Thread,
        })
    }

    /// Replace the thread-local generator, e.g. with a seeded one
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.sampler = Sampler::Seeded(Mutex::new(Box::new(rng)));
        self
    }

    pub fn with_decorator(mut self, decorator: ResponseDecorator) -> Self {
        self.decorator = decorator;
        self
    }

    pub fn decorator(&self) -> &ResponseDecorator {
        &self.decorator
    }

    pub fn debug_path(&self) -> &str {
        &self.debug_path
    }

    pub async fn evaluate(&self, path: &str, headers: &HeaderMap, peer: Option<IpAddr>) -> Verdict {
        let classification = self.classifier.classify(headers, peer);

        if let Some(signature) = classification.crawler {
            debug!(
                crawler = %signature,
                user_agent = %classification.user_agent,
                "Known crawler, skipping reputation lookup"
            );
            return Verdict::Crawler { signature };
        }

        let outcome = self.reputation.lookup(&classification.client_ip).await;

        if path == self.debug_path {
            return Verdict::Debug(DebugSnapshot::new(&classification.client_ip, &outcome));
        }

        let decision = self.sampler.decide(&self.policy, &outcome);
        debug!(
            client_ip = %classification.client_ip,
            decision = decision.as_str(),
            note = outcome.note().unwrap_or_default(),
            "Access decision"
        );

        match decision {
            AccessDecision::Deny => {
                if let Some(record) = outcome.record() {
                    warn!(
                        client_ip = %classification.client_ip,
                        country = %record.country_code,
                        vpn = record.is_vpn,
                        proxy = record.is_proxy,
                        tor = record.is_tor,
                        relay = record.is_relay,
                        "Denied request"
                    );
                }
                Verdict::Deny
            }
            other => Verdict::Proceed(self.policy.signals(other)),
        }
    }
}
