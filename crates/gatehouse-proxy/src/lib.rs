//! Gatehouse Proxy - edge guard for a static site
//!
//! Every request is classified (crawler or visitor), checked against an IP
//! reputation service and admitted, challenged or denied. Admitted responses
//! from the origin are decorated with a content-security policy, per-response
//! nonces and hardening headers.

pub mod classifier;
pub mod config;
pub mod crawler_detector;
pub mod csp;
pub mod decorator;
pub mod guard;
pub mod markup;
pub mod middleware;
pub mod nonce;
pub mod policy;
pub mod proxy;
pub mod server;
pub mod traits;

pub use classifier::{Classification, RequestClassifier};
pub use crawler_detector::CrawlerDetector;
pub use csp::{AllowList, AllowListStrategy, ContentPolicy};
pub use decorator::{ResponseDecorator, DENIED_BODY, X_SHOW_CAPTCHA, X_VPN_WARNING};
pub use guard::{DebugSnapshot, EdgeGuard, Verdict};
pub use nonce::Nonces;
pub use policy::{AccessDecision, PolicyEngine, ResponseSignals};

// Re-export main types and functions
pub use config::*;
pub use proxy::*;
pub use server::*;
pub use traits::*;
