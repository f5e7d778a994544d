//! Core settings and error types shared across all Gatehouse crates

pub mod error;
mod settings;

// Re-export commonly used types
pub use error::*;
pub use settings::{
    AllowListStrategyKind, ContentPolicySettings, GatehouseSettings, GuardSettings,
    SecurityHeadersSettings, DEFAULT_CRAWLER_SIGNATURES,
};
