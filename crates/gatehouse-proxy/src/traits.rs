use std::time::Duration;

/// Error types for proxy services
#[derive(Debug, thiserror::Error)]
pub enum ProxyServiceError {
    #[error("Invalid upstream URL '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
