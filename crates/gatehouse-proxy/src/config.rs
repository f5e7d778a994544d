use std::path::PathBuf;
use std::time::Duration;

/// Where admitted requests are answered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginConfig {
    /// Serve a directory of static files
    Static { root: PathBuf },
    /// Forward to an HTTP upstream, e.g. `http://127.0.0.1:4000`
    Upstream { url: String },
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub address: String,
    pub origin: OriginConfig,
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            origin: OriginConfig::Static {
                root: PathBuf::from("public"),
            },
            upstream_timeout: Duration::from_secs(30),
        }
    }
}
