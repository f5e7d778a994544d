use clap::Args;
use gatehouse_core::{AllowListStrategyKind, GatehouseSettings};
use gatehouse_geo::ReputationService;
use gatehouse_proxy::{EdgeGuard, OriginConfig, ProxyConfig, ProxyShutdownSignal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::load_settings;

/// Shutdown signal implementation for Ctrl+C
struct CtrlCShutdownSignal;

impl ProxyShutdownSignal for CtrlCShutdownSignal {
    fn wait_for_signal(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                // Without a signal handler the server runs until killed
                error!("Failed to listen for ctrl-c signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, initiating graceful shutdown...");
        })
    }
}

#[derive(Args)]
pub struct ProxyCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:8080", env = "GATEHOUSE_ADDRESS")]
    pub address: String,

    /// Directory of static files to serve to admitted visitors
    #[arg(long, env = "GATEHOUSE_STATIC_DIR", conflicts_with = "upstream")]
    pub static_dir: Option<PathBuf>,

    /// HTTP upstream to forward admitted visitors to
    #[arg(long, env = "GATEHOUSE_UPSTREAM")]
    pub upstream: Option<String>,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 30, env = "GATEHOUSE_UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: u64,

    /// YAML settings file
    #[arg(long, env = "GATEHOUSE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Tag allowed-country VPN traffic with X-VPN-Warning
    #[arg(long, env = "GATEHOUSE_WARN_ON_VPN")]
    pub warn_on_vpn: bool,

    /// Content policy allow-list strategy: static, markup-scan, hybrid
    #[arg(long, env = "GATEHOUSE_CSP_STRATEGY")]
    pub csp_strategy: Option<AllowListStrategyKind>,

    /// Reputation lookup timeout in milliseconds
    #[arg(long, env = "GATEHOUSE_LOOKUP_TIMEOUT_MS")]
    pub lookup_timeout_ms: Option<u64>,

    /// Token of the diagnostic route /debug-ip-<token>
    #[arg(long, env = "GATEHOUSE_DEBUG_TOKEN")]
    pub debug_token: Option<String>,

    /// Resolve the client from forwarding headers before the socket address
    #[arg(long, env = "GATEHOUSE_TRUST_FORWARDED")]
    pub trust_forwarded: bool,

    /// Override the reputation API base URL
    #[arg(long, env = "VPNAPI_BASE_URL")]
    pub reputation_base_url: Option<String>,
}

impl ProxyCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let settings = self.resolve_settings()?;
        let proxy_config = self.proxy_config()?;
        debug!("Effective settings: {}", settings.to_json());

        let reputation = ReputationService::from_env(
            self.reputation_base_url.as_deref(),
            settings.guard.lookup_timeout(),
            &settings.guard.allowed_country,
        )?;
        if !reputation.is_configured() {
            warn!("Reputation lookups disabled, every visitor will be admitted");
        }

        info!(
            "Starting Gatehouse on {} (allowed country {}, csp strategy {}, warn_on_vpn {})",
            proxy_config.address,
            settings.guard.allowed_country,
            settings.content_policy.strategy,
            settings.guard.warn_on_vpn
        );

        let guard = Arc::new(EdgeGuard::new(&settings, Arc::new(reputation))?);
        let shutdown_signal = Box::new(CtrlCShutdownSignal) as Box<dyn ProxyShutdownSignal>;

        match gatehouse_proxy::setup_proxy_server(proxy_config, guard, shutdown_signal) {
            Ok(_) => {
                info!("Proxy server exited");
                Ok(())
            }
            Err(e) => {
                error!("Failed to start proxy server: {}", e);
                Err(anyhow::anyhow!("Failed to start proxy server: {}", e))
            }
        }
    }

    /// Settings file first, then command-line overrides
    fn resolve_settings(&self) -> anyhow::Result<GatehouseSettings> {
        let mut settings = load_settings(self.settings.as_deref())?;

        if self.warn_on_vpn {
            settings.guard.warn_on_vpn = true;
        }
        if self.trust_forwarded {
            settings.guard.trust_forwarded_headers = true;
        }
        if let Some(strategy) = self.csp_strategy {
            settings.content_policy.strategy = strategy;
        }
        if let Some(timeout) = self.lookup_timeout_ms {
            settings.guard.lookup_timeout_ms = timeout;
        }
        if let Some(token) = &self.debug_token {
            settings.guard.debug_token = token.clone();
        }

        settings.guard.validate()?;
        if settings.content_policy.strategy != AllowListStrategyKind::Static {
            warn!(
                "Content policy strategy '{}' trusts origins found in served markup",
                settings.content_policy.strategy
            );
        }
        Ok(settings)
    }

    fn proxy_config(&self) -> anyhow::Result<ProxyConfig> {
        let origin = match (&self.static_dir, &self.upstream) {
            (Some(root), None) => OriginConfig::Static { root: root.clone() },
            (None, Some(url)) => OriginConfig::Upstream { url: url.clone() },
            _ => anyhow::bail!("Exactly one of --static-dir or --upstream is required"),
        };

        Ok(ProxyConfig {
            address: self.address.clone(),
            origin,
            upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
        })
    }
}
