use anyhow::Result;
use axum::middleware;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{OriginConfig, ProxyConfig};
use crate::guard::EdgeGuard;
use crate::middleware::edge_guard;
use crate::proxy::{proxy_handler, UpstreamOrigin};
use crate::traits::ProxyServiceError;

/// Custom shutdown signal trait that callers can implement
pub trait ProxyShutdownSignal: Send + Sync {
    /// Wait for the shutdown signal to be triggered
    fn wait_for_signal(&self) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Origin router wrapped in the guard middleware.
///
/// Panics inside the origin become a 500 that the guard still decorates.
pub fn build_router(config: &ProxyConfig, guard: Arc<EdgeGuard>) -> Result<Router, ProxyServiceError> {
    let origin = match &config.origin {
        OriginConfig::Static { root } => {
            if !root.is_dir() {
                return Err(ProxyServiceError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("static directory {} does not exist", root.display()),
                )));
            }
            Router::new().fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
        }
        OriginConfig::Upstream { url } => {
            let upstream = Arc::new(UpstreamOrigin::new(url, config.upstream_timeout)?);
            Router::new().fallback(proxy_handler).with_state(upstream)
        }
    };

    Ok(origin
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(guard, edge_guard))
        .layer(TraceLayer::new_for_http()))
}

/// Bind the listener and serve until the shutdown signal fires
pub async fn serve(
    config: ProxyConfig,
    guard: Arc<EdgeGuard>,
    shutdown_signal: Box<dyn ProxyShutdownSignal>,
) -> Result<()> {
    let router = build_router(&config, guard)?;
    let listener = tokio::net::TcpListener::bind(&config.address).await?;

    info!("Starting proxy server on {}", listener.local_addr()?);
    match &config.origin {
        OriginConfig::Static { root } => info!("Serving static files from {}", root.display()),
        OriginConfig::Upstream { url } => info!("Forwarding admitted requests to {}", url),
    }

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal.wait_for_signal())
    .await?;

    info!("Proxy server stopped");
    Ok(())
}

/// Setup and run the proxy server on a dedicated runtime
pub fn setup_proxy_server(
    config: ProxyConfig,
    guard: Arc<EdgeGuard>,
    shutdown_signal: Box<dyn ProxyShutdownSignal>,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(config, guard, shutdown_signal))
}
