use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use http::header::{self, HeaderValue};
use http::StatusCode;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

use crate::guard::{DebugSnapshot, EdgeGuard, Verdict};
use crate::policy::ResponseSignals;

const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// Axum middleware running every request through the [`EdgeGuard`].
///
/// Install with `axum::middleware::from_fn_with_state`. The client address
/// comes from `ConnectInfo` when the router is served with
/// `into_make_service_with_connect_info`.
pub async fn edge_guard(
    State(guard): State<Arc<EdgeGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let headers = request.headers().clone();

    let evaluation = AssertUnwindSafe(guard.evaluate(&path, &headers, peer))
        .catch_unwind()
        .await;
    let verdict = match evaluation {
        Ok(verdict) => verdict,
        Err(_) => {
            error!(path = %path, "Access evaluation panicked, serving request without signals");
            Verdict::Proceed(ResponseSignals::default())
        }
    };

    match verdict {
        Verdict::Debug(snapshot) => debug_response(&snapshot),
        Verdict::Deny => guard.decorator().denied_response(),
        Verdict::Crawler { .. } => {
            let response = next.run(request).await;
            guard
                .decorator()
                .decorate(&method, response, ResponseSignals::default())
                .await
        }
        Verdict::Proceed(signals) => {
            let response = next.run(request).await;
            guard.decorator().decorate(&method, response, signals).await
        }
    }
}

fn debug_response(snapshot: &DebugSnapshot) -> Response {
    let body = match serde_json::to_vec_pretty(snapshot) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize debug snapshot: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
