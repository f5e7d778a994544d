//! Forwarding of admitted requests to an HTTP upstream

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use crate::traits::ProxyServiceError;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Largest request body forwarded upstream
const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

/// Connection-scoped headers that must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct UpstreamOrigin {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl UpstreamOrigin {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ProxyServiceError> {
        let parsed = Url::parse(base).map_err(|e| ProxyServiceError::InvalidUpstream {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProxyServiceError::InvalidUpstream {
                url: base.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Forward one request and relay the upstream response as-is
    pub async fn forward(
        &self,
        request: Request,
        peer: Option<SocketAddr>,
    ) -> Result<Response, ProxyServiceError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base, path_and_query);

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        // Identity bodies can be rewritten without a decoder
        headers.remove(header::ACCEPT_ENCODING);

        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert(X_REQUEST_ID, value);
        }

        if let Some(peer) = peer {
            let forwarded_for = match headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
            {
                Some(existing) => format!("{}, {}", existing, peer.ip()),
                None => peer.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert("x-forwarded-for", value);
            }
        }

        let body = to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|e| ProxyServiceError::RequestBody(e.to_string()))?;

        debug!(
            request_id = %request_id,
            method = %parts.method,
            url = %url,
            "Forwarding request upstream"
        );

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyServiceError::UpstreamTimeout(self.timeout)
                } else {
                    ProxyServiceError::Upstream(e)
                }
            })?;

        let status = upstream.status();
        let mut response_headers = strip_hop_by_hop(upstream.headers());
        let bytes = upstream.bytes().await?;

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response_headers.insert(X_REQUEST_ID, value);
        }

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(source: &HeaderMap) -> HeaderMap {
    // Headers named by `Connection` are connection-scoped too
    let listed: Vec<String> = source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower) || listed.iter().any(|l| l == lower) {
            continue;
        }
        headers.append(HeaderName::clone(name), value.clone());
    }
    headers
}

/// Axum fallback handler relaying every admitted request to the upstream
pub async fn proxy_handler(
    State(origin): State<Arc<UpstreamOrigin>>,
    request: Request,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let path = request.uri().path().to_string();

    match origin.forward(request, peer).await {
        Ok(response) => response,
        Err(ProxyServiceError::RequestBody(e)) => {
            debug!(path = %path, "Rejected request body: {}", e);
            (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response()
        }
        Err(ProxyServiceError::UpstreamTimeout(timeout)) => {
            error!(path = %path, upstream = %origin.base(), "Upstream timed out after {:?}", timeout);
            (StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout").into_response()
        }
        Err(e) => {
            error!(path = %path, upstream = %origin.base(), "Failed to reach upstream: {}", e);
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .header(header::HOST, "www.example.com")
            .header(header::ACCEPT_ENCODING, "gzip, br")
            .header(header::CONNECTION, "keep-alive, x-trace")
            .header("x-trace", "1")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_rejects_non_http_upstream() {
        assert!(UpstreamOrigin::new("ftp://files.example.com", Duration::from_secs(1)).is_err());
        assert!(UpstreamOrigin::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut source = HeaderMap::new();
        source.insert(header::CONNECTION, HeaderValue::from_static("close, x-secret"));
        source.insert("x-secret", HeaderValue::from_static("1"));
        source.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        source.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let headers = strip_hop_by_hop(&source);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_forward_relays_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/plumbing"))
            .and(query_param("zip", "78701"))
            .and(header_is("x-forwarded-for", "198.51.100.20"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<h1>Plumbing</h1>", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let origin = UpstreamOrigin::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let peer: SocketAddr = "198.51.100.20:51000".parse().unwrap();
        let response = origin
            .forward(request("/services/plumbing?zip=78701"), Some(peer))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<h1>Plumbing</h1>");

        let received = &server.received_requests().await.unwrap()[0];
        assert!(!received.headers.contains_key("accept-encoding"));
        assert!(!received.headers.contains_key("x-trace"));
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;

        let origin = UpstreamOrigin::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let response = origin.forward(request("/old"), None).await.unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/new");
    }

    #[tokio::test]
    async fn test_upstream_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let origin = UpstreamOrigin::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let result = origin.forward(request("/"), None).await;

        assert!(matches!(result, Err(ProxyServiceError::UpstreamTimeout(_))));
    }

    #[tokio::test]
    async fn test_handler_maps_unreachable_to_bad_gateway() {
        // Nothing listens on the discard port
        let origin = Arc::new(UpstreamOrigin::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap());
        let response = proxy_handler(State(origin), request("/")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
