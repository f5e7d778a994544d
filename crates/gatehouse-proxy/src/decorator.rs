//! Response decoration: security headers, content policy and inline nonces

use axum::body::{Body, Bytes};
use axum::response::Response;
use futures::{stream, StreamExt};
use gatehouse_core::{ContentPolicySettings, SecurityHeadersSettings, ServiceError, ServiceResult};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use tracing::{debug, error, warn};

use crate::csp::{self, AllowListStrategy, ContentPolicy};
use crate::markup;
use crate::nonce::Nonces;
use crate::policy::ResponseSignals;

pub const DENIED_BODY: &str = "Access Denied: Non-US or High-Risk Network";
pub const X_SHOW_CAPTCHA: &str = "x-show-captcha";
pub const X_VPN_WARNING: &str = "x-vpn-warning";
pub const X_ROBOTS_TAG: &str = "x-robots-tag";

/// Largest HTML body buffered for rewriting
pub const DEFAULT_MAX_REWRITE_BYTES: usize = 5 * 1024 * 1024;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// How inline `<script>` and `<style>` blocks of one response are authorized
#[derive(Debug, Clone, Copy)]
enum InlineAuthorization<'a> {
    Nonces(&'a Nonces),
    /// HTML served without tagging its markup
    UnsafeInline,
}

enum BodyHandling {
    /// Not HTML, or nothing to rewrite
    Untouched,
    /// HTML response without a body (HEAD, 1xx, 204)
    HeadersOnly,
    /// HTML that cannot be rewritten and is served as-is
    PassThrough,
    Rewrite,
}

enum Buffered {
    Complete(Bytes),
    /// Over the limit; replays the buffered prefix followed by the rest of the stream
    Oversized(Body),
}

pub struct ResponseDecorator {
    hardening: Vec<(HeaderName, HeaderValue)>,
    content_policy: ContentPolicySettings,
    strategy: Box<dyn AllowListStrategy>,
    frame_ancestors: &'static str,
    max_rewrite_bytes: usize,
}

impl ResponseDecorator {
    pub fn new(
        security_headers: &SecurityHeadersSettings,
        content_policy: &ContentPolicySettings,
    ) -> ServiceResult<Self> {
        let hardening = if security_headers.enabled {
            hardening_headers(security_headers)?
        } else {
            Vec::new()
        };

        let decorator = Self {
            hardening,
            content_policy: content_policy.clone(),
            strategy: csp::strategy_for(content_policy),
            frame_ancestors: csp::frame_ancestors_for(&security_headers.x_frame_options),
            max_rewrite_bytes: DEFAULT_MAX_REWRITE_BYTES,
        };

        // Reject source lists that cannot form a header value before serving traffic
        let nonces = Nonces::generate();
        if let Some(policy) = decorator.render_policy(None, InlineAuthorization::Nonces(&nonces)) {
            HeaderValue::from_str(&policy).map_err(|e| {
                ServiceError::configuration(format!("invalid content policy source list: {}", e))
            })?;
        }

        Ok(decorator)
    }

    pub fn with_max_rewrite_bytes(mut self, limit: usize) -> Self {
        self.max_rewrite_bytes = limit;
        self
    }

    pub fn hardening_headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.hardening
    }

    pub fn strategy(&self) -> &dyn AllowListStrategy {
        self.strategy.as_ref()
    }

    /// The 403 sent to denied visitors; the origin is never consulted
    pub fn denied_response(&self) -> Response {
        let mut response = plain_response(StatusCode::FORBIDDEN, DENIED_BODY);
        let nonces = Nonces::generate();
        self.apply_headers(
            response.headers_mut(),
            ResponseSignals::default(),
            InlineAuthorization::Nonces(&nonces),
            None,
        );
        response
    }

    /// Replaces an origin failure so the client still gets a hardened response
    pub fn bad_gateway(&self) -> Response {
        let mut response = plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
        let nonces = Nonces::generate();
        self.apply_headers(
            response.headers_mut(),
            ResponseSignals::default(),
            InlineAuthorization::Nonces(&nonces),
            None,
        );
        response
    }

    /// Decorate with fresh nonces, or with the ones a previous pass already
    /// put in the response's policy
    pub async fn decorate(
        &self,
        method: &Method,
        response: Response,
        signals: ResponseSignals,
    ) -> Response {
        let nonces = response
            .headers()
            .get(header::CONTENT_SECURITY_POLICY)
            .and_then(|v| v.to_str().ok())
            .and_then(csp::nonces_in)
            .unwrap_or_else(Nonces::generate);
        self.decorate_with(method, response, signals, &nonces).await
    }

    /// Decorate with caller-supplied nonces. Headers are replaced rather than
    /// appended and tagged markup is skipped, so a second pass is a no-op.
    pub async fn decorate_with(
        &self,
        method: &Method,
        response: Response,
        signals: ResponseSignals,
        nonces: &Nonces,
    ) -> Response {
        let mut response = response;

        // A revalidated body keeps the policy it was first served with
        if response.status() == StatusCode::NOT_MODIFIED {
            self.apply_hardening(response.headers_mut(), signals);
            return response;
        }

        match self.body_handling(method, response.status(), response.headers()) {
            BodyHandling::Untouched => {
                self.apply_headers(
                    response.headers_mut(),
                    signals,
                    InlineAuthorization::Nonces(nonces),
                    None,
                );
                response
            }
            BodyHandling::HeadersOnly => {
                if self.content_policy.use_nonces {
                    forbid_caching(response.headers_mut());
                }
                self.apply_headers(
                    response.headers_mut(),
                    signals,
                    InlineAuthorization::Nonces(nonces),
                    None,
                );
                response
            }
            BodyHandling::PassThrough => {
                self.apply_headers(
                    response.headers_mut(),
                    signals,
                    InlineAuthorization::UnsafeInline,
                    None,
                );
                response
            }
            BodyHandling::Rewrite => self.rewrite(response, signals, nonces).await,
        }
    }

    async fn rewrite(&self, response: Response, signals: ResponseSignals, nonces: &Nonces) -> Response {
        let (mut parts, body) = response.into_parts();
        let bytes = match buffer_body(body, self.max_rewrite_bytes).await {
            Ok(Buffered::Complete(bytes)) => bytes,
            Ok(Buffered::Oversized(body)) => {
                warn!(
                    "HTML response exceeds the rewrite limit of {} bytes, passing it through unmodified",
                    self.max_rewrite_bytes
                );
                self.apply_headers(
                    &mut parts.headers,
                    signals,
                    InlineAuthorization::UnsafeInline,
                    None,
                );
                return Response::from_parts(parts, body);
            }
            Err(e) => {
                error!("Failed to buffer HTML response for rewriting: {}", e);
                return self.bad_gateway();
            }
        };

        let html = match String::from_utf8(bytes.to_vec()) {
            Ok(html) => html,
            Err(_) => {
                warn!("HTML response is not valid UTF-8, passing it through unmodified");
                parts
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                self.apply_headers(
                    &mut parts.headers,
                    signals,
                    InlineAuthorization::UnsafeInline,
                    None,
                );
                return Response::from_parts(parts, Body::from(bytes));
            }
        };

        let rewritten = if self.content_policy.use_nonces {
            forbid_caching(&mut parts.headers);
            markup::apply_nonces(&html, nonces)
        } else {
            html
        };

        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
        self.apply_headers(
            &mut parts.headers,
            signals,
            InlineAuthorization::Nonces(nonces),
            Some(&rewritten),
        );
        Response::from_parts(parts, Body::from(rewritten))
    }

    fn body_handling(&self, method: &Method, status: StatusCode, headers: &HeaderMap) -> BodyHandling {
        if !self.content_policy.enabled || !is_html(headers) {
            return BodyHandling::Untouched;
        }
        if !self.content_policy.use_nonces && !self.strategy.reads_markup() {
            return BodyHandling::Untouched;
        }
        if *method == Method::HEAD || status.is_informational() || status == StatusCode::NO_CONTENT {
            return BodyHandling::HeadersOnly;
        }

        let encoded = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.eq_ignore_ascii_case("identity"));
        if encoded {
            debug!("Skipping markup rewrite for encoded HTML response");
            return BodyHandling::PassThrough;
        }

        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_rewrite_bytes) {
            warn!(
                "HTML response of {:?} bytes exceeds the rewrite limit of {} bytes",
                declared, self.max_rewrite_bytes
            );
            return BodyHandling::PassThrough;
        }
        BodyHandling::Rewrite
    }

    fn render_policy(&self, markup: Option<&str>, inline: InlineAuthorization<'_>) -> Option<String> {
        if !self.content_policy.enabled {
            return None;
        }
        let use_nonces = self.content_policy.use_nonces;
        let (nonces, unsafe_inline) = match inline {
            InlineAuthorization::Nonces(nonces) if use_nonces => (Some(nonces), false),
            InlineAuthorization::UnsafeInline if use_nonces => (None, true),
            _ => (None, false),
        };

        let policy = ContentPolicy {
            allow_list: self.strategy.allow_list(markup),
            nonces,
            unsafe_inline,
            frame_ancestors: self.frame_ancestors,
            inline_style_attributes: self.content_policy.allow_inline_style_attributes,
            upgrade_insecure_requests: self.content_policy.upgrade_insecure_requests,
        };
        Some(policy.render())
    }

    fn apply_headers(
        &self,
        headers: &mut HeaderMap,
        signals: ResponseSignals,
        inline: InlineAuthorization<'_>,
        markup: Option<&str>,
    ) {
        if let Some(policy) = self.render_policy(markup, inline) {
            match HeaderValue::from_str(&policy) {
                Ok(value) => {
                    headers.insert(header::CONTENT_SECURITY_POLICY, value);
                }
                Err(e) => error!("Content policy is not a valid header value: {}", e),
            }
        }
        self.apply_hardening(headers, signals);
    }

    fn apply_hardening(&self, headers: &mut HeaderMap, signals: ResponseSignals) {
        for (name, value) in &self.hardening {
            headers.insert(name.clone(), value.clone());
        }

        if signals.show_captcha {
            headers.insert(X_SHOW_CAPTCHA, HeaderValue::from_static("true"));
        }
        if signals.vpn_warning {
            headers.insert(X_VPN_WARNING, HeaderValue::from_static("true"));
        }
    }
}

/// Buffer up to `limit` bytes; a longer body is handed back intact
async fn buffer_body(body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut chunks = body.into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if buffered.len() + chunk.len() > limit {
            let prefix = stream::iter([Ok::<_, axum::Error>(Bytes::from(buffered)), Ok(chunk)]);
            return Ok(Buffered::Oversized(Body::from_stream(prefix.chain(chunks))));
        }
        buffered.extend_from_slice(&chunk);
    }
    Ok(Buffered::Complete(Bytes::from(buffered)))
}

/// Markup carrying per-response nonces is never stored or revalidated
fn forbid_caching(headers: &mut HeaderMap) {
    headers.remove(header::ETAG);
    headers.remove(header::LAST_MODIFIED);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
}

fn hardening_headers(
    settings: &SecurityHeadersSettings,
) -> ServiceResult<Vec<(HeaderName, HeaderValue)>> {
    let pairs = vec![
        (
            header::STRICT_TRANSPORT_SECURITY,
            Some(settings.strict_transport_security.as_str()),
        ),
        (
            header::X_CONTENT_TYPE_OPTIONS,
            Some(settings.x_content_type_options.as_str()),
        ),
        (header::X_FRAME_OPTIONS, Some(settings.x_frame_options.as_str())),
        (header::REFERRER_POLICY, Some(settings.referrer_policy.as_str())),
        (
            HeaderName::from_static("permissions-policy"),
            settings.permissions_policy.as_deref(),
        ),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            settings.cross_origin_opener_policy.as_deref(),
        ),
        (
            HeaderName::from_static("cross-origin-resource-policy"),
            settings.cross_origin_resource_policy.as_deref(),
        ),
        (
            HeaderName::from_static(X_ROBOTS_TAG),
            settings.x_robots_tag.as_deref(),
        ),
    ];

    let mut headers = Vec::with_capacity(pairs.len());
    for (name, value) in pairs {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let value = HeaderValue::from_str(value).map_err(|e| {
            ServiceError::configuration(format!("invalid value for header {}: {}", name, e))
        })?;
        headers.push((name, value));
    }
    Ok(headers)
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

fn plain_response(status: StatusCode, body: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use gatehouse_core::AllowListStrategyKind;

    fn decorator() -> ResponseDecorator {
        ResponseDecorator::new(
            &SecurityHeadersSettings::default(),
            &ContentPolicySettings::default(),
        )
        .unwrap()
    }

    fn html_response(html: &'static str) -> Response {
        let mut response = Response::new(Body::from(html));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(html.len()));
        response
    }

    fn fixed_nonces() -> Nonces {
        Nonces {
            script: "c2NyaXB0bm9uY2U=".to_string(),
            style: "c3R5bGVub25jZQ==".to_string(),
        }
    }

    fn policy_of(response: &Response) -> String {
        response.headers()[header::CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_hardening_headers_from_defaults() {
        let decorator = decorator();
        let names: Vec<&str> = decorator
            .hardening_headers()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();

        assert_eq!(
            names,
            vec![
                "strict-transport-security",
                "x-content-type-options",
                "x-frame-options",
                "referrer-policy",
                "permissions-policy",
                "x-robots-tag"
            ]
        );
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let settings = SecurityHeadersSettings {
            referrer_policy: "no-referrer\r\nx-evil: 1".to_string(),
            ..Default::default()
        };
        let result = ResponseDecorator::new(&settings, &ContentPolicySettings::default());
        assert!(matches!(result, Err(ServiceError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_denied_response() {
        let response = decorator().denied_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(
            response.headers()[header::STRICT_TRANSPORT_SECURITY],
            "max-age=63072000; includeSubDomains; preload"
        );
        assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(!response.headers().contains_key(X_SHOW_CAPTCHA));
        assert_eq!(body_string(response).await, DENIED_BODY);
    }

    #[tokio::test]
    async fn test_html_is_rewritten_with_nonces() {
        let nonces = fixed_nonces();
        let response = decorator()
            .decorate_with(
                &Method::GET,
                html_response("<html><script>boot()</script><style>p{}</style></html>"),
                ResponseSignals::default(),
                &nonces,
            )
            .await;

        let csp = policy_of(&response);
        assert!(csp.contains("'nonce-c2NyaXB0bm9uY2U='"));
        assert!(csp.contains("'nonce-c3R5bGVub25jZQ=='"));
        assert!(!csp.contains("https://www.google.com 'unsafe-inline'"));

        let expected = r#"<html><script nonce="c2NyaXB0bm9uY2U=">boot()</script><style nonce="c3R5bGVub25jZQ==">p{}</style></html>"#;
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            expected.len().to_string().as_str()
        );
        assert_eq!(body_string(response).await, expected);
    }

    #[tokio::test]
    async fn test_rewritten_html_drops_validators() {
        let mut response = html_response("<script>boot()</script>");
        let headers = response.headers_mut();
        headers.insert(header::ETAG, HeaderValue::from_static("\"abc\""));
        headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_static("Tue, 01 Sep 2026 10:00:00 GMT"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=3600"));

        let response = decorator()
            .decorate(&Method::GET, response, ResponseSignals::default())
            .await;

        assert!(!response.headers().contains_key(header::ETAG));
        assert!(!response.headers().contains_key(header::LAST_MODIFIED));
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }

    #[tokio::test]
    async fn test_not_modified_keeps_cached_policy() {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;

        let response = decorator()
            .decorate(
                &Method::GET,
                response,
                ResponseSignals {
                    vpn_warning: false,
                    show_captcha: true,
                },
            )
            .await;

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(!response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(response.headers().contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert_eq!(response.headers()[X_SHOW_CAPTCHA], "true");
    }

    #[tokio::test]
    async fn test_decoration_is_idempotent() {
        let decorator = decorator();
        let signals = ResponseSignals {
            vpn_warning: true,
            show_captcha: true,
        };

        let once = decorator
            .decorate(&Method::GET, html_response("<script>a()</script><style>b{}</style>"), signals)
            .await;
        let once_headers = once.headers().clone();
        let once_body = body_string(once).await;

        let mut replay = Response::new(Body::from(once_body.clone()));
        *replay.headers_mut() = once_headers.clone();
        let twice = decorator.decorate(&Method::GET, replay, signals).await;

        assert_eq!(twice.headers(), &once_headers);
        assert_eq!(twice.headers().get_all(X_SHOW_CAPTCHA).iter().count(), 1);
        assert_eq!(body_string(twice).await, once_body);

        let nonces = csp::nonces_in(once_headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap())
            .unwrap();
        assert!(once_body.contains(&format!(r#"<script nonce="{}">"#, nonces.script)));
        assert!(once_body.contains(&format!(r#"<style nonce="{}">"#, nonces.style)));
    }

    #[tokio::test]
    async fn test_signal_headers() {
        let response = decorator()
            .decorate(
                &Method::GET,
                Response::new(Body::empty()),
                ResponseSignals {
                    vpn_warning: true,
                    show_captcha: false,
                },
            )
            .await;

        assert_eq!(response.headers()[X_VPN_WARNING], "true");
        assert!(!response.headers().contains_key(X_SHOW_CAPTCHA));
    }

    #[tokio::test]
    async fn test_non_html_body_untouched() {
        let mut response = Response::new(Body::from("console.log('<script>')"));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/javascript"),
        );

        let response = decorator()
            .decorate(&Method::GET, response, ResponseSignals::default())
            .await;

        assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        assert_eq!(body_string(response).await, "console.log('<script>')");
    }

    #[tokio::test]
    async fn test_oversized_html_passes_through() {
        let decorator = decorator().with_max_rewrite_bytes(8);
        let response = decorator
            .decorate(
                &Method::GET,
                html_response("<script>long()</script>"),
                ResponseSignals::default(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let csp = policy_of(&response);
        assert!(csp.contains("https://www.google.com 'unsafe-inline'; script-src-elem"));
        assert!(!csp.contains("'nonce-"));
        assert_eq!(body_string(response).await, "<script>long()</script>");
    }

    #[tokio::test]
    async fn test_oversized_html_without_content_length() {
        let chunks = futures::stream::iter([
            Ok::<_, std::io::Error>("<script>long()</script>"),
            Ok("<p>tail</p>"),
        ]);
        let mut response = Response::new(Body::from_stream(chunks));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let response = decorator()
            .with_max_rewrite_bytes(8)
            .decorate(&Method::GET, response, ResponseSignals::default())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(policy_of(&response).contains("'unsafe-inline'; script-src-elem"));
        assert_eq!(
            body_string(response).await,
            "<script>long()</script><p>tail</p>"
        );
    }

    #[tokio::test]
    async fn test_broken_html_stream_is_bad_gateway() {
        let chunks = futures::stream::iter([
            Ok("<p>"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let mut response = Response::new(Body::from_stream(chunks));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let response = decorator()
            .decorate(&Method::GET, response, ResponseSignals::default())
            .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
    }

    #[tokio::test]
    async fn test_non_utf8_html_falls_back_to_unsafe_inline() {
        let bytes: &'static [u8] = b"<script>x()</script>\xff";
        let mut response = Response::new(Body::from(bytes));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let response = decorator()
            .decorate(&Method::GET, response, ResponseSignals::default())
            .await;

        assert!(!policy_of(&response).contains("'nonce-"));
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "21");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], bytes);
    }

    #[tokio::test]
    async fn test_encoded_html_falls_back_to_unsafe_inline() {
        let mut response = html_response("gzipped");
        response
            .headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let response = decorator()
            .decorate(&Method::GET, response, ResponseSignals::default())
            .await;

        assert!(policy_of(&response).contains("https://client.crisp.chat 'unsafe-inline'; style-src-elem"));
        assert_eq!(body_string(response).await, "gzipped");
    }

    #[tokio::test]
    async fn test_head_keeps_declared_length() {
        let mut response = Response::new(Body::empty());
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(1024usize));

        let response = decorator()
            .decorate(&Method::HEAD, response, ResponseSignals::default())
            .await;

        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1024");
        assert!(policy_of(&response).contains("'nonce-"));
    }

    #[tokio::test]
    async fn test_markup_scan_policy_uses_body_origins() {
        let content_policy = ContentPolicySettings {
            strategy: AllowListStrategyKind::MarkupScan,
            use_nonces: false,
            ..Default::default()
        };
        let decorator =
            ResponseDecorator::new(&SecurityHeadersSettings::default(), &content_policy).unwrap();

        let response = decorator
            .decorate(
                &Method::GET,
                html_response(r#"<script src="https://cdn.example.org/x.js"></script>"#),
                ResponseSignals::default(),
            )
            .await;

        let csp = policy_of(&response);
        assert!(csp.contains("script-src 'self' https://cdn.example.org;"));
        assert!(!csp.contains("'nonce-"));
    }

    #[tokio::test]
    async fn test_disabled_layers() {
        let decorator = ResponseDecorator::new(
            &SecurityHeadersSettings {
                enabled: false,
                ..Default::default()
            },
            &ContentPolicySettings {
                enabled: false,
                ..Default::default()
            },
        )
        .unwrap();

        let response = decorator
            .decorate(
                &Method::GET,
                html_response("<script>x()</script>"),
                ResponseSignals::default(),
            )
            .await;

        assert!(!response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(!response.headers().contains_key(header::X_FRAME_OPTIONS));
        assert_eq!(body_string(response).await, "<script>x()</script>");
    }
}
