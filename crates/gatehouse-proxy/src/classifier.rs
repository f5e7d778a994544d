//! Request classification: crawler detection and client address resolution

use http::HeaderMap;
use std::net::IpAddr;

use crate::crawler_detector::CrawlerDetector;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";
pub const X_REAL_IP: &str = "x-real-ip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Crawler signature that matched the User-Agent, if any
    pub crawler: Option<String>,
    /// Empty when no source yielded an address
    pub client_ip: String,
    pub user_agent: String,
}

impl Classification {
    pub fn is_known_crawler(&self) -> bool {
        self.crawler.is_some()
    }
}

pub struct RequestClassifier {
    detector: CrawlerDetector,
    trust_forwarded_headers: bool,
}

impl RequestClassifier {
    pub fn new(detector: CrawlerDetector, trust_forwarded_headers: bool) -> Self {
        Self {
            detector,
            trust_forwarded_headers,
        }
    }

    pub fn classify(&self, headers: &HeaderMap, connection_addr: Option<IpAddr>) -> Classification {
        let user_agent = header_str(headers, http::header::USER_AGENT.as_str())
            .unwrap_or_default()
            .to_string();

        Classification {
            crawler: self.detector.detect(&user_agent).map(str::to_string),
            client_ip: self.client_ip(headers, connection_addr),
            user_agent,
        }
    }

    /// Resolve the client address.
    ///
    /// Order: connection address, first `X-Forwarded-For` entry,
    /// `CF-Connecting-IP`, `X-Real-IP`. When forwarding headers are trusted the
    /// connection address moves to the end of the list.
    pub fn client_ip(&self, headers: &HeaderMap, connection_addr: Option<IpAddr>) -> String {
        let socket = connection_addr.map(|addr| addr.to_string());
        let resolved = if self.trust_forwarded_headers {
            forwarded_client_ip(headers).or(socket)
        } else {
            socket.or_else(|| forwarded_client_ip(headers))
        };
        resolved.unwrap_or_default()
    }
}

/// Client address as reported by forwarding headers
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, X_FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, CF_CONNECTING_IP).map(str::trim).filter(|ip| !ip.is_empty()))
        .or_else(|| header_str(headers, X_REAL_IP).map(str::trim).filter(|ip| !ip.is_empty()))
        .map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn classifier(trust_forwarded: bool) -> RequestClassifier {
        RequestClassifier::new(CrawlerDetector::default(), trust_forwarded)
    }

    #[test]
    fn test_connection_address_wins() {
        let map = headers(&[(X_FORWARDED_FOR, "203.0.113.9")]);
        let ip = classifier(false).client_ip(&map, Some("198.51.100.1".parse().unwrap()));
        assert_eq!(ip, "198.51.100.1");
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let map = headers(&[
            (X_FORWARDED_FOR, " 203.0.113.9 , 10.0.0.1, 10.0.0.2"),
            (CF_CONNECTING_IP, "192.0.2.44"),
        ]);
        assert_eq!(classifier(false).client_ip(&map, None), "203.0.113.9");
    }

    #[test]
    fn test_header_priority_fallbacks() {
        let map = headers(&[(CF_CONNECTING_IP, "192.0.2.44"), (X_REAL_IP, "192.0.2.55")]);
        assert_eq!(classifier(false).client_ip(&map, None), "192.0.2.44");

        let map = headers(&[(X_FORWARDED_FOR, ""), (X_REAL_IP, "192.0.2.55")]);
        assert_eq!(classifier(false).client_ip(&map, None), "192.0.2.55");
    }

    #[test]
    fn test_no_source_yields_empty() {
        assert_eq!(classifier(false).client_ip(&HeaderMap::new(), None), "");
    }

    #[test]
    fn test_trusted_forwarding_prefers_headers() {
        let map = headers(&[(X_REAL_IP, "192.0.2.55")]);
        let socket = Some("10.1.2.3".parse().unwrap());

        assert_eq!(classifier(true).client_ip(&map, socket), "192.0.2.55");
        assert_eq!(classifier(true).client_ip(&HeaderMap::new(), socket), "10.1.2.3");
    }

    #[test]
    fn test_classify_crawler() {
        let map = headers(&[("user-agent", "Mozilla/5.0 (compatible; DuckDuckBot-Https/1.1)")]);
        let classification = classifier(false).classify(&map, None);

        assert!(classification.is_known_crawler());
        assert_eq!(classification.crawler.as_deref(), Some("duckduckbot"));
        assert_eq!(classification.client_ip, "");
    }
}
