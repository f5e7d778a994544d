use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Search engine and social crawlers that bypass the reputation check
pub const DEFAULT_CRAWLER_SIGNATURES: &[&str] = &[
    "googlebot",
    "bingbot",
    "slurp",
    "duckduckbot",
    "baiduspider",
    "yandex",
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "semrushbot",
    "ahrefsbot",
];

/// Deployment settings for the edge guard.
/// All fields have sensible defaults so an empty settings file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseSettings {
    pub guard: GuardSettings,
    pub security_headers: SecurityHeadersSettings,
    pub content_policy: ContentPolicySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// ISO 3166-1 alpha-2 code of the only country admitted
    pub allowed_country: String,
    /// Share of VPN visitors from the allowed country asked to solve a challenge
    pub captcha_probability: f64,
    /// Tag allowed-country VPN traffic with `X-VPN-Warning: true`
    pub warn_on_vpn: bool,
    /// Suffix of the diagnostic route, `/debug-ip-<token>`
    pub debug_token: String,
    pub lookup_timeout_ms: u64,
    /// Prefer forwarding headers over the socket address when resolving the client IP
    pub trust_forwarded_headers: bool,
    pub crawler_signatures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityHeadersSettings {
    pub enabled: bool,
    pub x_frame_options: String,
    pub x_content_type_options: String,
    pub strict_transport_security: String,
    pub referrer_policy: String,
    pub permissions_policy: Option<String>,
    pub cross_origin_opener_policy: Option<String>,
    pub cross_origin_resource_policy: Option<String>,
    pub x_robots_tag: Option<String>,
}

/// How the content-security policy allow-list is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllowListStrategyKind {
    /// Fixed, audited list of origins
    #[default]
    Static,
    /// Origins mined from the response markup
    MarkupScan,
    /// Fixed list plus mined origins
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPolicySettings {
    pub enabled: bool,
    pub strategy: AllowListStrategyKind,
    /// Emit per-response nonces and splice them into inline markup
    pub use_nonces: bool,
    /// Keep `style="..."` attributes working via `style-src-attr 'unsafe-inline'`
    pub allow_inline_style_attributes: bool,
    pub upgrade_insecure_requests: bool,
    pub script_sources: Vec<String>,
    pub style_sources: Vec<String>,
    pub img_sources: Vec<String>,
    pub font_sources: Vec<String>,
    pub connect_sources: Vec<String>,
    pub frame_sources: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            allowed_country: "US".to_string(),
            captcha_probability: 0.2,
            warn_on_vpn: false,
            debug_token: "bark9sol".to_string(),
            lookup_timeout_ms: 2500,
            trust_forwarded_headers: false,
            crawler_signatures: strings(DEFAULT_CRAWLER_SIGNATURES),
        }
    }
}

impl Default for SecurityHeadersSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            x_frame_options: "SAMEORIGIN".to_string(),
            x_content_type_options: "nosniff".to_string(),
            strict_transport_security: "max-age=63072000; includeSubDomains; preload".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: Some(
                "geolocation=(), microphone=(), camera=(), payment=()".to_string(),
            ),
            cross_origin_opener_policy: None,
            cross_origin_resource_policy: None,
            x_robots_tag: Some("index, follow".to_string()),
        }
    }
}

impl Default for ContentPolicySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: AllowListStrategyKind::Static,
            use_nonces: true,
            allow_inline_style_attributes: true,
            upgrade_insecure_requests: true,
            script_sources: strings(&[
                "'self'",
                "https://www.googletagmanager.com",
                "https://asset-tidycal.b-cdn.net",
                "https://unpkg.com",
                "https://client.crisp.chat",
                "https://www.google.com",
            ]),
            style_sources: strings(&[
                "'self'",
                "https://unpkg.com",
                "https://fonts.googleapis.com",
                "https://asset-tidycal.b-cdn.net",
                "https://assets.zyrosite.com",
                "https://client.crisp.chat",
            ]),
            img_sources: strings(&["'self'", "data:", "https://assets.zyrosite.com"]),
            font_sources: strings(&["https://fonts.gstatic.com"]),
            connect_sources: strings(&[
                "'self'",
                "https://asset-tidycal.b-cdn.net",
                "https://www.googletagmanager.com",
                "https://www.google-analytics.com",
                "https://basemaps.cartocdn.com",
                "https://tiles.basemaps.cartocdn.com",
                "https://tiles-a.basemaps.cartocdn.com",
                "https://tiles-b.basemaps.cartocdn.com",
                "https://tiles-c.basemaps.cartocdn.com",
                "https://tiles-d.basemaps.cartocdn.com",
                "https://api.sunrise-sunset.org",
                "https://api.weather.gov",
                "https://client.crisp.chat",
                "https://nominatim.openstreetmap.org",
            ]),
            frame_sources: strings(&["https://tidycal.com", "https://client.crisp.chat"]),
        }
    }
}

impl GuardSettings {
    pub fn debug_path(&self) -> String {
        format!("/debug-ip-{}", self.debug_token)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if !(0.0..=1.0).contains(&self.captcha_probability) {
            return Err(ServiceError::configuration(format!(
                "captcha_probability must be within [0, 1], got {}",
                self.captcha_probability
            )));
        }
        if self.allowed_country.trim().is_empty() {
            return Err(ServiceError::configuration("allowed_country is empty"));
        }
        if self.debug_token.is_empty()
            || !self
                .debug_token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ServiceError::configuration(
                "debug_token must be a non-empty run of [A-Za-z0-9_-]",
            ));
        }
        if self.lookup_timeout_ms == 0 {
            return Err(ServiceError::configuration("lookup_timeout_ms must be positive"));
        }
        Ok(())
    }
}

impl GatehouseSettings {
    /// Parse settings from YAML, using defaults for missing fields
    pub fn from_yaml_str(source: &str) -> ServiceResult<Self> {
        let settings: Self = serde_yaml::from_str(source)?;
        settings.guard.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: &Path) -> ServiceResult<Self> {
        let source = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded settings from {}", path.display());
        Self::from_yaml_str(&source)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

impl AllowListStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::MarkupScan => "markup-scan",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for AllowListStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllowListStrategyKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "markup-scan" | "markup_scan" | "markupscan" => Ok(Self::MarkupScan),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!(
                "unknown allow-list strategy '{}', expected static, markup-scan or hybrid",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_guard_settings() {
        let settings = GuardSettings::default();

        assert_eq!(settings.allowed_country, "US");
        assert_eq!(settings.captcha_probability, 0.2);
        assert!(!settings.warn_on_vpn);
        assert_eq!(settings.debug_path(), "/debug-ip-bark9sol");
        assert_eq!(settings.lookup_timeout(), Duration::from_millis(2500));
        assert_eq!(settings.crawler_signatures.len(), 11);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let settings = GatehouseSettings::from_yaml_str("{}").unwrap();

        assert_eq!(settings.content_policy.strategy, AllowListStrategyKind::Static);
        assert!(settings.content_policy.use_nonces);
        assert_eq!(settings.security_headers.x_frame_options, "SAMEORIGIN");
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
guard:
  warn_on_vpn: true
  captcha_probability: 0.5
content_policy:
  strategy: hybrid
  frame_sources:
    - https://calendar.example.com
"#;
        let settings = GatehouseSettings::from_yaml_str(yaml).unwrap();

        assert!(settings.guard.warn_on_vpn);
        assert_eq!(settings.guard.captcha_probability, 0.5);
        assert_eq!(settings.guard.allowed_country, "US");
        assert_eq!(settings.content_policy.strategy, AllowListStrategyKind::Hybrid);
        assert_eq!(
            settings.content_policy.frame_sources,
            vec!["https://calendar.example.com".to_string()]
        );
        // Untouched lists keep their defaults
        assert!(settings
            .content_policy
            .font_sources
            .contains(&"https://fonts.gstatic.com".to_string()));
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let result = GatehouseSettings::from_yaml_str("guard:\n  captcha_probability: 1.5\n");
        assert!(matches!(result, Err(ServiceError::Configuration { .. })));
    }

    #[test]
    fn test_invalid_debug_token_rejected() {
        let settings = GuardSettings {
            debug_token: "../admin".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "guard:\n  debug_token: ops42").unwrap();

        let settings = GatehouseSettings::from_yaml_file(file.path()).unwrap();
        assert_eq!(settings.guard.debug_path(), "/debug-ip-ops42");
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "markup-scan".parse::<AllowListStrategyKind>().unwrap(),
            AllowListStrategyKind::MarkupScan
        );
        assert_eq!(
            "Hybrid".parse::<AllowListStrategyKind>().unwrap(),
            AllowListStrategyKind::Hybrid
        );
        assert!("dynamic".parse::<AllowListStrategyKind>().is_err());
        assert_eq!(AllowListStrategyKind::MarkupScan.to_string(), "markup-scan");
    }
}
