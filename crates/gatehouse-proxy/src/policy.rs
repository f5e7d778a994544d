//! Access policy: maps a reputation lookup onto an access decision

use gatehouse_core::GuardSettings;
use gatehouse_geo::LookupOutcome;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    AllowWithVpnWarning,
    AllowWithCaptchaChallenge,
    Deny,
}

impl AccessDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::AllowWithVpnWarning => "allow_with_vpn_warning",
            Self::AllowWithCaptchaChallenge => "allow_with_captcha_challenge",
            Self::Deny => "deny",
        }
    }
}

/// Signal headers attached to an admitted response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseSignals {
    pub vpn_warning: bool,
    pub show_captcha: bool,
}

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    allowed_country: String,
    captcha_probability: f64,
    warn_on_vpn: bool,
}

impl PolicyEngine {
    pub fn new(settings: &GuardSettings) -> Self {
        Self {
            allowed_country: settings.allowed_country.trim().to_string(),
            captcha_probability: settings.captcha_probability.clamp(0.0, 1.0),
            warn_on_vpn: settings.warn_on_vpn,
        }
    }

    /// Decide access for one request.
    ///
    /// Only allowed-country VPN traffic consumes a random draw. Everything
    /// outside the allowed country is denied, including an unresolved country.
    pub fn decide<R: Rng + ?Sized>(&self, outcome: &LookupOutcome, rng: &mut R) -> AccessDecision {
        let Some(record) = outcome.record() else {
            return AccessDecision::Allow;
        };

        if !record.country_code.eq_ignore_ascii_case(&self.allowed_country) {
            return AccessDecision::Deny;
        }

        if !record.is_vpn {
            return AccessDecision::Allow;
        }

        if rng.gen_bool(self.captcha_probability) {
            AccessDecision::AllowWithCaptchaChallenge
        } else if self.warn_on_vpn {
            AccessDecision::AllowWithVpnWarning
        } else {
            AccessDecision::Allow
        }
    }

    /// Headers implied by a decision. Challenges are only issued to VPN
    /// traffic, so with `warn_on_vpn` they carry the warning too.
    pub fn signals(&self, decision: AccessDecision) -> ResponseSignals {
        match decision {
            AccessDecision::Allow | AccessDecision::Deny => ResponseSignals::default(),
            AccessDecision::AllowWithVpnWarning => ResponseSignals {
                vpn_warning: true,
                show_captcha: false,
            },
            AccessDecision::AllowWithCaptchaChallenge => ResponseSignals {
                vpn_warning: self.warn_on_vpn,
                show_captcha: true,
            },
        }
    }
}
