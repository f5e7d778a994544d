use serde::Serialize;

/// Placeholder used when the reputation API omits a field
pub const UNKNOWN: &str = "Unknown";

/// Geography and anonymization-network membership of a client address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReputationRecord {
    pub country_code: String,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
    pub is_relay: bool,
    pub organization: String,
}

impl ReputationRecord {
    /// VPN, proxy, Tor exit or private relay
    pub fn is_anonymized(&self) -> bool {
        self.is_vpn || self.is_proxy || self.is_tor || self.is_relay
    }
}

/// Result of one reputation lookup.
///
/// `Undetermined` is not an error: missing configuration, missing client
/// address and a failed API call all collapse into it, and the policy treats
/// it as "allow".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Detected(ReputationRecord),
    Undetermined { note: String },
}

impl LookupOutcome {
    pub fn undetermined(note: impl Into<String>) -> Self {
        Self::Undetermined { note: note.into() }
    }

    pub fn record(&self) -> Option<&ReputationRecord> {
        match self {
            Self::Detected(record) => Some(record),
            Self::Undetermined { .. } => None,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Detected(_) => None,
            Self::Undetermined { note } => Some(note),
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected(_))
    }
}
