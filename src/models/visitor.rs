use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Random, URL-safe visitor id (`vis_` + 16 base64url chars).
pub fn new_visitor_id() -> String {
    let bytes: [u8; 12] = rand::random();
    format!("vis_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// A fingerprinted visitor as stored by the visitor repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    pub id: String,
    pub fingerprint: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub visit_count: u64,
}

impl Visitor {
    /// Identification confidence: 0.5 on first sight, growing 0.1 per repeat
    /// visit up to 0.99.
    pub fn confidence(&self) -> f64 {
        let repeats = self.visit_count.saturating_sub(1) as f64;
        (0.5 + 0.1 * repeats).min(0.99)
    }
}

/// One scored analysis, persisted after every successful request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisitorEvent {
    pub visitor_id: String,
    pub api_key_id: String,
    /// Raw signals as a JSON string.
    pub signals: String,
    pub risk_score: u8,
    pub is_bot: bool,
    pub is_vpn: bool,
    pub is_tor: bool,
    pub is_datacenter: bool,
    pub ip: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Caller identity resolved from an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyContext {
    pub api_key_id: String,
    pub account_id: String,
    pub tier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimit {
    pub monthly_limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor(visit_count: u64) -> Visitor {
        let now = Utc::now();
        Visitor {
            id: "vis_test".into(),
            fingerprint: "f".repeat(64),
            first_seen: now,
            last_seen: now,
            visit_count,
        }
    }

    #[test]
    fn test_confidence_grows_with_visits() {
        assert_eq!(visitor(1).confidence(), 0.5);
        assert!(visitor(2).confidence() > 0.5);
        assert!(visitor(3).confidence() > visitor(2).confidence());
        assert_eq!(visitor(500).confidence(), 0.99);
    }

    #[test]
    fn test_visitor_ids_are_unique_and_url_safe() {
        let a = new_visitor_id();
        let b = new_visitor_id();
        assert_ne!(a, b);
        assert!(a.starts_with("vis_"));
        assert_eq!(a.len(), 20);
        assert!(a[4..].chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
