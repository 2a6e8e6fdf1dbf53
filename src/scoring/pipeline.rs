use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::settings::ScoringConfig;
use crate::intel::datacenter::DatacenterClassifier;
use crate::intel::ip::is_private_ip;
use crate::intel::tor::TorClassifier;
use crate::intel::vpn::VpnClassifier;
use crate::models::signals::BrowserSignals;
use crate::models::verdict::RiskScoreResult;
use crate::models::visitor::{NewVisitorEvent, Visitor};
use crate::storage::repository::{StoreError, VisitorRepository};

use super::bot::calculate_bot_score;
use super::fingerprint::compute_fingerprint;
use super::risk::{RiskInput, RiskScorer};

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("signals must be a JSON object")]
    NotAnObject,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Verdict for one analyzed request.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub visitor: Visitor,
    pub risk: RiskScoreResult,
    pub is_bot: bool,
}

/// Runs one request through identification and scoring:
///
/// 1. Object check and lenient typed view of the signals
/// 2. Fingerprint over the raw object
/// 3. Visitor upsert
/// 4. VPN / Tor / datacenter lookups on the client IP
/// 5. Bot score and risk aggregation
/// 6. Visitor event persisted
pub struct AnalysisPipeline {
    pub vpn: Arc<VpnClassifier>,
    pub tor: Arc<TorClassifier>,
    pub datacenter: Arc<DatacenterClassifier>,
    visitors: Arc<dyn VisitorRepository>,
    scorer: RiskScorer,
    bot_threshold: f64,
}

impl AnalysisPipeline {
    pub fn new(
        vpn: Arc<VpnClassifier>,
        tor: Arc<TorClassifier>,
        datacenter: Arc<DatacenterClassifier>,
        visitors: Arc<dyn VisitorRepository>,
        scoring: &ScoringConfig,
    ) -> Self {
        Self {
            vpn,
            tor,
            datacenter,
            visitors,
            scorer: RiskScorer::new(scoring),
            bot_threshold: scoring.bot_threshold,
        }
    }

    /// Drop every cached reference dataset; each reloads on its next lookup.
    pub fn reset_datasets(&self) {
        self.vpn.reset();
        self.tor.reset();
        self.datacenter.reset();
    }

    pub fn analyze(
        &self,
        raw: &Value,
        ip: Option<&str>,
        api_key_id: &str,
    ) -> Result<Analysis, AnalyzeError> {
        if !raw.is_object() {
            return Err(AnalyzeError::NotAnObject);
        }
        let signals = BrowserSignals::from_value(raw);

        let fingerprint = compute_fingerprint(raw);
        let visitor = self.visitors.upsert_visitor(fingerprint.as_str())?;
        debug!(
            visitor_id = %visitor.id,
            visit_count = visitor.visit_count,
            fingerprint = %fingerprint,
            "Visitor resolved"
        );

        if let Some(private) = ip.filter(|addr| is_private_ip(addr)) {
            debug!(ip = private, "Private client address, missing X-Forwarded-For?");
        }

        let (is_vpn, is_tor, datacenter_provider) = match ip {
            Some(ip) => (
                self.vpn.is_vpn_ip(ip),
                self.tor.is_tor_exit_node(ip),
                self.datacenter.is_datacenter_ip(ip),
            ),
            None => (false, false, None),
        };

        let bot = calculate_bot_score(&signals);
        let is_bot = bot.score >= self.bot_threshold;

        let input = RiskInput {
            ip,
            is_vpn,
            is_tor,
            is_datacenter: datacenter_provider.is_some(),
            datacenter_provider,
            ..RiskInput::new(&signals)
        };
        let risk = self.scorer.calculate_with_bot(&input, bot);

        self.visitors.create_visitor_event(&NewVisitorEvent {
            visitor_id: visitor.id.clone(),
            api_key_id: api_key_id.to_string(),
            signals: raw.to_string(),
            risk_score: risk.score,
            is_bot,
            is_vpn: risk.signals.is_vpn,
            is_tor: risk.signals.is_tor,
            is_datacenter: risk.signals.is_datacenter,
            ip: ip.map(str::to_string),
            timestamp: Utc::now(),
        })?;

        info!(
            visitor_id = %visitor.id,
            ip = ip.unwrap_or("-"),
            risk_score = risk.score,
            risk_level = %risk.level,
            is_bot,
            "Visitor analyzed"
        );

        Ok(Analysis {
            visitor,
            risk,
            is_bot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::defaults;
    use crate::models::verdict::RiskLevel;
    use crate::storage::memory::MemoryStore;

    fn pipeline(store: Arc<MemoryStore>) -> AnalysisPipeline {
        let vpn = VpnClassifier::detached();
        vpn.load_from_str("185.159.156.0/22\n");
        let tor = TorClassifier::detached();
        tor.load_from_str("185.220.101.1\n");
        let datacenter = DatacenterClassifier::detached();
        datacenter.load_from_str("3.0.0.0,3.255.255.255,Amazon AWS\n");

        AnalysisPipeline::new(
            Arc::new(vpn),
            Arc::new(tor),
            Arc::new(datacenter),
            store,
            &defaults::default_scoring_config(),
        )
    }

    #[test]
    fn test_clean_visitor() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());

        let analysis = pipeline
            .analyze(&json!({ "canvas": "c1" }), Some("198.51.100.7"), "key_1")
            .unwrap();
        assert_eq!(analysis.risk.score, 0);
        assert_eq!(analysis.risk.level, RiskLevel::Low);
        assert!(!analysis.is_bot);
        assert_eq!(analysis.visitor.visit_count, 1);

        let events = store.events_for(&analysis.visitor.id);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].api_key_id, "key_1");
        assert_eq!(events[0].ip.as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn test_repeat_visit_reuses_visitor() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());

        let first = pipeline
            .analyze(&json!({ "canvas": "c1", "requestId": "a" }), None, "key_1")
            .unwrap();
        let second = pipeline
            .analyze(&json!({ "requestId": "b", "canvas": "c1" }), None, "key_1")
            .unwrap();
        assert_eq!(first.visitor.id, second.visitor.id);
        assert_eq!(second.visitor.visit_count, 2);
        assert!(second.visitor.confidence() > first.visitor.confidence());
        assert_eq!(store.events_for(&first.visitor.id).len(), 2);
    }

    #[test]
    fn test_ip_classification_feeds_score() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store);

        let tor = pipeline.analyze(&json!({}), Some("185.220.101.1"), "k").unwrap();
        assert!(tor.risk.signals.is_tor);
        assert_eq!(tor.risk.score, 40);

        let vpn = pipeline.analyze(&json!({}), Some("185.159.157.20"), "k").unwrap();
        assert!(vpn.risk.signals.is_vpn);
        assert_eq!(vpn.risk.score, 25);

        let aws = pipeline.analyze(&json!({}), Some("3.5.140.2"), "k").unwrap();
        assert!(aws.risk.signals.is_datacenter);
        assert_eq!(aws.risk.signals.datacenter_provider.as_deref(), Some("Amazon AWS"));
        assert_eq!(aws.risk.score, 15);

        let v6 = pipeline.analyze(&json!({}), Some("2001:db8::1"), "k").unwrap();
        assert_eq!(v6.risk.score, 0);
    }

    #[test]
    fn test_bot_flag_uses_threshold() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());

        let analysis = pipeline
            .analyze(
                &json!({ "bot": { "webdriver": true, "selenium": true } }),
                None,
                "k",
            )
            .unwrap();
        assert!(analysis.is_bot);
        assert_eq!(analysis.risk.score, 28);
        assert!(store.events_for(&analysis.visitor.id)[0].is_bot);
    }

    #[test]
    fn test_invalid_signals_persist_nothing() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());

        assert!(matches!(
            pipeline.analyze(&json!("nope"), None, "k"),
            Err(AnalyzeError::NotAnObject)
        ));
        assert_eq!(store.event_count(), 0);
    }

    #[test]
    fn test_reset_datasets_unloads_everything() {
        let pipeline = pipeline(Arc::new(MemoryStore::new()));
        assert!(pipeline.vpn.is_loaded() && pipeline.tor.is_loaded() && pipeline.datacenter.is_loaded());

        pipeline.reset_datasets();
        assert!(!pipeline.vpn.is_loaded());
        assert!(!pipeline.tor.is_loaded());
        assert!(!pipeline.datacenter.is_loaded());
        assert_eq!(pipeline.tor.tor_list_size(), 0);

        // Detached classifiers have no file behind them, so the reload
        // degrades to an empty list.
        let tor = pipeline.analyze(&json!({}), Some("185.220.101.1"), "k").unwrap();
        assert!(!tor.risk.signals.is_tor);
        assert!(pipeline.tor.is_loaded());
    }

    #[test]
    fn test_private_address_is_still_scored() {
        let pipeline = pipeline(Arc::new(MemoryStore::new()));
        let analysis = pipeline.analyze(&json!({}), Some("10.0.0.8"), "k").unwrap();
        assert_eq!(analysis.risk.score, 0);
    }

    #[test]
    fn test_loosely_typed_payloads_are_scored() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());

        let payloads = [
            json!({ "canvas": 1234567 }),
            json!({ "timezone": -300 }),
            json!({ "navigator": { "hardwareConcurrency": 4.0, "plugins": 3 } }),
            json!({ "webrtcIPs": [null] }),
            json!({ "bot": { "selenium": 1, "webdriver": null } }),
        ];
        for payload in &payloads {
            assert!(pipeline.analyze(payload, None, "k").is_ok(), "payload {}", payload);
        }
        assert_eq!(store.event_count(), payloads.len());

        let truthy = pipeline
            .analyze(&json!({ "bot": { "selenium": 1 } }), None, "k")
            .unwrap();
        assert_eq!(truthy.risk.signals.bot_factors.selenium, 1);
    }
}
