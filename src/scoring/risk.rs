//! Additive, clamped risk aggregation over independently computed signals.
//!
//! The Tor and VPN contributions are fixed: Tor alone lands exactly on 40
//! (medium) and a VPN alone on 25 (still low). The remaining contributions
//! come from `[scoring]` in the config.

use tracing::debug;

use crate::config::defaults;
use crate::config::settings::ScoringConfig;
use crate::models::signals::BrowserSignals;
use crate::models::verdict::{BotScoreResult, RiskLevel, RiskScoreResult, RiskSignals};

pub const TOR_SCORE: f64 = 40.0;
pub const VPN_SCORE: f64 = 25.0;

/// Everything the aggregator looks at for one request.
#[derive(Debug, Clone)]
pub struct RiskInput<'a> {
    pub signals: &'a BrowserSignals,
    pub ip: Option<&'a str>,
    pub is_vpn: bool,
    pub is_tor: bool,
    pub is_datacenter: bool,
    pub datacenter_provider: Option<String>,
    /// Timezone of the IP's geolocation, when known.
    pub geo_timezone: Option<String>,
}

impl<'a> RiskInput<'a> {
    /// Input with no IP classification and no geolocation.
    pub fn new(signals: &'a BrowserSignals) -> Self {
        Self {
            signals,
            ip: None,
            is_vpn: false,
            is_tor: false,
            is_datacenter: false,
            datacenter_provider: None,
            geo_timezone: None,
        }
    }
}

pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    #[cfg(test)]
    pub fn calculate(&self, input: &RiskInput<'_>) -> RiskScoreResult {
        let bot = super::bot::calculate_bot_score(input.signals);
        self.calculate_with_bot(input, bot)
    }

    /// Aggregate with a bot score computed by the caller.
    pub fn calculate_with_bot(&self, input: &RiskInput<'_>, bot: BotScoreResult) -> RiskScoreResult {
        let timezone_mismatch = timezone_mismatch(
            input.signals.declared_timezone(),
            input.geo_timezone.as_deref(),
        );

        let mut total = 0.0;
        if input.is_tor {
            total += TOR_SCORE;
        }
        if input.is_vpn {
            total += VPN_SCORE;
        }
        if input.is_datacenter {
            total += self.config.datacenter_score;
        }
        if timezone_mismatch {
            total += self.config.timezone_mismatch_score;
        }
        total += bot.score * self.config.bot_score_scale;

        let score = total.clamp(0.0, 100.0).round() as u8;
        let level = get_risk_level(score);

        debug!(
            ip = input.ip.unwrap_or("-"),
            score,
            level = %level,
            is_tor = input.is_tor,
            is_vpn = input.is_vpn,
            is_datacenter = input.is_datacenter,
            bot_score = bot.score,
            timezone_mismatch,
            "Risk score calculated"
        );

        RiskScoreResult {
            score,
            level,
            signals: RiskSignals {
                is_vpn: input.is_vpn,
                is_tor: input.is_tor,
                is_datacenter: input.is_datacenter,
                datacenter_provider: input.datacenter_provider.clone(),
                bot_score: bot.score,
                bot_factors: bot.factors,
                timezone_mismatch: u8::from(timezone_mismatch),
            },
        }
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(&defaults::default_scoring_config())
    }
}

/// Score with the default tunables.
#[cfg(test)]
pub fn calculate_risk_score(input: &RiskInput<'_>) -> RiskScoreResult {
    RiskScorer::default().calculate(input)
}

pub fn get_risk_level(score: u8) -> RiskLevel {
    RiskLevel::from_score(score)
}

/// Mismatch only when both sides are known and differ.
fn timezone_mismatch(declared: Option<&str>, geo: Option<&str>) -> bool {
    match (declared, geo) {
        (Some(declared), Some(geo)) => {
            let (declared, geo) = (declared.trim(), geo.trim());
            !declared.is_empty() && !geo.is_empty() && !declared.eq_ignore_ascii_case(geo)
        }
        _ => false,
    }
}
