use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-indicator breakdown of a bot score. Each factor is 0 or 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotFactors {
    pub webdriver: u8,
    pub phantom: u8,
    pub selenium: u8,
    pub chrome_runtime: u8,
    pub inconsistent_permissions: u8,
    pub missing_plugins: u8,
    pub suspicious_user_agent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotScoreResult {
    /// Automation likelihood in [0, 1].
    pub score: f64,
    pub factors: BotFactors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl RiskLevel {
    /// Band for a 0-100 score. Each band is closed on its lower edge.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskLevel::Low,
            30..=59 => RiskLevel::Medium,
            60..=79 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

/// Inputs that produced a risk score, echoed back for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSignals {
    pub is_vpn: bool,
    pub is_tor: bool,
    pub is_datacenter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter_provider: Option<String>,
    pub bot_score: f64,
    pub bot_factors: BotFactors,
    pub timezone_mismatch: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreResult {
    /// Risk in [0, 100].
    pub score: u8,
    pub level: RiskLevel,
    pub signals: RiskSignals,
}
