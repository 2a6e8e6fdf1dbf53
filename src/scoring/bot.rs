use tracing::debug;

use crate::models::signals::BrowserSignals;
use crate::models::verdict::{BotFactors, BotScoreResult};

const WEBDRIVER_WEIGHT: f64 = 0.40;
const PHANTOM_WEIGHT: f64 = 0.30;
const SELENIUM_WEIGHT: f64 = 0.30;
const CHROME_RUNTIME_WEIGHT: f64 = 0.15;
const INCONSISTENT_PERMISSIONS_WEIGHT: f64 = 0.20;
const MISSING_PLUGINS_WEIGHT: f64 = 0.15;
const SUSPICIOUS_UA_WEIGHT: f64 = 0.30;

/// Lowercase user-agent fragments left by headless or driven browsers.
const HEADLESS_MARKERS: &[&str] = &[
    "headlesschrome",
    "headless",
    "phantomjs",
    "puppeteer",
    "playwright",
    "selenium",
    "webdriver",
];

/// Score automation indicators. Each present indicator adds its weight; the
/// sum is capped at 1.0.
pub fn calculate_bot_score(signals: &BrowserSignals) -> BotScoreResult {
    let bot = signals.bot.clone().unwrap_or_default();
    let flag = |v: Option<bool>| u8::from(v.unwrap_or(false));

    let missing_plugins = signals
        .navigator
        .as_ref()
        .and_then(|n| n.plugins.as_ref())
        .is_some_and(|plugins| plugins.is_empty());

    let factors = BotFactors {
        webdriver: flag(bot.webdriver),
        phantom: flag(bot.phantom),
        selenium: flag(bot.selenium),
        chrome_runtime: flag(bot.chrome_runtime),
        inconsistent_permissions: flag(bot.inconsistent_permissions),
        missing_plugins: u8::from(missing_plugins),
        suspicious_user_agent: u8::from(signals.user_agent().is_some_and(is_headless_user_agent)),
    };

    let weighted = [
        (factors.webdriver, WEBDRIVER_WEIGHT),
        (factors.phantom, PHANTOM_WEIGHT),
        (factors.selenium, SELENIUM_WEIGHT),
        (factors.chrome_runtime, CHROME_RUNTIME_WEIGHT),
        (factors.inconsistent_permissions, INCONSISTENT_PERMISSIONS_WEIGHT),
        (factors.missing_plugins, MISSING_PLUGINS_WEIGHT),
        (factors.suspicious_user_agent, SUSPICIOUS_UA_WEIGHT),
    ];
    let sum: f64 = weighted.iter().map(|&(hit, weight)| f64::from(hit) * weight).sum();
    let score = sum.clamp(0.0, 1.0);

    if score > 0.0 {
        debug!(score, ?factors, "Automation indicators present");
    }

    BotScoreResult { score, factors }
}

pub fn is_headless_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    HEADLESS_MARKERS.iter().any(|m| ua.contains(m))
}
