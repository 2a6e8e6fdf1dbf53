use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Request metadata that changes on every call and must never feed the
/// visitor identity.
pub const VOLATILE_KEYS: [&str; 4] = ["timestamp", "requestTime", "requestId", "sessionId"];

/// Browser telemetry posted by the client script.
///
/// Every field is optional and loosely typed: a known field carrying an
/// unexpected shape reads as absent instead of failing the request. Unknown
/// keys are kept in `extra`; the volatile keys are stripped from `extra` by
/// [`BrowserSignals::from_value`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSignals {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub canvas: Option<String>,

    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub webgl: Option<String>,

    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub navigator: Option<NavigatorSignals>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<Value>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timezone: Option<TimezoneSignals>,

    #[serde(
        default,
        rename = "webrtcIPs",
        deserialize_with = "string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub webrtc_ips: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub bot: Option<BotIndicators>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BrowserSignals {
    /// Typed view of a raw signals object. Never fails: anything that is not
    /// an object yields the empty view.
    pub fn from_value(value: &Value) -> Self {
        let mut signals: BrowserSignals =
            serde_json::from_value(value.clone()).unwrap_or_default();
        for key in VOLATILE_KEYS {
            signals.extra.remove(key);
        }
        signals
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.navigator.as_ref()?.user_agent.as_deref()
    }

    /// Timezone declared by the browser (IANA name).
    pub fn declared_timezone(&self) -> Option<&str> {
        self.timezone.as_ref()?.name()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorSignals {
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Plugin descriptors; only an explicitly empty list is suspicious.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<Value>>,

    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Some browsers report a float; fractional values are truncated.
    #[serde(default, deserialize_with = "count", skip_serializing_if = "Option::is_none")]
    pub hardware_concurrency: Option<u32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A bare IANA name, a bare offset, or an object carrying either.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimezoneSignals {
    Name(String),
    /// Minutes from UTC as reported by `Date.getTimezoneOffset()`.
    Offset(f64),
    Detailed {
        #[serde(
            default,
            alias = "timezone",
            alias = "timeZone",
            deserialize_with = "text",
            skip_serializing_if = "Option::is_none"
        )]
        name: Option<String>,

        #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
        offset: Option<f64>,
    },
}

impl TimezoneSignals {
    pub fn name(&self) -> Option<&str> {
        match self {
            TimezoneSignals::Name(name) => Some(name.as_str()),
            TimezoneSignals::Offset(_) => None,
            TimezoneSignals::Detailed { name, .. } => name.as_deref(),
        }
    }
}

/// Automation indicators gathered by the client script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotIndicators {
    #[serde(default, deserialize_with = "flag")]
    pub webdriver: Option<bool>,

    #[serde(default, deserialize_with = "flag")]
    pub phantom: Option<bool>,

    #[serde(default, deserialize_with = "flag")]
    pub selenium: Option<bool>,

    #[serde(default, deserialize_with = "flag")]
    pub chrome_runtime: Option<bool>,

    #[serde(default, deserialize_with = "flag")]
    pub inconsistent_permissions: Option<bool>,
}

// Field readers. Each accepts any JSON value and maps a shape it does not
// understand to `None`, so no payload object is ever rejected.

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Strings as-is; numbers and booleans in their JSON spelling.
fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
        _ => None,
    })
}

/// Booleans, or numbers read as non-zero.
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    })
}

fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32))
}

/// String entries of a list; other entries are dropped.
fn string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}
