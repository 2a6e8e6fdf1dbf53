//! Stable visitor identity from browser signals.
//!
//! The hash input is a canonical JSON rendering of the raw signals object:
//! volatile request metadata removed from the top level, object keys sorted
//! at every depth, arrays left in their original order (WebRTC candidate
//! order is itself a signal). The rendering is done by hand so the result
//! does not depend on how `serde_json::Map` happens to order its keys.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::signals::VOLATILE_KEYS;

/// Lowercase hex SHA-256 of the canonical signals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn compute_fingerprint(signals: &Value) -> Fingerprint {
    let canonical = canonical_json(signals);
    let digest = Sha256::digest(canonical.as_bytes());
    Fingerprint(to_hex(&digest))
}

/// Canonical text hashed by [`compute_fingerprint`].
pub fn canonical_json(signals: &Value) -> String {
    let mut out = String::new();
    match signals {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(k, _)| !VOLATILE_KEYS.contains(&k.as_str()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            write_object(&entries, &mut out);
        }
        other => write_value(other, &mut out),
    }
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            write_object(&entries, out);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // Scalars (including null) use serde_json's own escaping and number
        // formatting.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(entries: &[(&String, &Value)], out: &mut String) {
    out.push('{');
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String((*key).clone()).to_string());
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{:02x}", b);
    }
    hex
}
