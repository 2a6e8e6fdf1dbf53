use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::api::error::ApiError;
use crate::api::routes::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Stored form of an API key: base64url SHA-256 of the raw key.
pub fn hash_api_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key.as_bytes()))
}

/// Stable, non-secret id derived from the key hash.
pub fn api_key_id(key_hash: &str) -> String {
    let prefix: String = key_hash.chars().take(12).collect();
    format!("key_{}", prefix)
}

/// Axum middleware that resolves `X-API-Key` to an [`ApiKeyContext`] and
/// stores it in the request extensions for the layers and handlers behind it.
///
/// [`ApiKeyContext`]: crate::models::visitor::ApiKeyContext
pub async fn require_api_key(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key_hash = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(hash_api_key)
        .ok_or(ApiError::Unauthorized)?;

    let Some(ctx) = state.api_keys.find_api_key(&key_hash)? else {
        debug!("Rejected unknown API key");
        return Err(ApiError::Unauthorized);
    };

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_not_the_key() {
        let a = hash_api_key("rk_live_123");
        assert_eq!(a, hash_api_key("rk_live_123"));
        assert_ne!(a, hash_api_key("rk_live_124"));
        assert_eq!(a.len(), 43);
        assert!(!a.contains("rk_live"));
    }

    #[test]
    fn test_key_id_from_hash() {
        let id = api_key_id(&hash_api_key("rk_live_123"));
        assert!(id.starts_with("key_"));
        assert_eq!(id.len(), 16);
    }
}
