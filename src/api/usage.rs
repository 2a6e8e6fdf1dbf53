use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::models::visitor::ApiKeyContext;
use crate::usage::tracker::UsageDecision;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Axum middleware enforcing the caller's monthly quota. Must run behind
/// [`require_api_key`](crate::api::auth::require_api_key). Admitted and
/// rejected responses both carry the rate-limit headers.
pub async fn enforce_quota(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = req
        .extensions()
        .get::<ApiKeyContext>()
        .cloned()
        .ok_or(ApiError::Unauthorized)?;

    let decision = state.usage.check_and_consume(&key)?;

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        ApiError::RateLimitExceeded {
            reset_at: decision.reset_at,
        }
        .into_response()
    };
    apply_rate_limit_headers(response.headers_mut(), &decision);

    Ok(response)
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &UsageDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at.timestamp()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_headers_are_numeric() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(
            &mut headers,
            &UsageDecision {
                allowed: true,
                limit: 1000,
                remaining: 998,
                reset_at: Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
            },
        );
        assert_eq!(headers[LIMIT_HEADER], "1000");
        assert_eq!(headers[REMAINING_HEADER], "998");
        assert_eq!(headers[RESET_HEADER], "1735689599");
    }
}
