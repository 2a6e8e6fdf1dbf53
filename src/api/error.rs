use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::scoring::pipeline::AnalyzeError;
use crate::storage::repository::StoreError;

/// Errors surfaced to API callers as `{"error": {"code", "message"}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidSignals(String),

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("monthly request limit exceeded")]
    RateLimitExceeded { reset_at: DateTime<Utc> },

    /// Repository failure. The detail is logged, never returned.
    #[error("internal error")]
    Internal(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidSignals(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidSignals(_) => "INVALID_SIGNALS",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<AnalyzeError> for ApiError {
    fn from(err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::Store(e) => ApiError::Internal(e),
            other => ApiError::InvalidSignals(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref source) = self {
            error!(error = %source, "Repository failure");
        }

        let body = match &self {
            ApiError::RateLimitExceeded { reset_at } => json!({
                "error": {
                    "code": self.code(),
                    "message": self.to_string(),
                    "resetAt": reset_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                }
            }),
            _ => json!({
                "error": {
                    "code": self.code(),
                    "message": self.to_string(),
                }
            }),
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limit_body_carries_reset() {
        let reset_at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let response = ApiError::RateLimitExceeded { reset_at }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["error"]["resetAt"], "2024-12-31T23:59:59Z");
    }

    #[tokio::test]
    async fn test_internal_hides_detail() {
        let err = ApiError::from(StoreError::Unavailable("disk on fire".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INTERNAL");
        assert_eq!(body["error"]["message"], "internal error");
    }

    #[test]
    fn test_analyze_errors_map_to_invalid_signals() {
        let err = ApiError::from(AnalyzeError::NotAnObject);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_SIGNALS");
    }
}
