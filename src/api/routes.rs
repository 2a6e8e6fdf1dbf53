use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::client_ip::ClientIp;
use crate::api::error::ApiError;
use crate::models::verdict::RiskLevel;
use crate::models::visitor::ApiKeyContext;
use crate::scoring::pipeline::AnalysisPipeline;
use crate::storage::repository::ApiKeyRepository;
use crate::usage::tracker::UsageTracker;

/// Shared handles for every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub usage: Arc<UsageTracker>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub signals: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub visitor_id: String,
    pub confidence: f64,
    pub visit_count: u64,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// `POST /v1/analyze`
pub async fn analyze(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKeyContext>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::InvalidSignals(e.body_text()))?;

    let signals = match body.signals {
        Some(signals @ Value::Object(_)) => signals,
        Some(_) => return Err(ApiError::InvalidSignals("signals must be an object".into())),
        None => return Err(ApiError::InvalidSignals("signals is required".into())),
    };

    let analysis = state
        .pipeline
        .analyze(&signals, ip.as_deref(), &key.api_key_id)?;

    Ok(Json(AnalyzeResponse {
        confidence: analysis.visitor.confidence(),
        visit_count: analysis.visitor.visit_count,
        risk_score: analysis.risk.score,
        risk_level: analysis.risk.level,
        first_seen: analysis.visitor.first_seen,
        last_seen: analysis.visitor.last_seen,
        visitor_id: analysis.visitor.id,
    }))
}

/// `GET /health`. Reports dataset state without triggering a load.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let pipeline = &state.pipeline;
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.start_time.elapsed().as_secs(),
        "datasets": {
            "vpnRanges": pipeline.vpn.range_count(),
            "torExitNodes": pipeline.tor.tor_list_size(),
            "datacenterRanges": pipeline.datacenter.range_count(),
            "loaded": {
                "vpn": pipeline.vpn.is_loaded(),
                "tor": pipeline.tor.is_loaded(),
                "datacenter": pipeline.datacenter.is_loaded(),
            }
        }
    }))
}
