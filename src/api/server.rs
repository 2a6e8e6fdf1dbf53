use std::net::SocketAddr;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::routes::AppState;
use crate::api::{auth, routes, usage};

/// `/v1/*` sits behind API-key auth, then quota enforcement. `/health` is
/// open.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Layers run outermost-last: auth wraps quota.
    let v1 = Router::new()
        .route("/v1/analyze", post(routes::analyze))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            usage::enforce_quota,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(v1)
        .layer(cors)
        .with_state(state)
}

pub struct ApiServer {
    state: AppState,
    bind_addr: String,
}

impl ApiServer {
    pub fn new(state: AppState, bind_addr: String) -> Self {
        Self { state, bind_addr }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let app = build_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
        info!("Scoring API listening on {}", self.bind_addr);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}
