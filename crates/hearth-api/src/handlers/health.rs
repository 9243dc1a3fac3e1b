use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let connected_users = state.gateway.registry.connected_users().await;
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "connected_users": connected_users,
        "fanout": state.fanout.backend(),
    }))
}
