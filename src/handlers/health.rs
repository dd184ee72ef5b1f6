use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root_handler() -> &'static str {
    "🚀 IMF Africa Pay API"
}

pub async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    let database = if state.store.ping().await {
        "Connected"
    } else {
        "Disconnected"
    };
    let notifier = state.notifier();

    Json(json!({
        "status": "OK",
        "database": database,
        "storage": state.store.backend().as_str(),
        "email": if notifier.is_ready() { "Valid" } else { "Invalid" },
        "emailTransport": notifier.transport_name(),
        "port": state.port,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Endpoint not found",
        })),
    )
}
