use axum::{routing::get, Router};

use crate::handlers::health;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health::api_health_check))
}
