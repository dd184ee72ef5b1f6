use axum::{routing::get, Router};

use crate::handlers::upload;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/:file_name", get(upload::serve_receipt))
}
