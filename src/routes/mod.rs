use axum::Router;

use crate::state::AppState;

pub(crate) mod health;
pub(crate) mod notifications;
pub(crate) mod payments;
pub(crate) mod uploads;

/// Everything mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(payments::routes())
        .merge(notifications::routes())
}
