use axum::{routing::post, Router};

use crate::handlers::notifications;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/send-notifications/:payment_id", post(notifications::send_notification))
        .route(
            "/send-pending-notifications",
            post(notifications::send_pending_notifications),
        )
        .route("/test-email", post(notifications::send_test_email))
}
