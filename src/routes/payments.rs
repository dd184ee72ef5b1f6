use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::payments;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/send-transfer-receipt", post(payments::submit_transfer_receipt))
        .route("/payments", get(payments::get_payments))
        .route("/payments/:payment_id", get(payments::get_payment_by_id))
}
