use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::json;

use crate::errors::{AppError, Result};
use crate::models::notification::{NotifyOutcome, TestEmailRequest};
use crate::state::AppState;

pub async fn send_notification(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    tracing::info!("📤 Sending notifications for payment: {}", payment_id);

    match state.notifications.notify_record(&payment_id).await? {
        NotifyOutcome::Sent(record) => Ok(Json(json!({
            "success": true,
            "message": "Notification sent successfully",
            "data": record,
        }))),
        NotifyOutcome::AlreadySent(record) => Ok(Json(json!({
            "success": true,
            "message": "Notification already sent previously",
            "data": record,
        }))),
        NotifyOutcome::InProgress => Err(AppError::NotificationInProgress(payment_id)),
    }
}

pub async fn send_pending_notifications(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let summary = state.notifications.notify_all_pending().await?;

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Sent {} notifications, {} already sent, {} failed",
            summary.sent, summary.already_sent, summary.failed
        ),
        "data": summary,
    })))
}

pub async fn send_test_email(
    State(state): State<AppState>,
    Json(payload): Json<TestEmailRequest>,
) -> Result<Json<serde_json::Value>> {
    if !state.notifier().is_ready() {
        return Err(AppError::invalid_data("Email transporter not initialized"));
    }

    let (to, subject, text) = match (payload.to, payload.subject, payload.text) {
        (Some(to), Some(subject), Some(text))
            if !to.trim().is_empty() && !subject.trim().is_empty() && !text.trim().is_empty() =>
        {
            (to, subject, text)
        }
        _ => {
            return Err(AppError::invalid_data(
                "Missing required fields: to, subject, text",
            ))
        }
    };

    state.notifier().send_test(to.trim(), &subject, &text).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Test email sent successfully",
    })))
}
