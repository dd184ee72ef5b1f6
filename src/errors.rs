// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::file_intake::UploadError;
use crate::services::notifier::NotifyError;
use crate::services::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Multipart error: {0}")]
    Multipart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ValidationError(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Payment record not found")]
    PaymentNotFound,

    #[error("Receipt not found")]
    ReceiptNotFound,

    #[error("Notification already in progress for payment {0}")]
    NotificationInProgress(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Multipart(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentNotFound | AppError::ReceiptNotFound => StatusCode::NOT_FOUND,
            AppError::NotificationInProgress(_) => StatusCode::CONFLICT,
            AppError::Notify(NotifyError::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Notify(NotifyError::Provider { .. } | NotifyError::Timeout { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Notify(_)
            | AppError::Io(_)
            | AppError::Storage(_)
            | AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Client errors carry their reason; server faults get a stable label.
        let error_message = match &self {
            AppError::Io(_) | AppError::Upload(UploadError::Io(_)) => {
                "Failed to store receipt file".to_string()
            }
            AppError::Storage(_) => "Failed to process transfer receipt".to_string(),
            AppError::ConfigurationError(_) => "Configuration error".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("{} -> {}", status, self);
        }

        let body = Json(json!({
            "success": false,
            "error": error_message,
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<axum_extra::extract::multipart::MultipartError> for AppError {
    fn from(err: axum_extra::extract::multipart::MultipartError) -> Self {
        AppError::Multipart(err.to_string())
    }
}

impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
