use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use tokio_util::io::ReaderStream;

use crate::errors::{AppError, Result};
use crate::state::AppState;

pub async fn serve_receipt(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Response> {
    // Security: prevent path traversal
    if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
        return Err(AppError::ReceiptNotFound);
    }

    let file_path = state.intake.upload_dir().join(&file_name);
    if !file_path.is_file() {
        return Err(AppError::ReceiptNotFound);
    }

    let file = tokio::fs::File::open(&file_path)
        .await
        .map_err(|_| AppError::ReceiptNotFound)?;
    let stream = ReaderStream::new(file);

    let lower = file_name.to_lowercase();
    let content_type = if lower.ends_with(".png") {
        mime::IMAGE_PNG.as_ref()
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        mime::IMAGE_JPEG.as_ref()
    } else if lower.ends_with(".pdf") {
        mime::APPLICATION_PDF.as_ref()
    } else {
        mime::APPLICATION_OCTET_STREAM.as_ref()
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(axum::body::Body::from_stream(stream))
        .map_err(|e| AppError::Io(std::io::Error::other(e)))
}
