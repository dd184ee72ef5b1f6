use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::LazyLock;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    response::Json,
};
use axum_extra::extract::Multipart;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::payment::{NewPayment, PaymentQuery, SubmissionForm};
use crate::services::file_intake::{UploadError, UploadedFile};
use crate::state::AppState;

static LAST_REFERENCE: AtomicI64 = AtomicI64::new(0);

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

struct ReceiptPart {
    file_name: String,
    content_type: String,
    data: Bytes,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Finite and strictly positive, otherwise `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite() && *amount > 0.0)
}

/// `IMF-<millis>`, bumped past the last issued value so references never repeat
/// within the process.
fn generate_reference() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_REFERENCE.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_REFERENCE.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return format!("IMF-{}", candidate),
            Err(actual) => last = actual,
        }
    }
}

pub async fn submit_transfer_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut form = SubmissionForm::default();
    let mut receipt: Option<ReceiptPart> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "name" => form.name = field.text().await?.trim().to_string(),
            "email" => form.email = field.text().await?.trim().to_string(),
            "amount" => form.amount = field.text().await?.trim().to_string(),
            "serviceType" => form.service_type = field.text().await?.trim().to_string(),
            "reference" => form.reference = field.text().await?.trim().to_string(),
            "receipt" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field
                    .content_type()
                    .map(|ct| ct.to_string())
                    .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

                // An empty file input still sends a part with no filename.
                if file_name.is_empty() && content_type == mime::APPLICATION_OCTET_STREAM.as_ref() {
                    continue;
                }

                state.intake.check(&content_type, 0)?;

                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await? {
                    data.extend_from_slice(&chunk);
                    state.intake.check_size(data.len() as u64)?;
                }

                receipt = Some(ReceiptPart {
                    file_name,
                    content_type,
                    data: data.freeze(),
                });
            }
            _ => {}
        }
    }

    if form.validate().is_err() {
        return Err(AppError::invalid_data("All fields are required"));
    }
    if !is_valid_email(&form.email) {
        return Err(AppError::invalid_data("Invalid email format"));
    }
    let amount = parse_amount(&form.amount).ok_or_else(|| AppError::invalid_data("Invalid amount"))?;
    if receipt.is_none() && state.intake.receipt_required() {
        return Err(UploadError::MissingReceipt.into());
    }

    let reference = if form.reference.is_empty() {
        generate_reference()
    } else {
        form.reference
    };

    let uploaded: Option<UploadedFile> = match receipt {
        Some(part) => Some(
            state
                .intake
                .accept_upload(&part.file_name, &part.content_type, part.data)
                .await?,
        ),
        None => None,
    };

    let payment = NewPayment {
        name: form.name,
        email: form.email,
        amount,
        service_type: form.service_type,
        reference,
        receipt_path: uploaded.as_ref().map(|f| f.path_string()).unwrap_or_default(),
        receipt_file_name: uploaded.as_ref().map(|f| f.original_name.clone()),
        timestamp: None,
    };

    let saved = match state.store.save(payment).await {
        Ok(record) => record,
        Err(e) => {
            if let Some(file) = &uploaded {
                state.intake.discard(file).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        "💳 Payment {} saved ({}, {} via {}, receipt: {})",
        saved.id,
        saved.reference,
        saved.amount,
        state.store.backend().as_str(),
        uploaded.as_ref().map_or("none", |f| f.content_type.as_str())
    );

    state.queue.enqueue(saved.id.clone());

    Ok(Json(json!({
        "success": true,
        "message": "Transfer receipt submitted successfully",
        "data": saved,
    })))
}

pub async fn get_payments(
    State(state): State<AppState>,
    query: std::result::Result<Query<PaymentQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>> {
    let Query(query) = query.map_err(|rejection| AppError::invalid_data(rejection.body_text()))?;
    let payments = state.store.list(query.notified).await?;

    Ok(Json(json!({
        "success": true,
        "count": payments.len(),
        "data": payments,
    })))
}

pub async fn get_payment_by_id(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let payment = state
        .store
        .get_by_id(&payment_id)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    Ok(Json(json!({
        "success": true,
        "data": payment,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MultipartForm, RecordingTransport, TestApp, UnavailableStore};
    use axum::http::StatusCode;
    use std::sync::Arc;

    const FIVE_MIB: usize = 5 * 1024 * 1024;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane example@x.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@@example.com"));
    }

    #[test]
    fn amount_parsing() {
        assert_eq!(parse_amount("100"), Some(100.0));
        assert_eq!(parse_amount(" 12.50 "), Some(12.5));
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn references_never_repeat() {
        let references: std::collections::HashSet<String> =
            (0..1000).map(|_| generate_reference()).collect();
        assert_eq!(references.len(), 1000);
        assert!(references.iter().all(|r| r.starts_with("IMF-")));
    }

    #[tokio::test]
    async fn reference_scenario_with_pdf_receipt() {
        // Held sends keep the background notification from completing.
        let app = TestApp::with_transport(Arc::new(RecordingTransport::gated()), false).await;
        let pdf = vec![b'%'; 2048];

        let (status, body) = app
            .post_multipart(
                "/api/send-transfer-receipt",
                MultipartForm::jane_doe().file("receipt", "receipt.pdf", "application/pdf", &pdf),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["reference"], "IMF-1700000000000");
        assert_eq!(body["data"]["notificationSent"], false);
        assert_eq!(body["data"]["amount"], 100.0);
        assert_eq!(body["data"]["receiptFileName"], "receipt.pdf");
        assert!(body["data"]["receiptPath"].as_str().unwrap().ends_with(".pdf"));
        assert_eq!(app.stored_files(), 1);

        let id = body["data"]["id"].as_str().unwrap().to_string();
        let (status, fetched) = app.get(&format!("/api/payments/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"]["notificationSent"], false);
        assert_eq!(app.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn submission_is_notified_in_the_background() {
        let app = TestApp::new().await;
        let (status, body) = app
            .post_multipart("/api/send-transfer-receipt", MultipartForm::jane_doe())
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let mut notified = false;
        for _ in 0..100 {
            let record = app.store.get_by_id(&id).await.unwrap().unwrap();
            if record.notification_sent {
                notified = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(notified);
        assert_eq!(app.transport.sent_count(), 2);
    }

    #[tokio::test]
    async fn rejects_bad_amounts_without_creating_records() {
        let app = TestApp::new().await;
        for amount in ["0", "-10", "abc", ""] {
            let form = MultipartForm::new()
                .text("name", "Jane Doe")
                .text("email", "jane@example.com")
                .text("amount", amount)
                .text("serviceType", "Membership Only")
                .text("reference", "IMF-1");
            let (status, body) = app.post_multipart("/api/send-transfer-receipt", form).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "amount {:?}", amount);
            assert_eq!(body["success"], false);
        }
        assert!(app.store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_malformed_email() {
        let app = TestApp::new().await;
        let form = MultipartForm::new()
            .text("name", "Jane Doe")
            .text("email", "jane@example")
            .text("amount", "100")
            .text("serviceType", "Membership Only");
        let (status, body) = app.post_multipart("/api/send-transfer-receipt", form).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid email format");
        assert!(app.store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let app = TestApp::new().await;
        let form = MultipartForm::new().text("name", "Jane Doe");
        let (status, body) = app.post_multipart("/api/send-transfer-receipt", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "All fields are required");
    }

    #[tokio::test]
    async fn generates_reference_when_absent() {
        let app = TestApp::new().await;
        let form = MultipartForm::new()
            .text("name", "Jane Doe")
            .text("email", "jane@example.com")
            .text("amount", "100")
            .text("serviceType", "Membership Only");
        let (status, body) = app.post_multipart("/api/send-transfer-receipt", form).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["reference"].as_str().unwrap().starts_with("IMF-"));
    }

    #[tokio::test]
    async fn generated_references_are_unique_under_burst() {
        let app = TestApp::with_transport(Arc::new(RecordingTransport::gated()), false).await;
        let mut references = std::collections::HashSet::new();
        for _ in 0..20 {
            let form = MultipartForm::new()
                .text("name", "Jane Doe")
                .text("email", "jane@example.com")
                .text("amount", "100")
                .text("serviceType", "Membership Only");
            let (status, body) = app.post_multipart("/api/send-transfer-receipt", form).await;
            assert_eq!(status, StatusCode::OK);
            references.insert(body["data"]["reference"].as_str().unwrap().to_string());
        }
        assert_eq!(references.len(), 20);
    }

    #[tokio::test]
    async fn failed_save_discards_receipt_and_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let app = TestApp::with_store(Arc::new(UnavailableStore), transport).await;

        let form = MultipartForm::jane_doe().file("receipt", "receipt.pdf", "application/pdf", b"%PDF-1.4");
        let (status, body) = app.post_multipart("/api/send-transfer-receipt", form).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Failed to process transfer receipt");
        assert_eq!(app.stored_files(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(app.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn malformed_filter_is_a_json_400() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/payments?notified=maybe").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to deserialize query string"));
    }

    #[tokio::test]
    async fn disallowed_file_type_writes_nothing() {
        let app = TestApp::new().await;
        let form = MultipartForm::jane_doe().file("receipt", "receipt.gif", "image/gif", b"GIF89a");
        let (status, _) = app.post_multipart("/api/send-transfer-receipt", form).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.stored_files(), 0);
        assert!(app.store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_size_boundary() {
        let app = TestApp::new().await;

        let exact = vec![0u8; FIVE_MIB];
        let form = MultipartForm::jane_doe().file("receipt", "exact.png", "image/png", &exact);
        let (status, _) = app.post_multipart("/api/send-transfer-receipt", form).await;
        assert_eq!(status, StatusCode::OK);

        let over = vec![0u8; FIVE_MIB + 1];
        let form = MultipartForm::jane_doe().file("receipt", "over.png", "image/png", &over);
        let (status, body) = app.post_multipart("/api/send-transfer-receipt", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File size must be less than 5MB");

        assert_eq!(app.stored_files(), 1);
        assert_eq!(app.store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn receipt_can_be_mandatory() {
        let app = TestApp::with_transport(Arc::new(RecordingTransport::new()), true).await;
        let (status, body) = app
            .post_multipart("/api/send-transfer-receipt", MultipartForm::jane_doe())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Receipt file is required");
    }

    #[tokio::test]
    async fn listing_filters_and_orders() {
        let app = TestApp::with_transport(Arc::new(RecordingTransport::gated()), false).await;
        for reference in ["IMF-1", "IMF-2", "IMF-3"] {
            let form = MultipartForm::new()
                .text("name", "Jane Doe")
                .text("email", "jane@example.com")
                .text("amount", "100")
                .text("serviceType", "Membership Only")
                .text("reference", reference);
            app.post_multipart("/api/send-transfer-receipt", form).await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let (status, body) = app.get("/api/payments").await;
        assert_eq!(status, StatusCode::OK);
        let references: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["reference"].as_str().unwrap())
            .collect();
        assert_eq!(references, vec!["IMF-3", "IMF-2", "IMF-1"]);

        let (_, pending) = app.get("/api/payments?notified=false").await;
        assert_eq!(pending["count"], 3);
        let (_, notified) = app.get("/api/payments?notified=true").await;
        assert_eq!(notified["count"], 0);
    }

    #[tokio::test]
    async fn unknown_payment_is_404() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/payments/123").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Payment record not found");
    }
}
