use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::models::payment::{NewPayment, PaymentRecord};
use crate::services::file_intake::FileIntake;
use crate::services::notifier::{MailTransport, Notifier, NotifierSettings, NotifyError, OutgoingMail};
use crate::services::storage::{MemoryPaymentStore, PaymentStore, StorageBackend, StorageError};
use crate::state::AppState;

/// Mail transport double that records what it was asked to send.
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMail>>,
    verify_calls: AtomicUsize,
    verify_failures_left: AtomicUsize,
    failing_recipients: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
    send_started: Notify,
}

impl RecordingTransport {
    fn build(verify_failures: usize, gate: Option<Semaphore>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            verify_calls: AtomicUsize::new(0),
            verify_failures_left: AtomicUsize::new(verify_failures),
            failing_recipients: Mutex::new(Vec::new()),
            gate,
            send_started: Notify::new(),
        }
    }

    pub fn new() -> Self {
        Self::build(0, None)
    }

    pub fn failing_verify() -> Self {
        Self::build(usize::MAX, None)
    }

    pub fn failing_first_verifications(count: usize) -> Self {
        Self::build(count, None)
    }

    /// Every send blocks until `release` hands out a permit.
    pub fn gated() -> Self {
        Self::build(0, Some(Semaphore::new(0)))
    }

    pub fn fail_sends_to(&self, address: &str) {
        self.failing_recipients.lock().unwrap().push(address.to_string());
    }

    pub fn release(&self, sends: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(sends);
        }
    }

    pub async fn wait_for_pending_send(&self) {
        self.send_started.notified().await;
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn verify(&self) -> Result<(), NotifyError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let left = self.verify_failures_left.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        if left != usize::MAX {
            self.verify_failures_left.fetch_sub(1, Ordering::SeqCst);
        }
        Err(NotifyError::provider("recording", "verification refused"))
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        self.send_started.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.failing_recipients.lock().unwrap().contains(&mail.to) {
            return Err(NotifyError::provider("recording", format!("rejected {}", mail.to)));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Store whose database is permanently unreachable.
pub struct UnavailableStore;

#[async_trait]
impl PaymentStore for UnavailableStore {
    async fn save(&self, _payment: NewPayment) -> Result<PaymentRecord, StorageError> {
        Err(StorageError::Unavailable("connection reset".into()))
    }

    async fn list(&self, _notified: Option<bool>) -> Result<Vec<PaymentRecord>, StorageError> {
        Err(StorageError::Unavailable("connection reset".into()))
    }

    async fn get_by_id(&self, _id: &str) -> Result<Option<PaymentRecord>, StorageError> {
        Err(StorageError::Unavailable("connection reset".into()))
    }

    async fn mark_notified(&self, _id: &str, _sent_at: DateTime<Utc>) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable("connection reset".into()))
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::MongoDB
    }

    async fn ping(&self) -> bool {
        false
    }
}

pub fn test_settings() -> NotifierSettings {
    NotifierSettings {
        from: "IMF Africa Pay <no-reply@imfafrica.org>".to_string(),
        admin_email: "admin@imfafrica.org".to_string(),
        verify_retries: 3,
        verify_backoff: Duration::ZERO,
        connection_timeout: Duration::from_secs(1),
        send_timeout: Duration::from_secs(5),
        currency_symbol: "₦".to_string(),
    }
}

pub async fn ready_notifier(transport: Arc<RecordingTransport>) -> Notifier {
    let notifier = Notifier::initialize(Some(transport), test_settings()).await;
    assert!(notifier.is_ready());
    notifier
}

pub fn new_payment(email: &str) -> NewPayment {
    NewPayment {
        name: "Jane Doe".to_string(),
        email: email.to_string(),
        amount: 100.0,
        service_type: "Membership Only".to_string(),
        reference: "IMF-1700000000000".to_string(),
        receipt_path: String::new(),
        receipt_file_name: None,
        timestamp: None,
    }
}

pub fn sample_record(id: &str) -> PaymentRecord {
    let mut payment = new_payment("jane@example.com");
    payment.timestamp = Utc.timestamp_millis_opt(1_700_000_000_000).single();
    payment.into_record(id.to_string())
}

/// A full router over in-memory storage and a temporary upload directory.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn PaymentStore>,
    pub transport: Arc<RecordingTransport>,
    pub upload_dir: std::path::PathBuf,
    _tmp: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_transport(Arc::new(RecordingTransport::new()), false).await
    }

    pub async fn with_transport(transport: Arc<RecordingTransport>, receipt_required: bool) -> Self {
        Self::build(Arc::new(MemoryPaymentStore::new()), transport, receipt_required).await
    }

    pub async fn with_store(store: Arc<dyn PaymentStore>, transport: Arc<RecordingTransport>) -> Self {
        Self::build(store, transport, false).await
    }

    async fn build(
        store: Arc<dyn PaymentStore>,
        transport: Arc<RecordingTransport>,
        receipt_required: bool,
    ) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.upload_dir = tmp.path().join("uploads").to_string_lossy().to_string();
        config.receipt_required = receipt_required;

        let intake = FileIntake::new(
            &config.upload_dir,
            config.max_upload_bytes,
            config.allowed_receipt_types.clone(),
            config.receipt_required,
        );
        let notifier = Notifier::initialize(Some(transport.clone()), test_settings()).await;
        let state = AppState::new(store.clone(), intake, notifier, config.port);

        TestApp {
            router: crate::build_router(state, &config),
            store,
            transport,
            upload_dir: tmp.path().join("uploads"),
            _tmp: tmp,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_multipart(&self, uri: &str, form: MultipartForm) -> (StatusCode, Value) {
        let (content_type, body) = form.build();
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(&self.upload_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

const BOUNDARY: &str = "imf-test-boundary-7MA4YWxkTrZu0gW";

#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// The submission from the reference scenario, without a receipt.
    pub fn jane_doe() -> Self {
        Self::new()
            .text("name", "Jane Doe")
            .text("email", "jane@example.com")
            .text("amount", "100")
            .text("serviceType", "Membership Only")
            .text("reference", "IMF-1700000000000")
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn build(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        (format!("multipart/form-data; boundary={}", BOUNDARY), self.body)
    }
}
