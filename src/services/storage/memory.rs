use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PaymentStore, StorageBackend, StorageError};
use crate::models::payment::{NewPayment, PaymentRecord};

/// Non-durable fallback storage. Everything is lost when the process exits.
pub struct MemoryPaymentStore {
    payments: RwLock<Vec<PaymentRecord>>,
    last_id: AtomicI64,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self {
            payments: RwLock::new(Vec::new()),
            last_id: AtomicI64::new(0),
        }
    }

    /// Millisecond timestamp, bumped past the previous id when two saves share a millisecond.
    fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last_id.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last_id.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate.to_string(),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Ids are issued in increasing numeric order, so they break timestamp ties.
fn id_order(id: &str) -> i64 {
    id.parse().unwrap_or(i64::MIN)
}

impl Default for MemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn save(&self, payment: NewPayment) -> Result<PaymentRecord, StorageError> {
        let record = payment.into_record(self.next_id());
        self.payments.write().await.push(record.clone());
        Ok(record)
    }

    async fn list(&self, notified: Option<bool>) -> Result<Vec<PaymentRecord>, StorageError> {
        let payments = self.payments.read().await;
        let mut records: Vec<PaymentRecord> = payments
            .iter()
            .filter(|p| notified.map_or(true, |flag| p.notification_sent == flag))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| id_order(&b.id).cmp(&id_order(&a.id)))
        });
        Ok(records)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PaymentRecord>, StorageError> {
        let payments = self.payments.read().await;
        Ok(payments.iter().find(|p| p.id == id).cloned())
    }

    async fn mark_notified(&self, id: &str, sent_at: DateTime<Utc>) -> Result<bool, StorageError> {
        let mut payments = self.payments.write().await;
        match payments.iter_mut().find(|p| p.id == id) {
            Some(record) if !record.notification_sent => {
                record.notification_sent = true;
                record.notification_timestamp = Some(sent_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    async fn ping(&self) -> bool {
        false
    }
}
