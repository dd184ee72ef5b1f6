use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;

use crate::errors::{AppError, Result};
use crate::models::notification::{NotifyOutcome, SweepSummary};
use crate::services::notifier::Notifier;
use crate::services::storage::PaymentStore;

/// Per-record notification path shared by the background queue, the
/// single-record endpoint and the sweep.
pub struct NotificationService {
    store: Arc<dyn PaymentStore>,
    notifier: Arc<Notifier>,
    in_flight: Mutex<HashSet<String>>,
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let mut ids = set.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(id.to_string()) {
            return None;
        }
        Some(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl NotificationService {
    pub fn new(store: Arc<dyn PaymentStore>, notifier: Arc<Notifier>) -> Self {
        Self {
            store,
            notifier,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Emails payer and admin unless the record is already notified. The
    /// latch is set only after both messages went out.
    pub async fn notify_record(&self, id: &str) -> Result<NotifyOutcome> {
        let record = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        if record.notification_sent {
            return Ok(NotifyOutcome::AlreadySent(record));
        }

        let _guard = match InFlightGuard::acquire(&self.in_flight, id) {
            Some(guard) => guard,
            None => return Ok(NotifyOutcome::InProgress),
        };

        // another attempt may have finished between the read and the guard
        let mut record = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        if record.notification_sent {
            return Ok(NotifyOutcome::AlreadySent(record));
        }

        self.notifier.send_payment_received(&record).await?;

        let sent_at = Utc::now();
        if !self.store.mark_notified(id, sent_at).await? {
            tracing::warn!("Notification latch for payment {} was already set", id);
        }
        record.notification_sent = true;
        record.notification_timestamp = Some(sent_at);

        Ok(NotifyOutcome::Sent(record))
    }

    /// Walks every stored payment oldest first; failures are counted, never fatal.
    pub async fn notify_all_pending(&self) -> Result<SweepSummary> {
        let records = self.store.list(None).await?;
        let mut summary = SweepSummary {
            total: records.len(),
            ..SweepSummary::default()
        };

        for record in records.iter().rev() {
            if record.notification_sent {
                summary.already_sent += 1;
                continue;
            }
            match self.notify_record(&record.id).await {
                Ok(NotifyOutcome::Sent(_)) => summary.sent += 1,
                Ok(NotifyOutcome::AlreadySent(_)) => summary.already_sent += 1,
                Ok(NotifyOutcome::InProgress) => summary.in_progress += 1,
                Err(e) => {
                    tracing::warn!("Failed to notify payment {}: {}", record.id, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "📬 Notification sweep: {} sent, {} already sent, {} failed, {} in progress",
            summary.sent,
            summary.already_sent,
            summary.failed,
            summary.in_progress
        );
        Ok(summary)
    }
}

/// Hands persisted payment ids to a background worker so the submitting
/// client never waits on email delivery.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl NotificationQueue {
    pub fn spawn(service: Arc<NotificationService>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                match service.notify_record(&id).await {
                    Ok(NotifyOutcome::Sent(record)) => {
                        tracing::info!("✅ Notified payment {} ({})", id, record.reference)
                    }
                    Ok(NotifyOutcome::AlreadySent(_)) | Ok(NotifyOutcome::InProgress) => {
                        tracing::debug!("Payment {} needs no notification", id)
                    }
                    Err(e) => tracing::warn!(
                        "⚠️ Failed to send email notifications for payment {}: {}",
                        id,
                        e
                    ),
                }
            }
            tracing::debug!("Notification queue closed");
        });

        Self { tx }
    }

    pub fn enqueue(&self, id: String) {
        if let Err(e) = self.tx.send(id) {
            tracing::warn!("Notification worker stopped; payment {} left pending", e.0);
        }
    }
}
