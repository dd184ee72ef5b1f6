use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};

use super::{PaymentStore, StorageBackend, StorageError};
use crate::models::payment::{NewPayment, PaymentDocument, PaymentRecord};

const PAYMENTS_COLLECTION: &str = "payments";

pub struct MongoPaymentStore {
    db: Database,
    payments: Collection<PaymentDocument>,
}

impl MongoPaymentStore {
    pub fn new(db: Database) -> Self {
        let payments = db.collection(PAYMENTS_COLLECTION);
        Self { db, payments }
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn save(&self, payment: NewPayment) -> Result<PaymentRecord, StorageError> {
        let mut document = PaymentDocument::from(&payment);
        let result = self.payments.insert_one(&document).await?;

        let id = result.inserted_id.as_object_id().ok_or_else(|| {
            StorageError::Unavailable("insert did not return an ObjectId".to_string())
        })?;
        document.id = Some(id);

        tracing::debug!("Inserted payment {} ({})", id.to_hex(), document.reference);
        Ok(PaymentRecord::from(document))
    }

    async fn list(&self, notified: Option<bool>) -> Result<Vec<PaymentRecord>, StorageError> {
        let filter = match notified {
            // Legacy documents may lack the flag entirely; treat them as pending.
            Some(true) => doc! { "notificationSent": true },
            Some(false) => doc! { "notificationSent": { "$ne": true } },
            None => Document::new(),
        };

        let cursor = self
            .payments
            .find(filter)
            .sort(doc! { "timestamp": -1, "_id": -1 })
            .await?;
        let documents: Vec<PaymentDocument> = cursor.try_collect().await?;

        Ok(documents.into_iter().map(PaymentRecord::from).collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PaymentRecord>, StorageError> {
        let object_id = match ObjectId::parse_str(id) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };

        let document = self.payments.find_one(doc! { "_id": object_id }).await?;
        Ok(document.map(PaymentRecord::from))
    }

    async fn mark_notified(&self, id: &str, sent_at: DateTime<Utc>) -> Result<bool, StorageError> {
        let object_id = match ObjectId::parse_str(id) {
            Ok(oid) => oid,
            Err(_) => return Ok(false),
        };

        let filter = doc! {
            "_id": object_id,
            "notificationSent": { "$ne": true },
        };
        let update = doc! {
            "$set": {
                "notificationSent": true,
                "notificationTimestamp": bson::DateTime::from_chrono(sent_at),
            }
        };

        let result = self.payments.update_one(filter, update).await?;
        Ok(result.modified_count > 0)
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::MongoDB
    }

    async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }
}
