use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A stored payment submission. Only the notification pair ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub amount: f64,
    pub service_type: String,
    pub reference: String,
    pub receipt_path: String,
    pub receipt_file_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub notification_sent: bool,
    pub notification_timestamp: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn has_receipt(&self) -> bool {
        !self.receipt_path.is_empty()
    }
}

/// Validated fields of a submission, before an id is assigned.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub name: String,
    pub email: String,
    pub amount: f64,
    pub service_type: String,
    pub reference: String,
    pub receipt_path: String,
    pub receipt_file_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewPayment {
    pub fn into_record(self, id: String) -> PaymentRecord {
        PaymentRecord {
            id,
            name: self.name,
            email: self.email,
            amount: self.amount,
            service_type: self.service_type,
            reference: self.reference,
            receipt_path: self.receipt_path,
            receipt_file_name: self.receipt_file_name,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            notification_sent: false,
            notification_timestamp: None,
        }
    }
}

/// Text fields of the `send-transfer-receipt` multipart form.
#[derive(Debug, Default, Validate)]
pub struct SubmissionForm {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub amount: String,
    #[validate(length(min = 1))]
    pub service_type: String,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub notified: Option<bool>,
}

/// MongoDB shape of a payment; kept flat like the API shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub amount: f64,
    pub service_type: String,
    pub reference: String,
    #[serde(default)]
    pub receipt_path: String,
    #[serde(default)]
    pub receipt_file_name: Option<String>,
    pub timestamp: bson::DateTime,
    #[serde(default)]
    pub notification_sent: bool,
    #[serde(default)]
    pub notification_timestamp: Option<bson::DateTime>,
}

impl From<&NewPayment> for PaymentDocument {
    fn from(payment: &NewPayment) -> Self {
        PaymentDocument {
            id: None,
            name: payment.name.clone(),
            email: payment.email.clone(),
            amount: payment.amount,
            service_type: payment.service_type.clone(),
            reference: payment.reference.clone(),
            receipt_path: payment.receipt_path.clone(),
            receipt_file_name: payment.receipt_file_name.clone(),
            timestamp: bson::DateTime::from_chrono(payment.timestamp.unwrap_or_else(Utc::now)),
            notification_sent: false,
            notification_timestamp: None,
        }
    }
}

impl From<PaymentDocument> for PaymentRecord {
    fn from(doc: PaymentDocument) -> Self {
        PaymentRecord {
            id: doc.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            name: doc.name,
            email: doc.email,
            amount: doc.amount,
            service_type: doc.service_type,
            reference: doc.reference,
            receipt_path: doc.receipt_path,
            receipt_file_name: doc.receipt_file_name,
            timestamp: doc.timestamp.to_chrono(),
            notification_sent: doc.notification_sent,
            notification_timestamp: doc.notification_timestamp.map(|t| t.to_chrono()),
        }
    }
}
