//! Payment persistence behind one interface, backed by MongoDB or, when the
//! database cannot be reached at startup, by a process-local collection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::AppConfig;
use crate::database::connection::connect_database;
use crate::models::payment::{NewPayment, PaymentRecord};

mod memory;
mod mongo;

pub use memory::MemoryPaymentStore;
pub use mongo::MongoPaymentStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDB,
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::MongoDB => "mongodb",
            StorageBackend::Memory => "memory",
        }
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new payment, assigning its id and creation time.
    async fn save(&self, payment: NewPayment) -> Result<PaymentRecord, StorageError>;

    /// All payments newest first, optionally restricted to one notification state.
    async fn list(&self, notified: Option<bool>) -> Result<Vec<PaymentRecord>, StorageError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<PaymentRecord>, StorageError>;

    /// Flips the notification latch. Returns `false` when it was already set
    /// or the record does not exist.
    async fn mark_notified(&self, id: &str, sent_at: DateTime<Utc>) -> Result<bool, StorageError>;

    fn backend(&self) -> StorageBackend;

    /// Whether the backing database currently answers.
    async fn ping(&self) -> bool;
}

/// Picks the storage backend for this process.
pub async fn connect_store(config: &AppConfig) -> Arc<dyn PaymentStore> {
    match connect_database(config).await {
        Ok(db) => {
            tracing::info!("✅ Using MongoDB payment storage");
            Arc::new(MongoPaymentStore::new(db))
        }
        Err(e) => {
            tracing::warn!("⚠️ MongoDB unavailable: {}", e);
            tracing::warn!("Using in-memory storage for payments (data will not persist)");
            Arc::new(MemoryPaymentStore::new())
        }
    }
}
