use serde::{Deserialize, Serialize};

use super::payment::PaymentRecord;

/// Result of one per-record notification attempt that did not fail.
#[derive(Debug, Clone)]
pub enum NotifyOutcome {
    Sent(PaymentRecord),
    AlreadySent(PaymentRecord),
    InProgress,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub total: usize,
    pub sent: usize,
    pub already_sent: usize,
    pub failed: usize,
    pub in_progress: usize,
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
}
