//! Payer and admin email notifications over a switchable mail transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{EmailConfig, MailTransportKind};
use crate::models::payment::PaymentRecord;

mod sendgrid;
mod smtp;
pub(crate) mod templates;

pub use sendgrid::SendGridMailTransport;
pub use smtp::SmtpMailTransport;

#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("Email notifications are disabled")]
    Disabled,

    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} did not answer in time")]
    Timeout { provider: &'static str },

    #[error("Invalid email address: {0}")]
    Address(String),

    #[error("Failed to build email: {0}")]
    Message(String),

    #[error("Failed to read attachment {path}: {message}")]
    Attachment { path: String, message: String },
}

impl NotifyError {
    pub fn provider(provider: &'static str, message: impl ToString) -> Self {
        NotifyError::Provider {
            provider,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub attachments: Vec<MailAttachment>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks connectivity and credentials without sending anything.
    async fn verify(&self) -> Result<(), NotifyError>;

    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub from: String,
    pub admin_email: String,
    pub verify_retries: u32,
    pub verify_backoff: Duration,
    pub connection_timeout: Duration,
    pub send_timeout: Duration,
    pub currency_symbol: String,
}

impl From<&EmailConfig> for NotifierSettings {
    fn from(config: &EmailConfig) -> Self {
        NotifierSettings {
            from: config.from.clone(),
            admin_email: config.admin_email.clone(),
            verify_retries: config.verify_retries,
            verify_backoff: config.verify_backoff,
            connection_timeout: config.connection_timeout,
            send_timeout: config.send_timeout,
            currency_symbol: config.currency_symbol.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierStatus {
    Ready,
    Disabled(String),
}

pub struct Notifier {
    transport: Option<Arc<dyn MailTransport>>,
    settings: NotifierSettings,
    status: NotifierStatus,
}

impl Notifier {
    pub async fn from_config(config: &EmailConfig) -> Self {
        let settings = NotifierSettings::from(config);
        let transport: Result<Option<Arc<dyn MailTransport>>, NotifyError> = match config.transport
        {
            MailTransportKind::Smtp => {
                SmtpMailTransport::new(config).map(|t| Some(Arc::new(t) as Arc<dyn MailTransport>))
            }
            MailTransportKind::SendGrid => SendGridMailTransport::new(config)
                .map(|t| Some(Arc::new(t) as Arc<dyn MailTransport>)),
            MailTransportKind::None => Ok(None),
        };

        match transport {
            Ok(transport) => Self::initialize(transport, settings).await,
            Err(e) => {
                tracing::error!("❌ Failed to build email transport: {}", e);
                Self::disabled(settings, e.to_string())
            }
        }
    }

    /// Verifies the transport with a bounded number of attempts. The notifier
    /// is disabled when none succeeds.
    pub async fn initialize(
        transport: Option<Arc<dyn MailTransport>>,
        settings: NotifierSettings,
    ) -> Self {
        let transport = match transport {
            Some(transport) => transport,
            None => {
                tracing::warn!("Email configuration incomplete - email notifications disabled");
                return Self::disabled(settings, "no mail transport configured");
            }
        };

        let attempts = settings.verify_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            tracing::info!(
                "🔧 Email verification attempt {}/{} ({})",
                attempt,
                attempts,
                transport.name()
            );

            let outcome = match tokio::time::timeout(settings.connection_timeout, transport.verify())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout {
                    provider: transport.name(),
                }),
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(
                        "✅ Email transport {} verified (attempt {})",
                        transport.name(),
                        attempt
                    );
                    return Self {
                        transport: Some(transport),
                        settings,
                        status: NotifierStatus::Ready,
                    };
                }
                Err(e) => {
                    tracing::warn!("Email verification attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(settings.verify_backoff).await;
                    }
                }
            }
        }

        tracing::error!("❌ All email verification attempts failed - notifications disabled");
        Self {
            transport: Some(transport),
            settings,
            status: NotifierStatus::Disabled(last_error),
        }
    }

    pub fn disabled(settings: NotifierSettings, reason: impl Into<String>) -> Self {
        Self {
            transport: None,
            settings,
            status: NotifierStatus::Disabled(reason.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == NotifierStatus::Ready
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.as_ref().map_or("none", |t| t.name())
    }

    fn ready_transport(&self) -> Result<&Arc<dyn MailTransport>, NotifyError> {
        match (&self.status, &self.transport) {
            (NotifierStatus::Ready, Some(transport)) => Ok(transport),
            _ => Err(NotifyError::Disabled),
        }
    }

    /// Sends the payer confirmation, then the admin alert. Both carry the receipt.
    pub async fn send_payment_received(&self, record: &PaymentRecord) -> Result<(), NotifyError> {
        let transport = self.ready_transport()?;

        let attachments = match load_receipt(record).await? {
            Some(attachment) => vec![attachment],
            None => Vec::new(),
        };

        let (subject, html) = templates::payer_confirmation(record, &self.settings.currency_symbol);
        let payer_mail = OutgoingMail {
            from: self.settings.from.clone(),
            to: record.email.clone(),
            subject,
            html: Some(html),
            text: None,
            attachments: attachments.clone(),
        };

        let (subject, html) = templates::admin_alert(record, &self.settings.currency_symbol);
        let admin_mail = OutgoingMail {
            from: self.settings.from.clone(),
            to: self.settings.admin_email.clone(),
            subject,
            html: Some(html),
            text: None,
            attachments,
        };

        self.deliver(transport, &payer_mail).await?;
        self.deliver(transport, &admin_mail).await?;

        tracing::info!(
            "📧 Payment confirmation emails sent for reference: {}",
            record.reference
        );
        Ok(())
    }

    pub async fn send_test(&self, to: &str, subject: &str, text: &str) -> Result<(), NotifyError> {
        let transport = self.ready_transport()?;
        let mail = OutgoingMail {
            from: self.settings.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: None,
            text: Some(text.to_string()),
            attachments: Vec::new(),
        };
        self.deliver(transport, &mail).await
    }

    async fn deliver(
        &self,
        transport: &Arc<dyn MailTransport>,
        mail: &OutgoingMail,
    ) -> Result<(), NotifyError> {
        match tokio::time::timeout(self.settings.send_timeout, transport.send(mail)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout {
                provider: transport.name(),
            }),
        }
    }
}

async fn load_receipt(record: &PaymentRecord) -> Result<Option<MailAttachment>, NotifyError> {
    if !record.has_receipt() {
        return Ok(None);
    }

    let path = Path::new(&record.receipt_path);
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| NotifyError::Attachment {
            path: record.receipt_path.clone(),
            message: e.to_string(),
        })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("pdf")
        .to_lowercase();

    let content_type = match extension.as_str() {
        "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "pdf" => mime::APPLICATION_PDF.to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    };

    let filename = record
        .receipt_file_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("payment_receipt.{}", extension));

    Ok(Some(MailAttachment {
        filename,
        content_type,
        data,
    }))
}
