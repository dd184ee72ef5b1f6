use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{MailTransport, NotifyError, OutgoingMail};
use crate::config::EmailConfig;

const PROVIDER: &str = "smtp";

/// Direct SMTP relay. Port 465 uses implicit TLS, anything else STARTTLS.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| NotifyError::provider(PROVIDER, e))?;

        let mailer = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ))
            .timeout(Some(config.socket_timeout))
            .build();

        Ok(Self { mailer })
    }
}

pub(crate) fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse::<Mailbox>()
        .map_err(|_| NotifyError::Address(address.to_string()))
}

fn build_message(mail: &OutgoingMail) -> Result<Message, NotifyError> {
    let builder = Message::builder()
        .from(parse_mailbox(&mail.from)?)
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.clone());

    let body = match (&mail.html, &mail.text) {
        (Some(html), _) => SinglePart::html(html.clone()),
        (None, Some(text)) => SinglePart::plain(text.clone()),
        (None, None) => SinglePart::plain(String::new()),
    };

    let message = if mail.attachments.is_empty() {
        builder.singlepart(body)
    } else {
        let mut parts = MultiPart::mixed().singlepart(body);
        for attachment in &mail.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| NotifyError::Message(e.to_string()))?;
            parts = parts.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }
        builder.multipart(parts)
    };

    message.map_err(|e| NotifyError::Message(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn verify(&self) -> Result<(), NotifyError> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(NotifyError::provider(
                PROVIDER,
                "server did not accept the connection test",
            )),
            Err(e) => Err(NotifyError::provider(PROVIDER, e)),
        }
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        let message = build_message(mail)?;
        self.mailer
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError::provider(PROVIDER, e))
    }
}
