use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};

use super::smtp::parse_mailbox;
use super::{MailTransport, NotifyError, OutgoingMail};
use crate::config::EmailConfig;

const PROVIDER: &str = "sendgrid";
const SENDGRID_API: &str = "https://api.sendgrid.com/v3";

/// Transactional email through the SendGrid v3 HTTP API.
#[derive(Clone)]
pub struct SendGridMailTransport {
    api_key: String,
    client: Client,
}

impl SendGridMailTransport {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        if config.sendgrid_api_key.is_empty() {
            return Err(NotifyError::provider(PROVIDER, "SENDGRID_API_KEY not set"));
        }

        let client = Client::builder()
            .connect_timeout(config.connection_timeout)
            .timeout(config.socket_timeout)
            .build()
            .map_err(|e| NotifyError::provider(PROVIDER, e))?;

        Ok(Self {
            api_key: config.sendgrid_api_key.clone(),
            client,
        })
    }

    fn map_request_error(err: reqwest::Error) -> NotifyError {
        if err.is_timeout() {
            NotifyError::Timeout { provider: PROVIDER }
        } else {
            NotifyError::provider(PROVIDER, format!("HTTP request failed: {}", err))
        }
    }
}

fn address_json(address: &str) -> Result<Value, NotifyError> {
    let mailbox = parse_mailbox(address)?;
    Ok(match mailbox.name {
        Some(name) => json!({ "email": mailbox.email.to_string(), "name": name }),
        None => json!({ "email": mailbox.email.to_string() }),
    })
}

pub(crate) fn payload(mail: &OutgoingMail) -> Result<Value, NotifyError> {
    let mut content = Vec::new();
    if let Some(text) = &mail.text {
        content.push(json!({ "type": "text/plain", "value": text }));
    }
    if let Some(html) = &mail.html {
        content.push(json!({ "type": "text/html", "value": html }));
    }
    if content.is_empty() {
        content.push(json!({ "type": "text/plain", "value": " " }));
    }

    let mut body = json!({
        "personalizations": [{ "to": [address_json(&mail.to)?] }],
        "from": address_json(&mail.from)?,
        "subject": mail.subject,
        "content": content,
    });

    if !mail.attachments.is_empty() {
        let attachments: Vec<Value> = mail
            .attachments
            .iter()
            .map(|a| {
                json!({
                    "content": STANDARD.encode(&a.data),
                    "filename": a.filename,
                    "type": a.content_type,
                    "disposition": "attachment",
                })
            })
            .collect();
        body["attachments"] = Value::Array(attachments);
    }

    Ok(body)
}

#[async_trait]
impl MailTransport for SendGridMailTransport {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn verify(&self) -> Result<(), NotifyError> {
        let response = self
            .client
            .get(format!("{}/scopes", SENDGRID_API))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::provider(
                PROVIDER,
                format!("key verification failed with status: {}", response.status()),
            ))
        }
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        let body = payload(mail)?;

        let response = self
            .client
            .post(format!("{}/mail/send", SENDGRID_API))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(NotifyError::provider(
                PROVIDER,
                format!("sending failed with status {}: {}", status, error_text),
            ))
        }
    }
}
