// config.rs
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;

pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017/imf-africa-pay";
pub const DEFAULT_DATABASE: &str = "imf-africa-pay";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_RECEIPT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTransportKind {
    Smtp,
    SendGrid,
    None,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub transport: MailTransportKind,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub sendgrid_api_key: String,
    pub from: String,
    pub admin_email: String,
    pub verify_retries: u32,
    pub verify_backoff: Duration,
    pub connection_timeout: Duration,
    pub socket_timeout: Duration,
    pub send_timeout: Duration,
    pub currency_symbol: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub mongodb_database: Option<String>,
    pub db_connect_timeout: Duration,
    pub upload_dir: String,
    pub max_upload_bytes: u64,
    pub allowed_receipt_types: Vec<String>,
    pub receipt_required: bool,
    pub cors_allowed_origins: Vec<String>,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let smtp_user = get("EMAIL_USER").unwrap_or_default();
        let smtp_pass = get("EMAIL_PASS").unwrap_or_default();
        let sendgrid_api_key = get("SENDGRID_API_KEY").unwrap_or_default();

        let transport = match get("EMAIL_TRANSPORT").map(|v| v.to_lowercase()) {
            Some(kind) => match kind.as_str() {
                "smtp" => MailTransportKind::Smtp,
                "sendgrid" => MailTransportKind::SendGrid,
                "none" | "disabled" => MailTransportKind::None,
                other => {
                    return Err(AppError::configuration(format!(
                        "EMAIL_TRANSPORT must be smtp, sendgrid or none (got {})",
                        other
                    )))
                }
            },
            None if !smtp_user.is_empty() && !smtp_pass.is_empty() => MailTransportKind::Smtp,
            None if !sendgrid_api_key.is_empty() => MailTransportKind::SendGrid,
            None => MailTransportKind::None,
        };

        let email = EmailConfig {
            transport,
            smtp_host: get("EMAIL_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port: parse_or(&get, "EMAIL_PORT", 587)?,
            smtp_user,
            smtp_pass,
            sendgrid_api_key,
            from: get("EMAIL_FROM")
                .unwrap_or_else(|| "IMF Africa Pay <no-reply@imfafrica.org>".to_string()),
            admin_email: get("IMF_EMAIL").unwrap_or_else(|| "admin@imfafrica.org".to_string()),
            verify_retries: parse_or(&get, "EMAIL_VERIFY_RETRIES", 3)?,
            verify_backoff: millis_or(&get, "EMAIL_VERIFY_BACKOFF_MS", 3_000)?,
            connection_timeout: millis_or(&get, "EMAIL_CONNECTION_TIMEOUT_MS", 10_000)?,
            socket_timeout: millis_or(&get, "EMAIL_SOCKET_TIMEOUT_MS", 30_000)?,
            send_timeout: millis_or(&get, "EMAIL_SEND_TIMEOUT_MS", 60_000)?,
            currency_symbol: get("CURRENCY_SYMBOL").unwrap_or_else(|| "₦".to_string()),
        };

        let allowed_receipt_types = match get("ALLOWED_RECEIPT_TYPES") {
            Some(list) => split_list(&list),
            None => DEFAULT_RECEIPT_TYPES.iter().map(|t| t.to_string()).collect(),
        };

        Ok(AppConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 3000)?,
            mongodb_uri: get("MONGODB_URI").unwrap_or_else(|| DEFAULT_MONGODB_URI.to_string()),
            mongodb_database: get("MONGODB_DATABASE"),
            db_connect_timeout: millis_or(&get, "DB_CONNECT_TIMEOUT_MS", 5_000)?,
            upload_dir: get("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            allowed_receipt_types,
            receipt_required: parse_or(&get, "RECEIPT_REQUIRED", false)?,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|list| split_list(&list))
                .unwrap_or_default(),
            email,
        })
    }

    pub fn log_summary(&self) {
        tracing::info!("==========================================");
        tracing::info!("Listening on {}:{}", self.host, self.port);
        tracing::info!("Upload dir: {} (max {} bytes)", self.upload_dir, self.max_upload_bytes);
        tracing::info!("Receipt types: {:?}", self.allowed_receipt_types);
        tracing::info!("Email transport: {:?}", self.email.transport);
        tracing::info!("- Host: {}:{}", self.email.smtp_host, self.email.smtp_port);
        tracing::info!(
            "- User: {}",
            if self.email.smtp_user.is_empty() { "NOT SET" } else { "SET" }
        );
        tracing::info!(
            "- SendGrid key: {}",
            if self.email.sendgrid_api_key.is_empty() { "NOT SET" } else { "SET" }
        );
        tracing::info!(
            "- Timeouts: connection={:?} socket={:?} send={:?}",
            self.email.connection_timeout,
            self.email.socket_timeout,
            self.email.send_timeout
        );
        tracing::info!("==========================================");
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::configuration(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, key: &str, default: u64) -> Result<Duration, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default).map(Duration::from_millis)
}
