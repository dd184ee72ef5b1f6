use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

const STORED_PREFIX: &str = "receipt";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Only {allowed} files are allowed (got {got})")]
    UnsupportedMediaType { allowed: String, got: String },

    #[error("File size must be less than {}", describe_size(.limit))]
    PayloadTooLarge { limit: u64 },

    #[error("Receipt file is required")]
    MissingReceipt,

    #[error("Failed to store receipt: {0}")]
    Io(#[from] std::io::Error),
}

/// A receipt written to the upload directory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
    pub stored_name: String,
    pub path: PathBuf,
}

impl UploadedFile {
    /// Relative path stored on the payment record and used for attachments.
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

#[derive(Debug, Clone)]
pub struct FileIntake {
    upload_dir: PathBuf,
    max_bytes: u64,
    allowed_types: Vec<String>,
    allowed_label: String,
    required: bool,
}

impl FileIntake {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        max_bytes: u64,
        allowed_types: Vec<String>,
        required: bool,
    ) -> Self {
        let allowed_types: Vec<String> =
            allowed_types.into_iter().map(|t| t.to_lowercase()).collect();
        Self {
            upload_dir: upload_dir.into(),
            max_bytes,
            allowed_label: describe_types(&allowed_types),
            allowed_types,
            required,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn receipt_required(&self) -> bool {
        self.required
    }

    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        fs::create_dir_all(&self.upload_dir).await?;
        Ok(())
    }

    /// Rejects a declared type or size before any byte reaches the disk.
    pub fn check(&self, content_type: &str, size: u64) -> Result<(), UploadError> {
        let essence = content_type
            .parse::<mime::Mime>()
            .map(|m| m.essence_str().to_lowercase())
            .map_err(|_| self.unsupported(content_type))?;

        if !self.allowed_types.iter().any(|t| *t == essence) {
            return Err(self.unsupported(&essence));
        }
        self.check_size(size)
    }

    fn unsupported(&self, got: &str) -> UploadError {
        UploadError::UnsupportedMediaType {
            allowed: self.allowed_label.clone(),
            got: got.to_string(),
        }
    }

    pub fn check_size(&self, size: u64) -> Result<(), UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::PayloadTooLarge { limit: self.max_bytes });
        }
        Ok(())
    }

    pub async fn accept_upload(
        &self,
        original_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile, UploadError> {
        let size = data.len() as u64;
        self.check(content_type, size)?;
        self.ensure_dir().await?;

        let stored_name = generate_file_name(original_name, content_type);
        let path = self.upload_dir.join(&stored_name);

        // create_new: generated names are never reused
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        write_or_remove(&path, file, &data).await?;

        tracing::info!("📎 Stored receipt {} ({}, {} bytes)", path.display(), content_type, size);

        Ok(UploadedFile {
            original_name: sanitize_filename::sanitize(original_name),
            content_type: content_type.to_string(),
            size,
            stored_name,
            path,
        })
    }

    /// Best-effort removal of a receipt whose payment could not be saved.
    pub async fn discard(&self, file: &UploadedFile) {
        if let Err(e) = fs::remove_file(&file.path).await {
            tracing::warn!("Failed to remove orphaned receipt {}: {}", file.path.display(), e);
        }
    }
}

/// A receipt that could not be written completely is removed so it is never served.
async fn write_or_remove<W>(path: &Path, mut writer: W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written: std::io::Result<()> = async {
        writer.write_all(data).await?;
        writer.flush().await
    }
    .await;

    if written.is_err() {
        drop(writer);
        if let Err(e) = fs::remove_file(path).await {
            tracing::warn!("Failed to remove partial receipt {}: {}", path.display(), e);
        }
    }
    written
}

/// "JPG, PNG, or PDF" for the default list.
fn describe_types(types: &[String]) -> String {
    let labels: Vec<String> = types
        .iter()
        .map(|t| match t.as_str() {
            "image/jpeg" => "JPG".to_string(),
            other => other.rsplit('/').next().unwrap_or(other).to_uppercase(),
        })
        .collect();

    match labels.as_slice() {
        [] => "no".to_string(),
        [only] => only.clone(),
        [first, second] => format!("{} or {}", first, second),
        [rest @ .., last] => format!("{}, or {}", rest.join(", "), last),
    }
}

fn describe_size(bytes: &u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if *bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if *bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

fn generate_file_name(original_name: &str, content_type: &str) -> String {
    let random = Uuid::new_v4().as_u128() % 1_000_000_000;
    format!(
        "{}-{}-{:09}.{}",
        STORED_PREFIX,
        Utc::now().timestamp_millis(),
        random,
        extension_for(original_name, content_type)
    )
}

fn extension_for(original_name: &str, content_type: &str) -> String {
    let sanitized = sanitize_filename::sanitize(original_name);
    let from_name = Path::new(&sanitized)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name.unwrap_or_else(|| {
        let essence = content_type
            .parse::<mime::Mime>()
            .map(|m| m.essence_str().to_lowercase())
            .unwrap_or_default();
        if essence == mime::IMAGE_JPEG.essence_str() {
            "jpg".to_string()
        } else if essence == mime::IMAGE_PNG.essence_str() {
            "png".to_string()
        } else if essence == mime::APPLICATION_PDF.essence_str() {
            "pdf".to_string()
        } else {
            "bin".to_string()
        }
    })
}
