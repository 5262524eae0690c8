//! Media attachment validation and offload.
//!
//! Clients attach media as `data:<mime>;base64,<payload>` strings. The
//! handler contract is format and count validation only; durable storage is
//! a collaborator behind [`MediaStore`] that returns a stable URL, which
//! replaces the inline payload before the message is persisted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MAX_MEDIA_PER_MESSAGE: usize = 5;

pub struct DataUrl<'a> {
    pub mime: &'a str,
    pub payload: Vec<u8>,
}

pub fn parse_data_url(raw: &str) -> AppResult<DataUrl<'_>> {
    let rest = raw
        .strip_prefix("data:")
        .ok_or_else(|| AppError::Validation("media entry is not a data URL".into()))?;
    let (mime, payload_b64) = rest
        .split_once(";base64,")
        .ok_or_else(|| AppError::Validation("media entry is not base64-encoded".into()))?;
    if mime.is_empty() || !mime.contains('/') {
        return Err(AppError::Validation(
            "media entry has a malformed mime type".into(),
        ));
    }
    if payload_b64.is_empty() {
        return Err(AppError::Validation("media entry has an empty payload".into()));
    }
    let payload = STANDARD
        .decode(payload_b64)
        .map_err(|_| AppError::Validation("media payload is not valid base64".into()))?;
    Ok(DataUrl { mime, payload })
}

/// Validate a message's media batch before any other work happens.
pub fn validate_media(entries: &[String]) -> AppResult<()> {
    if entries.len() > MAX_MEDIA_PER_MESSAGE {
        return Err(AppError::Validation(format!(
            "at most {MAX_MEDIA_PER_MESSAGE} media attachments are allowed"
        )));
    }
    for entry in entries {
        parse_data_url(entry)?;
    }
    Ok(())
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist one data URL and return the stable URL to embed in the message.
    async fn store(&self, data_url: &str) -> AppResult<String>;
}

/// Local object store: decoded payloads land under `root`, addressed as
/// `<base_url>/<random name>.<ext>`.
pub struct FilesystemMediaStore {
    root: PathBuf,
    base_url: String,
}

impl FilesystemMediaStore {
    pub fn new(root: impl AsRef<Path>, base_url: String) -> AppResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| AppError::Media(format!("create {}: {e}", root.display())))?;
        Ok(Self { root, base_url })
    }

    fn extension(mime: &str) -> &str {
        mime.split('/')
            .nth(1)
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin")
    }
}

#[async_trait]
impl MediaStore for FilesystemMediaStore {
    async fn store(&self, data_url: &str) -> AppResult<String> {
        let parsed = parse_data_url(data_url)?;
        let name = format!("{}.{}", Uuid::new_v4(), Self::extension(parsed.mime));
        let path = self.root.join(&name);
        tokio::fs::write(&path, &parsed.payload)
            .await
            .map_err(|e| AppError::Media(format!("write {}: {e}", path.display())))?;
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), name))
    }
}
