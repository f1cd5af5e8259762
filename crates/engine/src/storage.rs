//! Object storage for attachments.
//!
//! Attachments arrive as base64 payloads. They are decoded and checked with
//! [`inspect_payload`] before any wallet call so that a bad file never turns
//! into a partial commit; the engine then hands them to an [`ObjectStore`].

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Lowercase file extensions, e.g. `png`.
    pub allowed_formats: Vec<String>,
    pub max_size_bytes: u64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            allowed_formats: ["jpg", "jpeg", "png", "webp", "pdf"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            max_size_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    pub prefix: String,
    pub base64_payload: String,
    pub bucket: String,
    pub validation: ValidationRules,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub url: String,
    pub size_bytes: i64,
    pub extension: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Invalid(reason) => EngineError::InvalidAttachment(reason),
            StorageError::Unavailable(reason) => EngineError::Storage(reason),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<StoredObject, StorageError>;
}

/// What [`inspect_payload`] learned about a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadInfo {
    pub format: &'static str,
    pub size_bytes: u64,
}

/// Decode a base64 payload (optionally wrapped in a `data:` URL) and check it
/// against `rules`.
pub fn inspect_payload(base64_payload: &str, rules: &ValidationRules) -> ResultEngine<PayloadInfo> {
    let encoded = match base64_payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => base64_payload,
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| EngineError::InvalidAttachment(format!("payload is not base64: {err}")))?;
    if bytes.is_empty() {
        return Err(EngineError::InvalidAttachment("payload is empty".to_string()));
    }

    let size_bytes = bytes.len() as u64;
    if size_bytes > rules.max_size_bytes {
        return Err(EngineError::InvalidAttachment(format!(
            "payload is {size_bytes} bytes, limit is {}",
            rules.max_size_bytes
        )));
    }

    let format = sniff_format(&bytes)
        .ok_or_else(|| EngineError::InvalidAttachment("unrecognized file format".to_string()))?;
    if !rules
        .allowed_formats
        .iter()
        .any(|allowed| same_format(allowed, format))
    {
        return Err(EngineError::InvalidAttachment(format!(
            "format {format} is not allowed"
        )));
    }

    Ok(PayloadInfo { format, size_bytes })
}

fn same_format(allowed: &str, sniffed: &str) -> bool {
    allowed.eq_ignore_ascii_case(sniffed)
        || (sniffed == "jpg" && allowed.eq_ignore_ascii_case("jpeg"))
}

fn sniff_format(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [b'G', b'I', b'F', b'8', ..] => Some("gif"),
        [b'%', b'P', b'D', b'F', ..] => Some("pdf"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        _ => None,
    }
}
