//! Storage backend abstraction for file uploads.
//!
//! Supports multiple backends:
//! - `local`: Local filesystem storage, served by the app itself
//! - `azure`: Azure Blob Storage
//! - `supabase`: Supabase Storage over its REST API
//! - `r2`: Cloudflare R2 (S3-compatible)
//!
//! Callers never talk to a backend directly. They hold a [`Storage`] and use
//! [`Storage::upload_file`] / [`Storage::delete_file`], which never fail with
//! an error type: every problem is reported through the returned result.

pub mod azure;
pub mod extension;
pub mod local;
pub mod r2;
pub mod selector;
pub mod supabase;

pub use extension::resolve_extension;
pub use selector::{build_provider, ProviderKind, Storage};

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;

/// Outcome of an upload.
///
/// `url` is present iff `success`, `error` is present iff not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn stored(url: String) -> Self {
        Self {
            success: true,
            url: Some(url),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            url: None,
            error: Some(error_message(error)),
        }
    }
}

impl From<Result<String, StorageError>> for UploadResult {
    fn from(result: Result<String, StorageError>) -> Self {
        match result {
            Ok(url) => Self::stored(url),
            Err(e) => Self::failed(e),
        }
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteResult {
    pub fn deleted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error_message(error)),
        }
    }
}

impl From<Result<(), StorageError>> for DeleteResult {
    fn from(result: Result<(), StorageError>) -> Self {
        match result {
            Ok(()) => Self::deleted(),
            Err(e) => Self::failed(e),
        }
    }
}

fn error_message(error: impl ToString) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        message
    }
}

/// Storage operation errors.
///
/// These never leave an adapter; they are turned into [`UploadResult`] or
/// [`DeleteResult`] failures at the adapter boundary.
#[derive(Debug)]
pub enum StorageError {
    /// Backend selected but its credentials or settings are missing
    Config(String),
    /// File not found
    NotFound(String),
    /// I/O error
    Io(std::io::Error),
    /// HTTP transport error
    Http(String),
    /// Backend answered with a non-success status
    Status { status: u16, body: String },
    /// S3 error
    S3(String),
    /// URL does not have the shape this backend produces
    InvalidUrl(String),
    /// Path would leave the storage root
    InvalidPath(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Config(msg) => write!(f, "{}", msg),
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Http(msg) => write!(f, "HTTP error: {}", msg),
            StorageError::Status { status, body } => {
                write!(f, "Storage backend returned {}: {}", status, body)
            }
            StorageError::S3(msg) => write!(f, "S3 error: {}", msg),
            StorageError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            StorageError::InvalidPath(msg) => write!(f, "Invalid path: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Http(e.to_string())
    }
}

impl From<url::ParseError> for StorageError {
    fn from(e: url::ParseError) -> Self {
        StorageError::InvalidUrl(e.to_string())
    }
}

/// Trait for storage backends.
///
/// All storage backends must implement this trait to provide
/// a unified interface for file storage operations.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Store a file under `folder` and return a URL clients can fetch directly.
    ///
    /// `original_filename` is advisory only; the stored name is always
    /// generated by [`generate_file_name`].
    async fn upload(
        &self,
        content: Vec<u8>,
        original_filename: &str,
        content_type: &str,
        folder: &str,
    ) -> UploadResult;

    /// Remove a file by the URL a previous `upload` on this backend returned.
    async fn delete(&self, url: &str) -> DeleteResult;
}

/// Generate a collision-resistant file name: `<unix millis>-<16 hex><ext>`.
pub fn generate_file_name(content_type: &str) -> String {
    let suffix: [u8; 8] = rand::thread_rng().gen();
    format!(
        "{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        hex::encode(suffix),
        resolve_extension(content_type)
    )
}

/// Object key for a generated name inside a folder.
pub(crate) fn object_key(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Default bucket / container name when none is configured.
pub(crate) const DEFAULT_BUCKET: &str = "uploads";

/// Pick the configured name or fall back to [`DEFAULT_BUCKET`].
pub(crate) fn bucket_or_default(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        DEFAULT_BUCKET.to_string()
    } else {
        name.to_string()
    }
}
