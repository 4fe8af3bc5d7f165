//! Supabase Storage backend (REST object store).

use super::{
    bucket_or_default, generate_file_name, object_key, DeleteResult, ProviderKind, StorageError,
    StorageProvider, UploadResult,
};
use crate::app_config::SupabaseStorageConfig;
use async_trait::async_trait;
use regex::Regex;

/// Supabase Storage backend.
///
/// Returned URLs use the public object route, so the bucket must be marked
/// public in the Supabase dashboard. That is the operator's job; nothing here
/// checks it, and a private bucket yields URLs that answer 400.
pub struct SupabaseStorage {
    base_url: String,
    service_role_key: String,
    bucket: String,
    http: reqwest::Client,
}

impl SupabaseStorage {
    /// Create a new Supabase storage backend. Credentials are checked per call.
    pub fn new(config: SupabaseStorageConfig) -> Self {
        let bucket = bucket_or_default(&config.bucket);
        log::info!("SupabaseStorage configured for bucket: {}", bucket);
        Self {
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.trim().to_string(),
            bucket,
            http: reqwest::Client::new(),
        }
    }

    fn check_credentials(&self) -> Result<(), StorageError> {
        if self.base_url.is_empty() || self.service_role_key.is_empty() {
            return Err(StorageError::Config(
                "Supabase Storage credentials not configured".into(),
            ));
        }
        Ok(())
    }

    /// Authenticated object endpoint used for writes and deletes.
    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, key
        )
    }

    /// Public URL handed back to clients.
    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }

    /// Recover the object key from a public URL.
    fn key_from_url(&self, url: &str) -> Result<String, StorageError> {
        let pattern = format!(
            r"/storage/v1/object/public/{}/(.+)$",
            regex::escape(&self.bucket)
        );
        let re = Regex::new(&pattern).map_err(|e| StorageError::InvalidUrl(e.to_string()))?;

        re.captures(url)
            .and_then(|caps| caps.get(1))
            .map(|key| key.as_str().to_string())
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))
    }

    async fn check_response(response: reqwest::Response) -> Result<(), StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn try_upload(
        &self,
        content: Vec<u8>,
        content_type: &str,
        folder: &str,
    ) -> Result<String, StorageError> {
        self.check_credentials()?;

        let key = object_key(folder, &generate_file_name(content_type));
        log::info!("SupabaseStorage: upload: {}", key);

        let response = self
            .http
            .post(self.object_url(&key))
            .bearer_auth(&self.service_role_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content)
            .send()
            .await?;
        Self::check_response(response).await?;

        Ok(self.public_url(&key))
    }

    async fn try_delete(&self, url: &str) -> Result<(), StorageError> {
        self.check_credentials()?;

        let key = self.key_from_url(url)?;
        log::info!("SupabaseStorage: delete: {}", key);

        let response = self
            .http
            .delete(self.object_url(&key))
            .bearer_auth(&self.service_role_key)
            .send()
            .await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl StorageProvider for SupabaseStorage {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Supabase
    }

    async fn upload(
        &self,
        content: Vec<u8>,
        _original_filename: &str,
        content_type: &str,
        folder: &str,
    ) -> UploadResult {
        self.try_upload(content, content_type, folder)
            .await
            .map_err(|e| {
                log::error!("SupabaseStorage: upload to {:?} failed: {}", folder, e);
                e
            })
            .into()
    }

    async fn delete(&self, url: &str) -> DeleteResult {
        self.try_delete(url)
            .await
            .map_err(|e| {
                log::error!("SupabaseStorage: delete of {} failed: {}", url, e);
                e
            })
            .into()
    }
}
