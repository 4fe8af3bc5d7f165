//! Cloudflare R2 storage backend (S3-compatible).

use super::{
    bucket_or_default, generate_file_name, object_key, DeleteResult, ProviderKind, StorageError,
    StorageProvider, UploadResult,
};
use crate::app_config::R2StorageConfig;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use rusoto_core::credential::StaticProvider;
use rusoto_core::{HttpClient, Region};
use rusoto_s3::{DeleteObjectRequest, PutObjectRequest, S3Client, S3};
use url::Url;

/// R2 has no regions; the SDK still wants a name.
const R2_REGION: &str = "auto";

/// Cloudflare R2 storage backend.
pub struct R2Storage {
    config: R2StorageConfig,
    bucket_name: String,
    s3: OnceCell<S3Client>,
}

impl R2Storage {
    /// Create a new R2 storage backend. The S3 client is built on first use.
    pub fn new(config: R2StorageConfig) -> Self {
        let bucket_name = bucket_or_default(&config.bucket_name);
        log::info!("R2Storage configured for bucket: {}", bucket_name);
        Self {
            config,
            bucket_name,
            s3: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&S3Client, StorageError> {
        self.s3.get_or_try_init(|| {
            let account_id = self.config.account_id.trim();
            let access_key = self.config.access_key_id.trim();
            let secret_key = self.config.secret_access_key.trim();
            if account_id.is_empty() || access_key.is_empty() || secret_key.is_empty() {
                return Err(StorageError::Config("R2 credentials not configured".into()));
            }

            let endpoint = if self.config.endpoint.trim().is_empty() {
                format!("https://{}.r2.cloudflarestorage.com", account_id)
            } else {
                self.config.endpoint.trim().trim_end_matches('/').to_string()
            };
            let region = Region::Custom {
                name: R2_REGION.to_string(),
                endpoint,
            };

            let http = HttpClient::new().map_err(|e| StorageError::S3(e.to_string()))?;
            let credentials =
                StaticProvider::new_minimal(access_key.to_string(), secret_key.to_string());

            log::info!("R2Storage client created for account: {}", account_id);
            Ok(S3Client::new_with(http, credentials, region))
        })
    }

    /// Base that public URLs start with, without trailing slash.
    fn public_base(&self) -> String {
        let configured = self.config.public_url.trim().trim_end_matches('/');
        if configured.is_empty() {
            format!(
                "https://{}.{}.r2.dev",
                self.bucket_name,
                self.config.account_id.trim()
            )
        } else {
            configured.to_string()
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base(), key)
    }

    /// Recover the object key from a URL returned by `upload`.
    fn key_from_url(&self, url: &str) -> Result<String, StorageError> {
        let base = format!("{}/", self.public_base());
        let key = match url.strip_prefix(&base) {
            Some(key) => key.to_string(),
            None => Url::parse(url)?.path().trim_start_matches('/').to_string(),
        };

        if key.is_empty() {
            return Err(StorageError::InvalidUrl(url.to_string()));
        }
        Ok(key)
    }

    async fn try_upload(
        &self,
        content: Vec<u8>,
        content_type: &str,
        folder: &str,
    ) -> Result<String, StorageError> {
        let s3 = self.client()?;
        let key = object_key(folder, &generate_file_name(content_type));
        log::info!("R2Storage: put_object: {}", key);

        let put_request = PutObjectRequest {
            bucket: self.bucket_name.clone(),
            key: key.clone(),
            content_type: Some(content_type.to_string()),
            body: Some(content.into()),
            ..Default::default()
        };

        s3.put_object(put_request)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(self.public_url(&key))
    }

    async fn try_delete(&self, url: &str) -> Result<(), StorageError> {
        let s3 = self.client()?;
        let key = self.key_from_url(url)?;
        log::info!("R2Storage: delete_object: {}", key);

        let delete_request = DeleteObjectRequest {
            bucket: self.bucket_name.clone(),
            key,
            ..Default::default()
        };

        s3.delete_object(delete_request)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl StorageProvider for R2Storage {
    fn kind(&self) -> ProviderKind {
        ProviderKind::R2
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
                log::error!("R2Storage: upload to {:?} failed: {}", folder, e);
                e
            })
            .into()
    }

    async fn delete(&self, url: &str) -> DeleteResult {
        self.try_delete(url)
            .await
            .map_err(|e| {
                log::error!("R2Storage: delete of {} failed: {}", url, e);
                e
            })
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> R2StorageConfig {
        R2StorageConfig {
            account_id: "acct123".to_string(),
            access_key_id: "access".to_string(),
            secret_access_key: "secret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_public_url() {
        let storage = R2Storage::new(config());
        assert_eq!(
            storage.public_url("avatars/1-a.jpg"),
            "https://uploads.acct123.r2.dev/avatars/1-a.jpg"
        );
    }

    #[test]
    fn test_public_url_override() {
        let storage = R2Storage::new(R2StorageConfig {
            bucket_name: "bonsai".to_string(),
            public_url: "https://media.bonsai.example/".to_string(),
            ..config()
        });
        assert_eq!(
            storage.public_url("avatars/1-a.jpg"),
            "https://media.bonsai.example/avatars/1-a.jpg"
        );
    }

    #[test]
    fn test_key_from_url() {
        let storage = R2Storage::new(config());
        assert_eq!(
            storage
                .key_from_url("https://uploads.acct123.r2.dev/avatars/1-a.jpg")
                .unwrap(),
            "avatars/1-a.jpg"
        );

        // Public base with a path prefix is stripped as a whole
        let storage = R2Storage::new(R2StorageConfig {
            public_url: "https://cdn.example.com/media".to_string(),
            ..config()
        });
        assert_eq!(
            storage
                .key_from_url("https://cdn.example.com/media/posts/1-a.png")
                .unwrap(),
            "posts/1-a.png"
        );

        // Anything else falls back to the URL path
        assert_eq!(
            storage
                .key_from_url("https://elsewhere.example.com/posts/1-a.png")
                .unwrap(),
            "posts/1-a.png"
        );
        assert!(storage.key_from_url("not a url").is_err());
        assert!(storage.key_from_url("https://elsewhere.example.com/").is_err());
    }

    #[actix_rt::test]
    async fn test_missing_credentials_are_reported() {
        let storage = R2Storage::new(R2StorageConfig::default());

        let upload = storage.upload(vec![0; 4], "a.gif", "image/gif", "misc").await;
        assert_eq!(upload, UploadResult::failed("R2 credentials not configured"));

        let delete = storage
            .delete("https://uploads.acct.r2.dev/misc/1-a.gif")
            .await;
        assert_eq!(delete, DeleteResult::failed("R2 credentials not configured"));
    }
}
