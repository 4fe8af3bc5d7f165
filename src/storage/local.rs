//! Local filesystem storage backend.

use super::{
    generate_file_name, object_key, DeleteResult, ProviderKind, StorageError, StorageProvider,
    UploadResult,
};
use crate::app_config::LocalStorageConfig;
use actix_web::web;
use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Local filesystem storage backend.
///
/// Files land in `<base_path>/<folder>/<name>` and are served by the app
/// under `<url_prefix>/<folder>/<name>`.
pub struct LocalStorage {
    /// Base path for file storage
    base_path: PathBuf,
    /// URL path `base_path` is served under, without trailing slash
    url_prefix: String,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// Nothing is touched on disk until the first upload.
    pub fn new(config: LocalStorageConfig) -> Self {
        let url_prefix = config.normalized_url_prefix();
        log::info!(
            "LocalStorage initialized at {:?}, served under {}",
            config.base_dir,
            url_prefix
        );
        Self {
            base_path: PathBuf::from(config.base_dir),
            url_prefix,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Resolve a relative path under the base directory.
    ///
    /// Only plain path components are accepted so nothing can escape `base_path`.
    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidPath(relative.display().to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    /// Map a URL returned by `upload` back to its file.
    fn path_for_url(&self, url: &str) -> Result<PathBuf, StorageError> {
        let prefix = format!("{}/", self.url_prefix);
        let relative = url
            .strip_prefix(&prefix)
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;
        self.resolve(relative)
    }

    async fn try_upload(
        &self,
        content: Vec<u8>,
        content_type: &str,
        folder: &str,
    ) -> Result<String, StorageError> {
        let dir = self.resolve(folder)?;
        let name = generate_file_name(content_type);
        let path = dir.join(&name);
        log::info!("LocalStorage: upload: {:?}", path);

        // Use web::block for blocking file operations
        web::block(move || {
            fs::create_dir_all(&dir)?;
            fs::write(&path, content)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(format!(
            "{}/{}",
            self.url_prefix,
            object_key(folder, &name)
        ))
    }

    async fn try_delete(&self, url: &str) -> Result<(), StorageError> {
        let path = self.path_for_url(url)?;
        log::info!("LocalStorage: delete: {:?}", path);

        web::block(move || fs::remove_file(&path))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
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
                log::error!("LocalStorage: upload to {:?} failed: {}", folder, e);
                e
            })
            .into()
    }

    async fn delete(&self, url: &str) -> DeleteResult {
        self.try_delete(url)
            .await
            .map_err(|e| {
                log::error!("LocalStorage: delete of {} failed: {}", url, e);
                e
            })
            .into()
    }
}
