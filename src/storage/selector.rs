//! Backend selection and the `Storage` facade.

use super::azure::AzureStorage;
use super::local::LocalStorage;
use super::r2::R2Storage;
use super::supabase::SupabaseStorage;
use super::{DeleteResult, StorageProvider, UploadResult};
use crate::app_config::{self, StorageConfig};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Azure,
    Supabase,
    R2,
}

impl ProviderKind {
    /// Parse a configured provider name. Unknown or empty names mean local storage.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "azure" => ProviderKind::Azure,
            "supabase" => ProviderKind::Supabase,
            "r2" => ProviderKind::R2,
            "local" | "" => ProviderKind::Local,
            other => {
                log::warn!(
                    "Unknown storage provider {:?}, falling back to local storage",
                    other
                );
                ProviderKind::Local
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Azure => "azure",
            ProviderKind::Supabase => "supabase",
            ProviderKind::R2 => "r2",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construct the adapter the configuration asks for.
pub fn build_provider(config: &StorageConfig) -> Arc<dyn StorageProvider> {
    let kind = ProviderKind::from_name(&config.provider);
    log::info!("Storage provider: {}", kind);

    match kind {
        ProviderKind::Local => Arc::new(LocalStorage::new(config.local.clone())),
        ProviderKind::Azure => Arc::new(AzureStorage::new(config.azure.clone())),
        ProviderKind::Supabase => Arc::new(SupabaseStorage::new(config.supabase.clone())),
        ProviderKind::R2 => Arc::new(R2Storage::new(config.r2.clone())),
    }
}

type ProviderFactory = Box<dyn Fn() -> Arc<dyn StorageProvider> + Send + Sync>;

/// Entry point for everything that stores user files.
///
/// The backend is chosen and constructed once, on first use, and kept for
/// the lifetime of this value. Concurrent first calls wait for the same
/// initialization, so only one adapter is ever built.
pub struct Storage {
    provider: OnceCell<Arc<dyn StorageProvider>>,
    factory: ProviderFactory,
}

impl Storage {
    /// Storage backed by the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self::with_factory(move || build_provider(&config))
    }

    /// Storage that reads the application configuration on first use.
    pub fn from_app_config() -> Self {
        Self::with_factory(|| build_provider(&app_config::storage()))
    }

    /// Storage with a caller-supplied backend constructor.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn StorageProvider> + Send + Sync + 'static,
    {
        Self {
            provider: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// The selected backend, constructing it on first call.
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        self.provider.get_or_init(|| (self.factory)())
    }

    /// Store `content` under `folder`. Never fails with an error type; check `success`.
    pub async fn upload_file(
        &self,
        content: Vec<u8>,
        filename: &str,
        content_type: &str,
        folder: &str,
    ) -> UploadResult {
        self.provider()
            .upload(content, filename, content_type, folder)
            .await
    }

    /// Remove a file previously stored by [`Storage::upload_file`].
    pub async fn delete_file(&self, url: &str) -> DeleteResult {
        self.provider().delete(url).await
    }
}
