//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Well-known storage environment variables (`STORAGE_PROVIDER`,
//!    `AZURE_STORAGE_ACCOUNT_KEY`, `R2_BUCKET_NAME`, ...)
//! 2. Environment variables prefixed with `BONSAI_`, `__` between sections
//!    (e.g. `BONSAI_STORAGE__R2__PUBLIC_URL`)
//! 3. Config file (config.toml)
//! 4. Default values
//!
//! Secrets like storage account keys should be kept in environment
//! variables, not in the config file.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Global application configuration
pub static APP_CONFIG: Lazy<RwLock<AppConfig>> = Lazy::new(|| {
    RwLock::new(AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config file, using defaults: {}", e);
        AppConfig::default()
    }))
});

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upload limits enforced by the HTTP handlers before calling storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size in MB
    pub max_upload_size_mb: u32,
    /// MIME types accepted for upload
    pub allowed_content_types: Vec<String>,
    /// Folder used when a request names none
    pub default_folder: String,
}

impl LimitsConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size_mb as usize * 1024 * 1024
    }

    pub fn is_allowed(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 10,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
            ],
            default_folder: "misc".to_string(),
        }
    }
}

/// Local filesystem storage (used when provider = "local")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    /// Directory files are written to
    pub base_dir: String,
    /// URL path the directory is served under
    pub url_prefix: String,
}

impl LocalStorageConfig {
    /// `url_prefix` with exactly one leading slash and no trailing slash.
    pub fn normalized_url_prefix(&self) -> String {
        format!("/{}", self.url_prefix.trim_matches('/'))
    }
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_dir: "public/uploads".to_string(),
            url_prefix: "/uploads".to_string(),
        }
    }
}

/// Azure Blob Storage (used when provider = "azure")
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureStorageConfig {
    pub account_name: String,
    /// Base64 account key (should be in env var AZURE_STORAGE_ACCOUNT_KEY)
    pub account_key: String,
    /// Container name, "uploads" when empty
    pub container_name: String,
    /// Blob service endpoint, `https://<account>.blob.core.windows.net` when empty
    pub endpoint: String,
}

/// Supabase Storage (used when provider = "supabase")
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseStorageConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service role key (should be in env var SUPABASE_SERVICE_ROLE_KEY)
    pub service_role_key: String,
    /// Bucket name, "uploads" when empty
    pub bucket: String,
}

/// Cloudflare R2 (used when provider = "r2")
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct R2StorageConfig {
    pub account_id: String,
    pub access_key_id: String,
    /// Secret key (should be in env var R2_SECRET_ACCESS_KEY)
    pub secret_access_key: String,
    /// Bucket name, "uploads" when empty
    pub bucket_name: String,
    /// Public or custom-domain base for returned URLs
    pub public_url: String,
    /// S3 API endpoint, `https://<account>.r2.cloudflarestorage.com` when empty
    pub endpoint: String,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend: "local", "azure", "supabase" or "r2". Anything else is local.
    pub provider: String,
    pub local: LocalStorageConfig,
    pub azure: AzureStorageConfig,
    pub supabase: SupabaseStorageConfig,
    pub r2: R2StorageConfig,
}

impl StorageConfig {
    /// Apply the well-known storage environment variables on top of this config.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Same as [`StorageConfig::apply_env`] with a custom variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 12] = [
            ("STORAGE_PROVIDER", &mut self.provider),
            ("AZURE_STORAGE_ACCOUNT_NAME", &mut self.azure.account_name),
            ("AZURE_STORAGE_ACCOUNT_KEY", &mut self.azure.account_key),
            ("AZURE_STORAGE_CONTAINER_NAME", &mut self.azure.container_name),
            ("SUPABASE_URL", &mut self.supabase.url),
            ("SUPABASE_SERVICE_ROLE_KEY", &mut self.supabase.service_role_key),
            ("SUPABASE_STORAGE_BUCKET", &mut self.supabase.bucket),
            ("R2_ACCOUNT_ID", &mut self.r2.account_id),
            ("R2_ACCESS_KEY_ID", &mut self.r2.access_key_id),
            ("R2_SECRET_ACCESS_KEY", &mut self.r2.secret_access_key),
            ("R2_BUCKET_NAME", &mut self.r2.bucket_name),
            ("R2_PUBLIC_URL", &mut self.r2.public_url),
        ];

        for (key, target) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let mut loaded = Self::load_layers(path)?;
        loaded.storage.apply_env();
        Ok(loaded)
    }

    /// Defaults, file and `BONSAI_` variables, without the well-known names.
    fn load_layers(path: &str) -> Result<Self, ConfigError> {
        use config::FileFormat;

        let config = Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file (optional) - use from_file for full path support
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // e.g., BONSAI_SERVER__BIND_ADDRESS, BONSAI_STORAGE__PROVIDER
            .add_source(
                Environment::with_prefix("BONSAI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

/// Initialize application configuration
///
/// This triggers the lazy loading of the config file and logs the result.
/// Should be called early in application startup.
pub fn init() {
    let config = get_config();
    log::info!(
        "Configuration loaded: storage.provider = {:?}, server.bind_address = {}",
        config.storage.provider,
        config.server.bind_address
    );
}

/// Get the current application configuration
pub fn get_config() -> AppConfig {
    APP_CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}

/// Get server configuration
pub fn server() -> ServerConfig {
    get_config().server
}

/// Get limits configuration
pub fn limits() -> LimitsConfig {
    get_config().limits
}

/// Get storage configuration
pub fn storage() -> StorageConfig {
    get_config().storage
}
