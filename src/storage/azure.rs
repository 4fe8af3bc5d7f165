//! Azure Blob Storage backend.
//!
//! Talks to the Blob service REST API directly with Shared Key
//! authorization. The client is built lazily on first use so a missing key
//! only fails the requests that need it.

use super::{
    bucket_or_default, generate_file_name, object_key, DeleteResult, ProviderKind, StorageError,
    StorageProvider, UploadResult,
};
use crate::app_config::AzureStorageConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use once_cell::sync::OnceCell;
use reqwest::{Method, StatusCode};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// REST API version sent as `x-ms-version`.
pub const API_VERSION: &str = "2021-08-06";

/// Connection state built from configuration on first use.
struct AzureClient {
    account: String,
    key: Vec<u8>,
    endpoint: Url,
    http: reqwest::Client,
}

/// Azure Blob Storage backend.
pub struct AzureStorage {
    config: AzureStorageConfig,
    container: String,
    client: OnceCell<AzureClient>,
}

impl AzureStorage {
    /// Create a new Azure storage backend. Credentials are checked on first use.
    pub fn new(config: AzureStorageConfig) -> Self {
        let container = bucket_or_default(&config.container_name);
        log::info!("AzureStorage configured for container: {}", container);
        Self {
            config,
            container,
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&AzureClient, StorageError> {
        self.client.get_or_try_init(|| {
            let account = self.config.account_name.trim();
            let key = self.config.account_key.trim();
            if account.is_empty() || key.is_empty() {
                return Err(StorageError::Config(
                    "Azure Storage credentials not configured".into(),
                ));
            }

            let key = BASE64.decode(key).map_err(|_| {
                StorageError::Config("Azure Storage account key is not valid base64".into())
            })?;

            let endpoint = if self.config.endpoint.trim().is_empty() {
                format!("https://{}.blob.core.windows.net", account)
            } else {
                self.config.endpoint.trim().trim_end_matches('/').to_string()
            };
            let endpoint = Url::parse(&endpoint)?;

            log::info!("AzureStorage client created for account: {}", account);
            Ok(AzureClient {
                account: account.to_string(),
                key,
                endpoint,
                http: reqwest::Client::new(),
            })
        })
    }

    /// Send one signed request; any non-2xx status is an error.
    async fn send(
        &self,
        method: Method,
        url: Url,
        mut ms_headers: Vec<(&'static str, String)>,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), StorageError> {
        let client = self.client()?;
        ms_headers.push(("x-ms-date", rfc1123_now()));
        ms_headers.push(("x-ms-version", API_VERSION.to_string()));

        let string_to_sign = string_to_sign(
            method.as_str(),
            body.len(),
            content_type.unwrap_or(""),
            &ms_headers,
            &client.account,
            &url,
        );
        let signature = sign(&client.key, &string_to_sign);

        log::debug!("AzureStorage: {} {}", method, url);
        let mut request = client.http.request(method, url).header(
            reqwest::header::AUTHORIZATION,
            format!("SharedKey {}:{}", client.account, signature),
        );
        for (name, value) in &ms_headers {
            request = request.header(*name, value.as_str());
        }
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = request.body(body).send().await?;
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

    /// Create the container with blob-level public read access if it is missing.
    async fn ensure_container(&self, client: &AzureClient) -> Result<(), StorageError> {
        let mut url = self.container_url(client)?;
        url.set_query(Some("restype=container"));

        let created = self
            .send(
                Method::PUT,
                url,
                vec![("x-ms-blob-public-access", "blob".to_string())],
                None,
                Vec::new(),
            )
            .await;

        match created {
            // ContainerAlreadyExists
            Err(StorageError::Status { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {
                Ok(())
            }
            other => other,
        }
    }

    fn container_url(&self, client: &AzureClient) -> Result<Url, StorageError> {
        Ok(Url::parse(&format!(
            "{}/{}",
            client.endpoint.as_str().trim_end_matches('/'),
            self.container
        ))?)
    }

    fn blob_url(&self, client: &AzureClient, blob_name: &str) -> Result<Url, StorageError> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.container_url(client)?,
            blob_name
        ))?)
    }

    /// Recover the blob name from a URL returned by `upload`.
    ///
    /// Drops the endpoint's own path segments and the container segment.
    fn blob_name(&self, client: &AzureClient, url: &str) -> Result<String, StorageError> {
        let url = Url::parse(url)?;
        let endpoint_depth = client
            .endpoint
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).count())
            .unwrap_or(0);

        let name = url
            .path_segments()
            .map(|segments| segments.skip(endpoint_depth + 1).collect::<Vec<_>>().join("/"))
            .unwrap_or_default();
        if name.is_empty() {
            return Err(StorageError::InvalidUrl(url.to_string()));
        }
        Ok(name)
    }

    async fn try_upload(
        &self,
        content: Vec<u8>,
        content_type: &str,
        folder: &str,
    ) -> Result<String, StorageError> {
        let client = self.client()?;
        self.ensure_container(client).await?;

        let blob_name = object_key(folder, &generate_file_name(content_type));
        let url = self.blob_url(client, &blob_name)?;
        log::info!("AzureStorage: upload: {}", blob_name);

        self.send(
            Method::PUT,
            url.clone(),
            vec![("x-ms-blob-type", "BlockBlob".to_string())],
            Some(content_type),
            content,
        )
        .await?;

        Ok(url.to_string())
    }

    async fn try_delete(&self, url: &str) -> Result<(), StorageError> {
        let client = self.client()?;
        let blob_name = self.blob_name(client, url)?;
        log::info!("AzureStorage: delete: {}", blob_name);

        let url = self.blob_url(client, &blob_name)?;
        self.send(Method::DELETE, url, Vec::new(), None, Vec::new())
            .await
    }
}

#[async_trait]
impl StorageProvider for AzureStorage {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
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
                log::error!("AzureStorage: upload to {:?} failed: {}", folder, e);
                e
            })
            .into()
    }

    async fn delete(&self, url: &str) -> DeleteResult {
        self.try_delete(url)
            .await
            .map_err(|e| {
                log::error!("AzureStorage: delete of {} failed: {}", url, e);
                e
            })
            .into()
    }
}

fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Build the Shared Key string-to-sign for the Blob service.
///
/// `ms_headers` are the `x-ms-*` headers of the request; they are
/// canonicalized (lowercased, sorted) here.
pub(crate) fn string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, String)],
    account: &str,
    url: &Url,
) -> String {
    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .collect();
    headers.sort();
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .collect();
    params.sort();
    let mut canonical_resource = format!("/{}{}", account, url.path());
    for (key, value) in params {
        canonical_resource.push_str(&format!("\n{}:{}", key, value));
    }

    format!(
        "{verb}\n\n\n{content_length}\n\n{content_type}\n\n\n\n\n\n\n{canonical_headers}{canonical_resource}",
        verb = verb,
        content_length = content_length,
        content_type = content_type,
        canonical_headers = canonical_headers,
        canonical_resource = canonical_resource,
    )
}

/// Base64 HMAC-SHA256 of the string-to-sign with the decoded account key.
pub(crate) fn sign(key: &[u8], string_to_sign: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(endpoint: &str) -> AzureStorage {
        AzureStorage::new(AzureStorageConfig {
            account_name: "bonsai".to_string(),
            account_key: BASE64.encode(b"not-a-real-key"),
            container_name: String::new(),
            endpoint: endpoint.to_string(),
        })
    }

    #[test]
    fn test_string_to_sign_layout() {
        let url = Url::parse("https://bonsai.blob.core.windows.net/uploads?restype=container").unwrap();
        let headers = vec![
            ("x-ms-version", API_VERSION.to_string()),
            ("x-ms-blob-public-access", "blob".to_string()),
            ("x-ms-date", "Mon, 19 Oct 2026 10:00:00 GMT".to_string()),
        ];

        let signed = string_to_sign("PUT", 0, "", &headers, "bonsai", &url);
        let expected = "PUT\n\n\n\n\n\n\n\n\n\n\n\n\
x-ms-blob-public-access:blob\n\
x-ms-date:Mon, 19 Oct 2026 10:00:00 GMT\n\
x-ms-version:2021-08-06\n\
/bonsai/uploads\nrestype:container";
        assert_eq!(signed, expected);
    }

    #[test]
    fn test_string_to_sign_includes_length_and_type() {
        let url = Url::parse("https://bonsai.blob.core.windows.net/uploads/avatars/1-a.png").unwrap();
        let signed = string_to_sign("PUT", 10, "image/png", &[], "bonsai", &url);
        let lines: Vec<&str> = signed.split('\n').collect();
        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[3], "10");
        assert_eq!(lines[5], "image/png");
        assert_eq!(*lines.last().unwrap(), "/bonsai/uploads/avatars/1-a.png");
    }

    #[test]
    fn test_signature_is_base64_sha256() {
        let signature = sign(b"key", "message");
        let raw = BASE64.decode(&signature).unwrap();
        assert_eq!(raw.len(), 32);
        assert_eq!(signature, sign(b"key", "message"));
        assert_ne!(signature, sign(b"other", "message"));
    }

    #[test]
    fn test_default_endpoint_and_container() {
        let storage = configured("");
        let client = storage.client().unwrap();
        assert_eq!(
            storage.blob_url(client, "avatars/1-a.jpg").unwrap().as_str(),
            "https://bonsai.blob.core.windows.net/uploads/avatars/1-a.jpg"
        );
    }

    #[test]
    fn test_blob_name_from_url() {
        let storage = configured("");
        let client = storage.client().unwrap();
        let name = storage
            .blob_name(
                client,
                "https://bonsai.blob.core.windows.net/uploads/avatars/1-a.jpg",
            )
            .unwrap();
        assert_eq!(name, "avatars/1-a.jpg");

        assert!(storage
            .blob_name(client, "https://bonsai.blob.core.windows.net/uploads")
            .is_err());
    }

    #[test]
    fn test_blob_name_with_endpoint_path() {
        let storage = configured("http://127.0.0.1:10000/devstoreaccount1");
        let client = storage.client().unwrap();
        let name = storage
            .blob_name(
                client,
                "http://127.0.0.1:10000/devstoreaccount1/uploads/posts/1-a.jpg",
            )
            .unwrap();
        assert_eq!(name, "posts/1-a.jpg");
    }

    #[actix_rt::test]
    async fn test_missing_credentials_are_reported() {
        let storage = AzureStorage::new(AzureStorageConfig {
            account_name: "bonsai".to_string(),
            ..Default::default()
        });

        let upload = storage
            .upload(vec![0u8; 10], "a.jpg", "image/jpeg", "avatars")
            .await;
        assert_eq!(
            upload,
            UploadResult::failed("Azure Storage credentials not configured")
        );

        let delete = storage
            .delete("https://bonsai.blob.core.windows.net/uploads/avatars/1-a.jpg")
            .await;
        assert_eq!(
            delete,
            DeleteResult::failed("Azure Storage credentials not configured")
        );
    }

    #[actix_rt::test]
    async fn test_invalid_key_is_a_config_error() {
        let storage = AzureStorage::new(AzureStorageConfig {
            account_name: "bonsai".to_string(),
            account_key: "%%% not base64 %%%".to_string(),
            ..Default::default()
        });

        let upload = storage.upload(vec![1], "a", "image/png", "misc").await;
        assert!(!upload.success);
        assert!(upload.error.unwrap().contains("base64"));
    }
}
