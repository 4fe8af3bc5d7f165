//! Upload endpoints.
//!
//! These handlers do the caller-side checks the storage layer leaves to its
//! users (size, MIME type, folder name) and then hand the bytes to
//! [`Storage`]. Whatever the backend reports is returned as JSON.

use crate::app_config::{self, LimitsConfig};
use crate::storage::{DeleteResult, Storage, UploadResult};
use actix_multipart::{Field, Multipart};
use actix_web::{delete, error, post, web, Error, HttpResponse};
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(upload_file).service(delete_file);
}

/// Folder names are used as path segments and object key prefixes.
static FOLDER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]{1,64}$").unwrap());

/// Longest accepted value for a non-file form field.
const MAX_TEXT_FIELD_BYTES: usize = 256;

/// File part of an upload form.
struct UploadedFile {
    filename: String,
    content_type: String,
    content: Vec<u8>,
}

#[derive(Deserialize)]
pub struct DeleteUploadForm {
    pub url: String,
}

/// Read a multipart field into memory.
///
/// Returns `Ok(None)` as soon as the field grows past `limit` bytes.
async fn read_field(field: &mut Field, limit: usize) -> Result<Option<Vec<u8>>, Error> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        log::error!("read_field: multipart read error: {}", e);
        error::ErrorBadRequest("Error interpreting user input.")
    })? {
        if buf.len() + chunk.len() > limit {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Some(buf))
}

fn rejected(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(UploadResult::failed(message))
}

#[post("/api/uploads")]
async fn upload_file(
    storage: web::Data<Storage>,
    limits: Option<web::Data<LimitsConfig>>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let limits = limits
        .map(|l| l.get_ref().clone())
        .unwrap_or_else(app_config::limits);

    let mut folder: Option<String> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("upload_file: multipart read error: {}", e);
        error::ErrorBadRequest("Error interpreting user input.")
    })? {
        let field_name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_owned();

        match field_name.as_str() {
            "folder" => {
                let value = match read_field(&mut field, MAX_TEXT_FIELD_BYTES).await? {
                    Some(value) => value,
                    None => return Ok(rejected("Invalid folder.")),
                };
                let value = String::from_utf8(value)
                    .map_err(|_| error::ErrorBadRequest("Error interpreting user input."))?;
                folder = Some(value.trim().to_owned());
            }
            "file" => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .unwrap_or_default()
                    .to_owned();
                let content_type = field
                    .content_type()
                    .unwrap_or(&mime::APPLICATION_OCTET_STREAM)
                    .essence_str()
                    .to_owned();

                let content = match read_field(&mut field, limits.max_upload_bytes()).await? {
                    Some(content) => content,
                    None => {
                        return Ok(HttpResponse::PayloadTooLarge().json(UploadResult::failed(
                            format!(
                                "File is larger than {} MB.",
                                limits.max_upload_size_mb
                            ),
                        )))
                    }
                };

                file = Some(UploadedFile {
                    filename,
                    content_type,
                    content,
                });
            }
            _ => {
                // Drain fields we do not know about.
                while field
                    .try_next()
                    .await
                    .map_err(|_| error::ErrorBadRequest("Error interpreting user input."))?
                    .is_some()
                {}
            }
        }
    }

    let file = match file {
        Some(file) => file,
        None => return Ok(rejected("No file provided.")),
    };
    if file.content.is_empty() {
        return Ok(rejected("Upload is empty or improper."));
    }
    if !limits.is_allowed(&file.content_type) {
        return Ok(rejected("Unsupported file type."));
    }

    let folder = folder
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| limits.default_folder.clone());
    if !FOLDER_REGEX.is_match(&folder) {
        return Ok(rejected("Invalid folder."));
    }

    let result = storage
        .upload_file(file.content, &file.filename, &file.content_type, &folder)
        .await;

    if result.success {
        Ok(HttpResponse::Ok().json(result))
    } else {
        log::warn!(
            "upload_file: storage rejected upload to {}: {:?}",
            folder,
            result.error
        );
        Ok(HttpResponse::BadGateway().json(result))
    }
}

#[delete("/api/uploads")]
async fn delete_file(
    storage: web::Data<Storage>,
    form: web::Json<DeleteUploadForm>,
) -> Result<HttpResponse, Error> {
    let url = form.url.trim();
    if url.is_empty() {
        return Ok(HttpResponse::BadRequest().json(DeleteResult::failed("No URL provided.")));
    }

    let result = storage.delete_file(url).await;
    if result.success {
        Ok(HttpResponse::Ok().json(result))
    } else {
        log::warn!("delete_file: storage could not delete {}: {:?}", url, result.error);
        Ok(HttpResponse::BadGateway().json(result))
    }
}
