//! HTTP service exposing the configured archiving drivers
//!
//! Driver operations block, so every call runs on actix's blocking pool.
//! The `job` and `driver` log tags are set on the pool thread for the length
//! of one driver call.

use actix_web::error::{ErrorBadRequest, ErrorInternalServerError, ErrorNotFound};
use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpRequest, HttpResponse, ResponseError};
use bytes::BytesMut;
use futures::StreamExt;
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::driver::{normalize_path, FileHandle, RetrievalDescriptor, SourceFile, StorageError, DEFAULT_MIMETYPE};
use crate::hashing::sha256_hex;
use crate::jobs::JobId;

/// Header carrying the SHA-256 of retrieved content
pub const CONTENT_SHA256_HEADER: &str = "X-Content-SHA256";

impl ResponseError for StorageError {
    fn status_code(&self) -> StatusCode {
        match self {
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::InvalidHandle(_) => StatusCode::BAD_REQUEST,
            StorageError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            StorageError::StorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}

/// Body of a retrieve request
#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub handle: FileHandle,
    /// Defaults to the handle's own retrieval descriptor
    #[serde(default)]
    pub target: Option<RetrievalDescriptor>,
}

/// Body of a delete request
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub handle: FileHandle,
    #[serde(default)]
    pub strict: bool,
}

/// Log tags of one driver call, removed from the thread on drop
struct RequestTags;

impl RequestTags {
    fn set(job_id: JobId, driver: &str) -> Self {
        log_mdc::insert("job", job_id.to_string());
        log_mdc::insert("driver", driver);
        RequestTags
    }
}

impl Drop for RequestTags {
    fn drop(&mut self) {
        log_mdc::remove("job");
        log_mdc::remove("driver");
    }
}

/// Split `dir/sub/name.ext` into the logical path and the filename
fn split_file_path(path: &str) -> Option<(String, String)> {
    let normalized = normalize_path(path);
    let (dir, filename) = match normalized.rsplit_once('/') {
        Some((dir, filename)) => (dir.to_string(), filename.to_string()),
        None => (String::new(), normalized),
    };
    if filename.is_empty() {
        return None;
    }
    Some((dir, filename))
}

pub async fn list_drivers_service(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let registry = app_state.registry.clone();
    let statuses = web::block(move || registry.statuses())
        .await
        .map_err(ErrorInternalServerError)?;
    debug!("Reporting status of {} drivers", statuses.len());
    Ok(HttpResponse::Ok().json(statuses))
}

pub async fn store_service(
    path: web::Path<(String, JobId, String)>,
    mut payload: web::Payload,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (driver_name, job_id, file_path) = path.into_inner();

    let driver = app_state.registry.get(&driver_name).map_err(|e| {
        warn!("Store requested on unknown driver {}", driver_name);
        ErrorNotFound(e.to_string())
    })?;
    let (logical_path, filename) =
        split_file_path(&file_path).ok_or_else(|| ErrorBadRequest("Missing filename"))?;

    let mut bytes = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            warn!("Error reading payload chunk: {}", e);
            ErrorBadRequest("Error reading payload")
        })?;
        bytes.extend_from_slice(&chunk);
    }
    if bytes.is_empty() {
        error!("No data uploaded for {} of job {}", filename, job_id);
        return Ok(HttpResponse::BadRequest().body("No data was uploaded"));
    }

    let mimetype = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_MIMETYPE)
        .to_string();
    info!("Received {} bytes for {} of job {}", bytes.len(), filename, job_id);

    let file = SourceFile::new(filename, bytes.freeze()).with_mimetype(mimetype);
    let handle = web::block(move || {
        let _tags = RequestTags::set(job_id, driver.name());
        driver.store(job_id, &file, &logical_path)
    })
    .await
    .map_err(ErrorInternalServerError)??;

    Ok(HttpResponse::Created().json(handle))
}

pub async fn retrieve_service(
    request: web::Json<RetrieveRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let RetrieveRequest { handle, target } = request.into_inner();

    let driver = app_state.registry.for_handle(&handle)?;
    let target = target.unwrap_or_else(|| handle.generate_retrieval_descriptor());
    let file = web::block(move || {
        let _tags = RequestTags::set(handle.job_id(), handle.driver_name());
        driver.retrieve(&handle, &target)
    })
    .await
    .map_err(ErrorInternalServerError)??;

    let mimetype = if file.mimetype.is_empty() {
        DEFAULT_MIMETYPE.to_string()
    } else {
        file.mimetype.clone()
    };
    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(file.filename.clone())],
    };

    Ok(HttpResponse::Ok()
        .content_type(mimetype)
        .insert_header(disposition)
        .insert_header((CONTENT_SHA256_HEADER, sha256_hex(&file.content)))
        .body(file.content))
}

pub async fn delete_service(
    request: web::Json<DeleteRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let DeleteRequest { handle, strict } = request.into_inner();

    let driver = app_state.registry.for_handle(&handle)?;
    web::block(move || {
        let _tags = RequestTags::set(handle.job_id(), handle.driver_name());
        driver.delete(&handle, strict)
    })
    .await
    .map_err(ErrorInternalServerError)??;

    Ok(HttpResponse::NoContent().finish())
}

/// Register the archive routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/drivers", web::get().to(list_drivers_service))
        .route(
            "/drivers/{driver}/jobs/{job_id}/files/{path:.*}",
            web::put().to(store_service),
        )
        .route("/files/retrieve", web::post().to(retrieve_service))
        .route("/files/delete", web::post().to(delete_service));
}
