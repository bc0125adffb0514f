//! HTTP handlers for file upload, lookup and deletion.
//!
//! Each handler catches every store failure and maps it to a status code;
//! the status codes differ per endpoint and are part of the public contract:
//!
//! - upload: bad input, blob write or row write failure -> 400
//! - get:    missing row -> 400, store failure -> 500
//! - delete: missing row -> 404, blob or row delete failure -> 500

use crate::{
    errors::AppError,
    models::file_record::{FileRecord, sanitize_file_name},
    services::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::StatusCode,
};
use chrono::Local;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Name of the multipart field that carries the upload.
const FILE_FIELD: &str = "file";

/// `POST /v1/file`
///
/// Stores the `file` field's bytes under `{id}/{file_name}`, then records
/// the metadata row. A failed row insert leaves the blob behind.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<FileRecord>), AppError> {
    let mut multipart = multipart
        .map_err(|err| AppError::bad_request(format!("expected a multipart form: {}", err)))?;
    let (raw_name, data) = read_file_field(&mut multipart).await?;

    let id = Uuid::new_v4().to_string();
    let file_name = sanitize_file_name(&raw_name);
    let key = FileRecord::object_key(&id, &file_name);

    if let Err(err) = state
        .metrics
        .time("blob.put", state.blobs.put(&key, data))
        .await
    {
        error!("failed to upload {} to bucket {}: {}", key, state.bucket_name, err);
        return Err(AppError::bad_request(format!("upload failed: {}", err)));
    }

    let record = FileRecord {
        url: format!("{}/{}", state.bucket_name, key),
        id,
        file_name,
        upload_date: Local::now().date_naive(),
    };

    if let Err(err) = state
        .metrics
        .time("file.insert", state.metadata.insert_file(&record))
        .await
    {
        error!(
            "failed to record file {}: {}; blob {} has no metadata row",
            record.id, err, key
        );
        return Err(AppError::bad_request(format!("metadata insert failed: {}", err)));
    }

    info!(id = %record.id, url = %record.url, "file uploaded");
    Ok((StatusCode::CREATED, Json(record)))
}

/// Pull the client filename and bytes out of the `file` field.
///
/// Other fields are skipped. A missing field or an empty filename is a 400.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), format!("malformed multipart body: {}", err)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(AppError::bad_request("`file` field has no filename"));
        }

        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::new(err.status(), format!("failed to read `file`: {}", err)))?;
        return Ok((file_name, data));
    }

    Err(AppError::bad_request("missing `file` field"))
}

/// `GET /v1/file/{id}`
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    match state
        .metrics
        .time("file.get", state.metadata.get_file(&id))
        .await
    {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(AppError::bad_request(format!("file `{}` not found", id))),
        Err(err) => {
            error!("failed to look up file {}: {}", id, err);
            Err(AppError::internal(format!("lookup failed: {}", err)))
        }
    }
}

/// `DELETE /v1/file/{id}`
///
/// Removes the blob first, then the row. If the row delete fails the blob
/// is already gone.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let record = match state
        .metrics
        .time("file.get", state.metadata.get_file(&id))
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => return Err(AppError::not_found(format!("file `{}` not found", id))),
        Err(err) => {
            error!("failed to look up file {}: {}", id, err);
            return Err(AppError::internal(format!("lookup failed: {}", err)));
        }
    };

    let key = record.key_in_bucket(&state.bucket_name);
    state
        .metrics
        .time("blob.delete", state.blobs.delete(&key))
        .await
        .map_err(|err| {
            error!("failed to delete blob {}: {}", key, err);
            AppError::internal(format!("blob delete failed: {}", err))
        })?;

    state
        .metrics
        .time("file.delete", state.metadata.delete_file(&record.id))
        .await
        .map_err(|err| {
            warn!("blob {} deleted but row {} remains: {}", key, record.id, err);
            AppError::internal(format!("metadata delete failed: {}", err))
        })?;

    info!(id = %record.id, "file deleted");
    Ok(StatusCode::NO_CONTENT)
}
