//! Defines the HTTP surface.
//!
//! ## Structure
//! - `GET    /healthz`        — liveness check backed by a database write
//! - `POST   /v1/file`        — upload a file (multipart field `file`)
//! - `GET    /v1/file/{id}`   — fetch file metadata
//! - `DELETE /v1/file/{id}`   — delete the blob and its metadata
//!
//! Every other method on these paths, and `OPTIONS` on any path, is a 405.

use crate::{
    handlers::{
        file_handlers::{delete_file, get_file, upload_file},
        health_handlers::health_check,
    },
    middleware::{block_options, log_requests, method_not_allowed, not_found, standard_headers},
    services::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};

/// Build the router with the middleware chain applied.
///
/// The fallback is registered before the layers so unknown paths pass
/// through the same chain.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health_check).head(method_not_allowed))
        .route("/v1/file", post(upload_file))
        .route(
            "/v1/file/{id}",
            get(get_file)
                .delete(delete_file)
                .head(method_not_allowed),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(from_fn(block_options))
        .layer(from_fn(standard_headers))
        .layer(from_fn(log_requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{StoreError, StoreResult},
        metrics::tests::Recorder,
        models::{file_record::FileRecord, health_check::HealthCheckRecord},
        services::{
            blob_store::{BlobStore, ObjectStoreBlobs},
            metadata_store::{
                MetadataStore, SqliteMetadataStore,
                tests::{break_health_check_commits, count_rows, memory_store},
            },
        },
    };
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, Response, StatusCode, header},
    };
    use bytes::Bytes;
    use chrono::Local;
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use object_store::{ObjectStore, memory::InMemory, path::Path};
    use serde_json::Value;
    use sqlx::SqlitePool;
    use std::{io, sync::Arc};
    use tower::ServiceExt;

    const BUCKET: &str = "test-bucket";
    const BOUNDARY: &str = "X-TEST-BOUNDARY";

    struct Harness {
        app: Router,
        pool: Arc<SqlitePool>,
        objects: Arc<InMemory>,
        recorder: Recorder,
    }

    async fn harness() -> Harness {
        let (store, pool) = memory_store().await;
        harness_with(Arc::new(store), None, pool).await
    }

    async fn harness_with(
        metadata: Arc<dyn MetadataStore>,
        blobs: Option<Arc<dyn BlobStore>>,
        pool: Arc<SqlitePool>,
    ) -> Harness {
        let objects = Arc::new(InMemory::new());
        let blobs: Arc<dyn BlobStore> = match blobs {
            Some(blobs) => blobs,
            None => Arc::new(ObjectStoreBlobs::new(objects.clone())),
        };
        let (recorder, metrics) = Recorder::new();
        let state = AppState {
            metadata,
            blobs,
            bucket_name: BUCKET.into(),
            metrics: Arc::new(metrics),
        };
        Harness {
            app: routes(1024 * 1024).with_state(state),
            pool,
            objects,
            recorder,
        }
    }

    /// Blob store whose every call fails.
    struct BrokenBlobs;

    #[async_trait]
    impl BlobStore for BrokenBlobs {
        async fn put(&self, _key: &str, _data: Bytes) -> StoreResult<()> {
            Err(StoreError::Io(io::Error::other("blob store offline")))
        }

        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Io(io::Error::other("blob store offline")))
        }
    }

    /// Delegates reads to a real store and fails every write.
    struct ReadOnlyMetadata(SqliteMetadataStore);

    #[async_trait]
    impl MetadataStore for ReadOnlyMetadata {
        async fn insert_health_check(&self) -> StoreResult<HealthCheckRecord> {
            Err(StoreError::Io(io::Error::other("commit failed")))
        }

        async fn insert_file(&self, _record: &FileRecord) -> StoreResult<()> {
            Err(StoreError::Io(io::Error::other("commit failed")))
        }

        async fn get_file(&self, id: &str) -> StoreResult<Option<FileRecord>> {
            self.0.get_file(id).await
        }

        async fn delete_file(&self, _id: &str) -> StoreResult<()> {
            Err(StoreError::Io(io::Error::other("commit failed")))
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.unwrap()
    }

    fn empty(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn multipart_upload(field: &str, file_name: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{contents}\r\n--{b}--\r\n",
            b = BOUNDARY,
        );
        Request::builder()
            .method(Method::POST)
            .uri("/v1/file")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response<Body>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn body_json(response: Response<Body>) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn assert_standard_headers(response: &Response<Body>) {
        let headers = response.headers();
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    async fn upload(h: &Harness, file_name: &str, contents: &str) -> Value {
        let response = send(&h.app, multipart_upload("file", file_name, contents)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn health_check_succeeds_and_records_a_row() {
        let h = harness().await;
        for expected in 1..=2 {
            let response = send(&h.app, empty(Method::GET, "/healthz")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_standard_headers(&response);
            assert!(body_bytes(response).await.is_empty());
            assert_eq!(count_rows(&h.pool, "health_checks").await, expected);
        }
    }

    #[tokio::test]
    async fn health_check_rejects_other_methods() {
        let h = harness().await;
        for method in [
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
            Method::HEAD,
        ] {
            let response = send(&h.app, empty(method.clone(), "/healthz")).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
            assert_standard_headers(&response);
        }
        assert_eq!(count_rows(&h.pool, "health_checks").await, 0);
    }

    #[tokio::test]
    async fn health_check_rejects_query_and_body() {
        let h = harness().await;

        let response = send(&h.app, empty(Method::GET, "/healthz?random=12345")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_standard_headers(&response);

        let form = Request::builder()
            .method(Method::GET)
            .uri("/healthz")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("random=12345"))
            .unwrap();
        let response = send(&h.app, form).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_bytes(response).await.is_empty());

        assert_eq!(count_rows(&h.pool, "health_checks").await, 0);
    }

    #[tokio::test]
    async fn health_check_reports_store_failure_as_503() {
        let h = harness().await;
        sqlx::query("DROP TABLE health_checks")
            .execute(&*h.pool)
            .await
            .unwrap();

        let response = send(&h.app, empty(Method::GET, "/healthz")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_standard_headers(&response);
    }

    #[tokio::test]
    async fn health_check_commit_failure_is_503() {
        let (store, pool) = memory_store().await;
        let h = harness_with(Arc::new(ReadOnlyMetadata(store)), None, pool).await;

        let response = send(&h.app, empty(Method::GET, "/healthz")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(count_rows(&h.pool, "health_checks").await, 0);
    }

    #[tokio::test]
    async fn health_check_sqlite_commit_failure_is_503_without_row() {
        let h = harness().await;
        break_health_check_commits(&h.pool).await;

        let response = send(&h.app, empty(Method::GET, "/healthz")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_standard_headers(&response);
        assert_eq!(count_rows(&h.pool, "health_checks").await, 0);

        // The failed commit does not wedge the single in-memory connection.
        let created = upload(&h, "after.txt", "data").await;
        let id = created["id"].as_str().unwrap();
        let response = send(&h.app, empty(Method::GET, &format!("/v1/file/{}", id))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn every_health_check_outcome_records_one_sample() {
        let h = harness().await;
        let sample = |operation: &str, outcome: &str| (operation.to_string(), outcome.to_string(), 1);

        send(&h.app, empty(Method::GET, "/healthz?random=12345")).await;
        assert_eq!(
            h.recorder.samples(),
            vec![sample("health_check.rejected", "error")]
        );

        send(&h.app, empty(Method::GET, "/healthz")).await;
        assert_eq!(
            h.recorder.samples(),
            vec![
                sample("health_check.insert", "ok"),
                sample("health_check.rejected", "error"),
            ]
        );

        sqlx::query("DROP TABLE health_checks")
            .execute(&*h.pool)
            .await
            .unwrap();
        let response = send(&h.app, empty(Method::GET, "/healthz")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            h.recorder.samples(),
            vec![
                sample("health_check.insert", "error"),
                sample("health_check.insert", "ok"),
                sample("health_check.rejected", "error"),
            ]
        );
    }

    #[tokio::test]
    async fn options_is_rejected_everywhere() {
        let h = harness().await;
        for uri in ["/healthz", "/v1/file", "/v1/file/abc", "/no/such/path"] {
            let response = send(&h.app, empty(Method::OPTIONS, uri)).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", uri);
            assert_standard_headers(&response);
        }
    }

    #[tokio::test]
    async fn unregistered_methods_on_file_routes_are_405() {
        let h = harness().await;
        let cases = [
            (Method::GET, "/v1/file"),
            (Method::PUT, "/v1/file"),
            (Method::DELETE, "/v1/file"),
            (Method::POST, "/v1/file/abc"),
            (Method::PUT, "/v1/file/abc"),
            (Method::PATCH, "/v1/file/abc"),
            (Method::HEAD, "/v1/file/abc"),
        ];
        for (method, uri) in cases {
            let response = send(&h.app, empty(method.clone(), uri)).await;
            assert_eq!(
                response.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{} {}",
                method,
                uri
            );
            assert_standard_headers(&response);
        }
    }

    #[tokio::test]
    async fn unknown_path_is_404_with_headers() {
        let h = harness().await;
        let response = send(&h.app, empty(Method::GET, "/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_standard_headers(&response);
    }

    #[tokio::test]
    async fn upload_then_get_returns_same_record() {
        let h = harness().await;
        let created = upload(&h, "my report.pdf", "pdf bytes").await;

        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["file_name"], "my_report.pdf");
        assert_eq!(
            created["url"],
            format!("{}/{}/my_report.pdf", BUCKET, id)
        );
        assert_eq!(
            created["upload_date"],
            Local::now().date_naive().format("%Y-%m-%d").to_string()
        );

        let stored = h
            .objects
            .get(&Path::from(format!("{}/my_report.pdf", id)))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored, Bytes::from_static(b"pdf bytes"));

        let response = send(&h.app, empty(Method::GET, &format!("/v1/file/{}", id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_standard_headers(&response);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_json(response).await, created);
    }

    #[tokio::test]
    async fn upload_ids_are_unique() {
        let h = harness().await;
        let first = upload(&h, "a.txt", "one").await;
        let second = upload(&h, "a.txt", "two").await;
        assert_ne!(first["id"], second["id"]);
        assert_eq!(count_rows(&h.pool, "files").await, 2);
    }

    #[tokio::test]
    async fn upload_sanitizes_path_traversal() {
        let h = harness().await;
        let created = upload(&h, "../../etc/passwd", "root").await;
        assert_eq!(created["file_name"], "passwd");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_400() {
        let h = harness().await;

        let response = send(&h.app, multipart_upload("attachment", "a.txt", "data")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_standard_headers(&response);

        let response = send(&h.app, empty(Method::POST, "/v1/file")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(count_rows(&h.pool, "files").await, 0);
        assert!(h.objects.list(None).collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn upload_with_empty_filename_is_400() {
        let h = harness().await;
        let response = send(&h.app, multipart_upload("file", "", "data")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(count_rows(&h.pool, "files").await, 0);
        assert!(h.objects.list(None).collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn upload_blob_failure_is_400_without_row() {
        let (store, pool) = memory_store().await;
        let h = harness_with(Arc::new(store), Some(Arc::new(BrokenBlobs)), pool).await;

        let response = send(&h.app, multipart_upload("file", "a.txt", "data")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(count_rows(&h.pool, "files").await, 0);
    }

    #[tokio::test]
    async fn upload_row_failure_is_400_and_leaves_orphan_blob() {
        let (store, pool) = memory_store().await;
        let h = harness_with(Arc::new(ReadOnlyMetadata(store)), None, pool).await;

        let response = send(&h.app, multipart_upload("file", "a.txt", "data")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(count_rows(&h.pool, "files").await, 0);

        let orphans = h.objects.list(None).collect::<Vec<_>>().await;
        assert_eq!(orphans.len(), 1);
    }

    #[tokio::test]
    async fn get_unknown_file_is_400() {
        let h = harness().await;
        let response = send(&h.app, empty(Method::GET, "/v1/file/never-created")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_standard_headers(&response);
    }

    #[tokio::test]
    async fn get_with_broken_store_is_500() {
        let h = harness().await;
        sqlx::query("DROP TABLE files")
            .execute(&*h.pool)
            .await
            .unwrap();
        let response = send(&h.app, empty(Method::GET, "/v1/file/abc")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn delete_unknown_file_is_404() {
        let h = harness().await;
        let response = send(&h.app, empty(Method::DELETE, "/v1/file/never-created")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_standard_headers(&response);
    }

    #[tokio::test]
    async fn delete_removes_blob_and_row() {
        let h = harness().await;
        let created = upload(&h, "a.txt", "data").await;
        let id = created["id"].as_str().unwrap().to_string();
        let uri = format!("/v1/file/{}", id);

        let response = send(&h.app, empty(Method::DELETE, &uri)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_standard_headers(&response);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert!(body_bytes(response).await.is_empty());

        assert!(
            h.objects
                .head(&Path::from(format!("{}/a.txt", id)))
                .await
                .is_err()
        );

        let response = send(&h.app, empty(Method::GET, &uri)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&h.app, empty(Method::DELETE, &uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_blob_failure_is_500_and_keeps_row() {
        let (store, pool) = memory_store().await;
        store
            .insert_file(&FileRecord {
                file_name: "a.txt".into(),
                id: "abc".into(),
                url: format!("{}/abc/a.txt", BUCKET),
                upload_date: Local::now().date_naive(),
            })
            .await
            .unwrap();
        let h = harness_with(Arc::new(store), Some(Arc::new(BrokenBlobs)), pool).await;

        let response = send(&h.app, empty(Method::DELETE, "/v1/file/abc")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(count_rows(&h.pool, "files").await, 1);
    }

    #[tokio::test]
    async fn delete_row_failure_is_500() {
        let (store, pool) = memory_store().await;
        let h = harness_with(Arc::new(ReadOnlyMetadata(store.clone())), None, pool).await;
        store
            .insert_file(&FileRecord {
                file_name: "a.txt".into(),
                id: "abc".into(),
                url: format!("{}/abc/a.txt", BUCKET),
                upload_date: Local::now().date_naive(),
            })
            .await
            .unwrap();
        h.objects
            .put(&Path::from("abc/a.txt"), Bytes::from_static(b"data").into())
            .await
            .unwrap();

        let response = send(&h.app, empty(Method::DELETE, "/v1/file/abc")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(count_rows(&h.pool, "files").await, 1);
    }
}
