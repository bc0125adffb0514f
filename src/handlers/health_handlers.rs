//! Health handler.
//!
//! - GET /healthz -> writes one row to `health_checks`; 200 on commit, 503 otherwise

use crate::{errors::AppError, services::AppState};
use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::StatusCode,
};
use std::time::Instant;
use tracing::{error, info};

/// `GET /healthz`
///
/// The check takes no input: a query string or any body (including form
/// fields) is a 400 and the store is left alone. Otherwise one health-check
/// row is inserted and committed; any store failure is reported as 503.
/// Either way exactly one timing sample is recorded.
pub async fn health_check(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let start = Instant::now();
    if query.as_deref().is_some_and(|q| !q.is_empty()) || !body.is_empty() {
        state
            .metrics
            .record("health_check.rejected", "error", start.elapsed());
        return Err(AppError::bad_request(
            "health check does not accept a query string or body",
        ));
    }

    match state
        .metrics
        .time("health_check.insert", state.metadata.insert_health_check())
        .await
    {
        Ok(record) => {
            info!(
                check_id = record.check_id,
                created_at = %record.created_at,
                "health check recorded"
            );
            Ok(StatusCode::OK)
        }
        Err(err) => {
            error!("health check insert failed: {}", err);
            Err(AppError::unavailable(format!("metadata store unavailable: {}", err)))
        }
    }
}
