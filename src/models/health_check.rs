//! A single liveness check written by `GET /healthz`.

use chrono::NaiveDateTime;
use sqlx::FromRow;

/// One row of the `health_checks` table.
///
/// Rows are only ever inserted; the insert hands the new row back so the
/// handler can log it.
#[derive(Clone, FromRow, Debug)]
pub struct HealthCheckRecord {
    /// Auto-incremented by SQLite.
    pub check_id: i64,

    /// Defaults to `CURRENT_TIMESTAMP` on insert.
    pub created_at: NaiveDateTime,
}
