//! Core data models for the file metadata service.
//!
//! Both entities map to SQLite tables via `sqlx::FromRow`; `FileRecord`
//! doubles as the JSON payload returned by the file endpoints.

pub mod file_record;
pub mod health_check;
