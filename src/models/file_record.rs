//! Represents an uploaded file's metadata.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Longest sanitized filename kept, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Width of the `url` column.
pub const MAX_URL_LEN: usize = 512;

/// Length of a hyphenated UUID v4 id.
pub const ID_LEN: usize = 36;

/// Name used when sanitizing leaves nothing behind.
pub const FALLBACK_FILE_NAME: &str = "file";

/// Metadata for a file whose bytes live in the blob store.
///
/// The blob key is always `{id}/{file_name}` and `url` is that key
/// prefixed with the bucket name.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Sanitized client filename.
    pub file_name: String,

    /// Random UUID assigned at upload; also the blob key prefix.
    pub id: String,

    /// `{bucket}/{id}/{file_name}`.
    pub url: String,

    /// Serialized as `YYYY-MM-DD`.
    pub upload_date: NaiveDate,
}

impl FileRecord {
    /// Blob key for a record, `{id}/{file_name}`.
    pub fn object_key(id: &str, file_name: &str) -> String {
        format!("{}/{}", id, file_name)
    }

    /// Recover the blob key from `url` by stripping the bucket prefix.
    ///
    /// Falls back to `{id}/{file_name}` when `url` was not written under
    /// `bucket`.
    pub fn key_in_bucket(&self, bucket: &str) -> String {
        self.url
            .strip_prefix(bucket)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Self::object_key(&self.id, &self.file_name))
    }
}

/// Reduce a client-supplied filename to something safe for both a
/// filesystem path component and a URL segment.
///
/// Only the last path component survives; whitespace becomes `_`; anything
/// outside `[A-Za-z0-9._-]` is dropped; leading/trailing `.` and `_` are
/// trimmed. An empty result becomes [`FALLBACK_FILE_NAME`].
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let mut cleaned = String::with_capacity(base.len());
    for word in base.split_whitespace() {
        if !cleaned.is_empty() {
            cleaned.push('_');
        }
        cleaned.extend(
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
        );
    }

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    // ASCII only at this point, so any byte offset is a char boundary.
    let truncated = &trimmed[..trimmed.len().min(MAX_FILE_NAME_LEN)];

    if truncated.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        truncated.to_string()
    }
}
