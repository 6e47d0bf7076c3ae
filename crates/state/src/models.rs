//! On-disk schema of the state file.
//!
//! Two layouts exist in the wild. The current one keys records by filename:
//!
//! ```json
//! {
//!   "version": 2,
//!   "card_id": "OM SYSTEM",
//!   "last_run": "2025-06-01T10:00:00Z",
//!   "processed_files": {
//!     "P6010001.ORF": { "filename": "P6010001.ORF", "processed_at": "...", "profile_used": "Vivid" }
//!   }
//! }
//! ```
//!
//! The legacy one kept a flat list, plus a "last processed" marker that is no
//! longer meaningful:
//!
//! ```json
//! {
//!   "last_processed_file": "P6010001.ORF",
//!   "last_processed_timestamp": "2025-06-01T10:00:00Z",
//!   "processed_files": [{ "filename": "P6010001.ORF", "processed_at": "...", "profile_used": "Vivid" }]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Format version written by this crate.
pub const FORMAT_VERSION: u32 = 2;

/// A file that has already been handled in a previous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub filename: String,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
    /// Label of the conversion profile, or `jpg-only` for straight uploads.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile_used: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_run: Option<OffsetDateTime>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processed_files: BTreeMap<String, ProcessedRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LegacyDocument {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_processed_timestamp: Option<OffsetDateTime>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processed_files: Vec<ProcessedRecord>,
}

impl From<LegacyDocument> for Document {
    fn from(legacy: LegacyDocument) -> Self {
        // Later duplicates win, same as replaying the list as upserts.
        let processed_files = legacy.processed_files.into_iter().map(|r| (r.filename.clone(), r)).collect();
        Self {
            version: FORMAT_VERSION,
            card_id: None,
            last_run: legacy.last_processed_timestamp,
            processed_files,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Older writers stored "never" as the zero timestamp rather than omitting it.
pub(crate) fn unset_if_zero(at: Option<OffsetDateTime>) -> Option<OffsetDateTime> {
    at.filter(|t| t.year() > 1)
}
