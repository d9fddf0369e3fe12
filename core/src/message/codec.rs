// Backup codec: versioned JSON envelope with per-record decode tolerance

use super::types::{BackupDate, BackupFile, BackupMetadata, Sms};
use crate::BackupError;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Schema version written into `meta.version`
pub const CURRENT_VERSION: u32 = 1;

pub const META_KEY: &str = "meta";
pub const DATA_KEY: &str = "data";

/// One payload entry that could not be decoded.
///
/// Collected by `decode` and never raised: the entry is skipped and decoding
/// moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entry {index}: {reason}")]
pub struct RecordDecodeError {
    /// Zero-based position of the entry in `data`
    pub index: usize,
    pub reason: String,
}

/// Result of decoding a backup file
#[derive(Debug, Clone, Default)]
pub struct DecodedBackup {
    /// `None` when the file carries no usable `meta` object
    pub metadata: Option<BackupMetadata>,
    /// Valid records, in file order
    pub messages: Vec<Sms>,
    /// Skipped entries
    pub errors: Vec<RecordDecodeError>,
}

impl DecodedBackup {
    /// True when `meta.total` disagrees with the number of entries seen.
    /// Third-party producers are not required to keep them in sync.
    pub fn total_mismatch(&self) -> bool {
        match &self.metadata {
            Some(meta) => meta.total != self.messages.len() + self.errors.len(),
            None => false,
        }
    }
}

/// Build a backup file for `messages`, keeping their order.
/// No dedup happens here.
pub fn encode(messages: Vec<Sms>, now_millis: i64) -> BackupFile {
    BackupFile {
        meta: BackupMetadata {
            date: BackupDate::Millis(now_millis),
            version: CURRENT_VERSION,
            total: messages.len(),
        },
        data: messages,
    }
}

/// Serialize a backup file as UTF-8 JSON, indented by two spaces
pub fn to_bytes(file: &BackupFile) -> Result<Vec<u8>, BackupError> {
    serde_json::to_vec_pretty(file).map_err(|e| BackupError::Encode(e.to_string()))
}

/// Decode a single payload entry
pub fn decode_record(index: usize, entry: Value) -> Result<Sms, RecordDecodeError> {
    serde_json::from_value(entry).map_err(|e| RecordDecodeError {
        index,
        reason: e.to_string(),
    })
}

/// Parse a backup file.
///
/// Fails only when the bytes are not a JSON object, when neither `meta` nor
/// a `data` array can be found, or when `meta.version` is newer than
/// `CURRENT_VERSION`. With `meta` present, a missing or non-array `data` is an
/// empty payload. Malformed payload entries are reported in
/// `DecodedBackup::errors` and skipped.
pub fn decode(bytes: &[u8]) -> Result<DecodedBackup, BackupError> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|e| BackupError::Envelope(e.to_string()))?;
    let Value::Object(mut root) = root else {
        return Err(BackupError::Envelope("backup root is not an object".into()));
    };

    let meta = root.remove(META_KEY);
    let data = root.remove(DATA_KEY);
    if meta.is_none() && data.is_none() {
        return Err(BackupError::Envelope(format!(
            "neither `{}` nor `{}` present",
            META_KEY, DATA_KEY
        )));
    }

    let has_meta = meta.is_some();
    let metadata = match meta {
        Some(meta) => decode_metadata(meta)?,
        None => None,
    };

    let entries = match data {
        Some(Value::Array(entries)) => entries,
        Some(_) if has_meta => {
            warn!("Backup `{}` is not an array; nothing to restore", DATA_KEY);
            Vec::new()
        }
        Some(_) => {
            return Err(BackupError::Envelope(format!("`{}` is not an array", DATA_KEY)));
        }
        None => Vec::new(),
    };

    let mut decoded = DecodedBackup {
        metadata,
        messages: Vec::with_capacity(entries.len()),
        errors: Vec::new(),
    };

    for (index, entry) in entries.into_iter().enumerate() {
        match decode_record(index, entry) {
            Ok(sms) => decoded.messages.push(sms),
            Err(e) => {
                warn!("Skipping malformed backup entry {}: {}", e.index, e.reason);
                decoded.errors.push(e);
            }
        }
    }

    if decoded.total_mismatch() {
        warn!(
            "Backup meta.total does not match payload length ({} entries)",
            decoded.messages.len() + decoded.errors.len()
        );
    }

    Ok(decoded)
}

/// Version gate first, then best-effort parse of the rest of `meta`.
/// A missing version counts as the current one.
fn decode_metadata(meta: Value) -> Result<Option<BackupMetadata>, BackupError> {
    if let Some(found) = meta.get("version").and_then(Value::as_u64) {
        if found > u64::from(CURRENT_VERSION) {
            return Err(BackupError::UnsupportedVersion {
                found,
                supported: CURRENT_VERSION,
            });
        }
    }

    match serde_json::from_value::<BackupMetadata>(meta) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) => {
            warn!("Ignoring unreadable backup metadata: {}", e);
            Ok(None)
        }
    }
}
