// SMS Backup Core: backup/restore data engine
//
// Store -> (threads) -> writer -> codec -> file
// File -> codec -> restore engine -> store

pub mod backup;
pub mod message;
pub mod service;
pub mod store;

use thiserror::Error;

pub use backup::{
    clear_all, create_backup, read_backup, BackupSource, BackupTarget, FileLocation,
    MemoryLocation, RestoreEngine, RestoreProgress, RestoreReport,
};
pub use message::{
    BackupDate, BackupFile, BackupMetadata, DecodedBackup, IdentityKey, RecordDecodeError, Sms,
    SmsType, CURRENT_VERSION,
};
pub use service::{progress_channel, BackupService, Progress, ProgressSender};
pub use store::{
    group_by_thread, thread_sizes, thread_summaries, MemoryMessageStore, MessageStore,
    SledMessageStore, SmsFilter, StoreError, ThreadSelection, ThreadSummary,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Operation-level failure of a backup, restore or clear.
///
/// Record-level decode problems never show up here; they are collected in
/// `DecodedBackup::errors`.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Write capability for the message store is not held")]
    CapabilityDenied,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid backup envelope: {0}")]
    Envelope(String),
    #[error("Unsupported backup version {found} (newest supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },
    #[error("Failed to encode backup: {0}")]
    Encode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Record {index} rejected by the store: {reason}")]
    InsertFailed { index: usize, reason: String },
    #[error("Background task failed: {0}")]
    Task(String),
}
