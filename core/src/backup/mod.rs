// Backup module: writing, reading, restoring and clearing

pub mod clear;
pub mod restore;
pub mod target;
pub mod writer;

pub use clear::clear_all;
pub use restore::{RestoreEngine, RestoreProgress, RestoreReport};
pub use target::{BackupSource, BackupTarget, FileLocation, MemoryLocation};
pub use writer::{backup_file_name_now, create_backup, default_backup_file_name, read_backup};
