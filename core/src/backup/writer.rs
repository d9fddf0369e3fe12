// Backup writer: store read -> encode -> sink
//
// The sink is opened only after the store read succeeds and is dropped on
// every return path. Success is reported after the final flush.

use super::target::{BackupSource, BackupTarget};
use crate::message::{self, BackupMetadata, DecodedBackup};
use crate::store::{MessageStore, SmsFilter, StoreError};
use crate::BackupError;
use chrono::{DateTime, Local, TimeZone, Utc};
use std::io::{BufWriter, Read, Write};
use tracing::{info, warn};

/// File name suggested for a new backup, e.g. `sms-backup-20240101093000.backup`
pub fn default_backup_file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("sms-backup-{}.backup", now.format("%Y%m%d%H%M%S"))
}

/// Same as `default_backup_file_name` for the current local time
pub fn backup_file_name_now() -> String {
    default_backup_file_name(&Local::now())
}

/// Write every record matching `filter` into `target`.
///
/// A store without read permission is treated as holding zero records.
pub fn create_backup<S, T>(
    store: &S,
    filter: &SmsFilter,
    target: &T,
) -> Result<BackupMetadata, BackupError>
where
    S: MessageStore + ?Sized,
    T: BackupTarget + ?Sized,
{
    let messages = match store.query(filter) {
        Ok(messages) => messages,
        Err(StoreError::PermissionDenied) => {
            warn!("Read permission missing; backing up zero records");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    let file = message::encode(messages, Utc::now().timestamp_millis());

    let mut writer = BufWriter::new(target.open_writer()?);
    serde_json::to_writer_pretty(&mut writer, &file).map_err(|e| {
        if e.is_io() {
            BackupError::Io(e.into())
        } else {
            BackupError::Encode(e.to_string())
        }
    })?;
    writer.flush()?;

    info!("Backup written: {} record(s)", file.meta.total);
    Ok(file.meta)
}

/// Read and decode a backup from `source`
pub fn read_backup<S>(source: &S) -> Result<DecodedBackup, BackupError>
where
    S: BackupSource + ?Sized,
{
    let mut bytes = Vec::new();
    {
        let mut reader = source.open_reader()?;
        reader.read_to_end(&mut bytes)?;
    }

    let decoded = message::decode(&bytes)?;
    info!(
        "Backup read: {} record(s), {} skipped",
        decoded.messages.len(),
        decoded.errors.len()
    );
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::target::MemoryLocation;
    use crate::message::{Sms, SmsType, CURRENT_VERSION};
    use crate::store::MemoryMessageStore;
    use std::io;

    struct UnopenableTarget;

    impl BackupTarget for UnopenableTarget {
        fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "no access"))
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "interrupted"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct InterruptedTarget;

    impl BackupTarget for InterruptedTarget {
        fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
            Ok(Box::new(BrokenPipe))
        }
    }

    fn store() -> MemoryMessageStore {
        MemoryMessageStore::with_records(vec![
            Sms::new("A", "one", SmsType::Inbox).with_dates(1, 1),
            Sms::new("A", "two", SmsType::Sent).with_dates(2, 2),
            Sms::new("B", "three", SmsType::Inbox).with_dates(3, 3),
        ])
    }

    #[test]
    fn test_backup_of_selected_threads() {
        let target = MemoryLocation::new();
        let meta = create_backup(&store(), &SmsFilter::addresses(["A"]), &target).unwrap();

        assert_eq!(meta.total, 2);
        assert_eq!(meta.version, CURRENT_VERSION);

        let decoded = read_backup(&target).unwrap();
        assert_eq!(decoded.messages.len(), 2);
        assert!(decoded.messages.iter().all(|s| s.address == "A"));
    }

    #[test]
    fn test_backup_without_read_permission_is_empty() {
        let store = store();
        store.set_read_permission(false);
        let target = MemoryLocation::new();

        let meta = create_backup(&store, &SmsFilter::All, &target).unwrap();
        assert_eq!(meta.total, 0);
        assert!(read_backup(&target).unwrap().messages.is_empty());
    }

    #[test]
    fn test_unopenable_target_fails() {
        let result = create_backup(&store(), &SmsFilter::All, &UnopenableTarget);
        assert!(matches!(result, Err(BackupError::Io(_))));
    }

    #[test]
    fn test_interrupted_write_fails() {
        let result = create_backup(&store(), &SmsFilter::All, &InterruptedTarget);
        assert!(matches!(result, Err(BackupError::Io(_))));
    }

    #[test]
    fn test_default_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(default_backup_file_name(&at), "sms-backup-20240102030405.backup");
    }
}
