// Message module: the SMS record model and the backup codec

pub mod codec;
pub mod types;

pub use codec::{decode, decode_record, encode, to_bytes, DecodedBackup, RecordDecodeError, CURRENT_VERSION};
pub use types::{BackupDate, BackupFile, BackupMetadata, IdentityKey, Sms, SmsType, NO_TIMESTAMP};
