// Destructive "delete everything" operation

use crate::store::{MessageStore, SmsFilter};
use crate::BackupError;
use tracing::{info, warn};

/// Remove every record from the store. Needs the same write capability as
/// a restore.
pub fn clear_all<S: MessageStore + ?Sized>(store: &S) -> Result<usize, BackupError> {
    if !store.supports_insert() {
        warn!("Clear refused: store write capability not held");
        return Err(BackupError::CapabilityDenied);
    }
    let removed = store.delete(&SmsFilter::All)?;
    info!("Cleared {} record(s)", removed);
    Ok(removed)
}
