// Restore engine: replay decoded records into a store
//
// Records are processed in input order. A record whose identity key is
// already present is skipped. The first rejected insert aborts the whole
// restore; nothing after it is attempted.

use crate::message::Sms;
use crate::store::{MessageStore, SmsFilter};
use crate::BackupError;
use tracing::{debug, info, warn};

/// Receives `(current, total)` before each record is processed.
///
/// `current` is 1-based and is reported before the outcome of that record is
/// known.
pub trait RestoreProgress {
    fn on_progress(&mut self, current: usize, total: usize);
}

impl<F> RestoreProgress for F
where
    F: FnMut(usize, usize),
{
    fn on_progress(&mut self, current: usize, total: usize) {
        self(current, total)
    }
}

/// Outcome of a restore that ran to completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub total: usize,
    pub inserted: usize,
    /// Records already present in the store
    pub skipped: usize,
}

/// Stateless apart from the borrowed store; build one per operation
pub struct RestoreEngine<'a, S: MessageStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: MessageStore + ?Sized> RestoreEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn restore<P>(&self, messages: &[Sms], progress: &mut P) -> Result<RestoreReport, BackupError>
    where
        P: RestoreProgress + ?Sized,
    {
        if !self.store.supports_insert() {
            warn!("Restore refused: store write capability not held");
            return Err(BackupError::CapabilityDenied);
        }

        let total = messages.len();
        let mut report = RestoreReport {
            total,
            ..RestoreReport::default()
        };
        if messages.is_empty() {
            return Ok(report);
        }

        info!("Restoring {} record(s)", total);
        for (i, sms) in messages.iter().enumerate() {
            let current = i + 1;
            progress.on_progress(current, total);

            let existing = self
                .store
                .count(&SmsFilter::Identity(sms.identity_key()))?;
            if existing > 0 {
                debug!("Record {}/{} already present, skipping", current, total);
                report.skipped += 1;
                continue;
            }

            if let Err(e) = self.store.insert(sms) {
                warn!(
                    "Restore aborted at record {}/{}: {}",
                    current, total, e
                );
                return Err(BackupError::InsertFailed {
                    index: current,
                    reason: e.to_string(),
                });
            }
            report.inserted += 1;
        }

        info!(
            "Restore finished: {} inserted, {} already present",
            report.inserted, report.skipped
        );
        Ok(report)
    }
}
