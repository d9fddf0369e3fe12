// Backup service: runs engine operations off the caller's task
//
// Each operation is one sequential job on tokio's blocking pool. Restores and
// clears against the same service are serialized: the dedup check and the
// insert that follows it are not atomic as a pair.

use crate::backup::{self, BackupSource, BackupTarget, RestoreEngine, RestoreProgress, RestoreReport};
use crate::message::{BackupMetadata, DecodedBackup, Sms};
use crate::store::{thread_summaries, MessageStore, SmsFilter, StoreError, ThreadSummary};
use crate::BackupError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// One progress notification: record `current` of `total` is being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        self.current as f32 / self.total.max(1) as f32
    }
}

/// Sending half of a progress channel
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<Progress>,
}

impl RestoreProgress for ProgressSender {
    fn on_progress(&mut self, current: usize, total: usize) {
        // Receiver may have gone away; the restore carries on regardless
        let _ = self.tx.send(Progress { current, total });
    }
}

pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<Progress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, rx)
}

/// Async front end over one message store.
///
/// Restores and clears are serialized per service, and clones share that
/// serialization. Build one service per store and clone it; two services
/// created separately over the same store do not wait for each other.
#[derive(Clone)]
pub struct BackupService {
    store: Arc<dyn MessageStore>,
    /// Held for the whole blocking job, not just the awaiting future
    write_gate: Arc<Mutex<()>>,
}

impl BackupService {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> Arc<dyn MessageStore> {
        self.store.clone()
    }

    /// Total records in the store; zero when read permission is missing
    pub async fn total_count(&self) -> Result<usize, BackupError> {
        let store = self.store.clone();
        run_blocking(move || match store.count(&SmsFilter::All) {
            Ok(count) => Ok(count),
            Err(StoreError::PermissionDenied) => Ok(0),
            Err(e) => Err(e.into()),
        })
        .await
    }

    /// Per-address record counts for the thread picker
    pub async fn threads(&self) -> Result<Vec<ThreadSummary>, BackupError> {
        let store = self.store.clone();
        run_blocking(move || match store.query(&SmsFilter::All) {
            Ok(messages) => Ok(thread_summaries(&messages)),
            Err(StoreError::PermissionDenied) => {
                warn!("Read permission missing; no threads to list");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        })
        .await
    }

    pub async fn create_backup<T>(
        &self,
        filter: SmsFilter,
        target: T,
    ) -> Result<BackupMetadata, BackupError>
    where
        T: BackupTarget + 'static,
    {
        let store = self.store.clone();
        run_blocking(move || backup::create_backup(store.as_ref(), &filter, &target)).await
    }

    pub async fn read_backup<S>(&self, source: S) -> Result<DecodedBackup, BackupError>
    where
        S: BackupSource + 'static,
    {
        run_blocking(move || backup::read_backup(&source)).await
    }

    /// Restore decoded records. Waits for any other restore or clear on this
    /// service to finish first.
    pub async fn restore(
        &self,
        messages: Vec<Sms>,
        mut progress: ProgressSender,
    ) -> Result<RestoreReport, BackupError> {
        let gate = self.write_gate.clone().lock_owned().await;
        let store = self.store.clone();
        run_blocking(move || {
            let _gate = gate;
            RestoreEngine::new(store.as_ref()).restore(&messages, &mut progress)
        })
        .await
    }

    /// Read a backup from `source` and restore its valid records
    pub async fn restore_from<S>(
        &self,
        source: S,
        progress: ProgressSender,
    ) -> Result<(DecodedBackup, RestoreReport), BackupError>
    where
        S: BackupSource + 'static,
    {
        let decoded = self.read_backup(source).await?;
        let report = self.restore(decoded.messages.clone(), progress).await?;
        Ok((decoded, report))
    }

    pub async fn clear_all(&self) -> Result<usize, BackupError> {
        let gate = self.write_gate.clone().lock_owned().await;
        let store = self.store.clone();
        run_blocking(move || {
            let _gate = gate;
            backup::clear_all(store.as_ref())
        })
        .await
    }
}

async fn run_blocking<T, F>(job: F) -> Result<T, BackupError>
where
    F: FnOnce() -> Result<T, BackupError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| BackupError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemoryLocation;
    use crate::message::SmsType;
    use crate::store::MemoryMessageStore;
    use std::time::Duration;

    /// Memory store whose inserts take a while
    struct SlowStore {
        inner: MemoryMessageStore,
        delay: Duration,
    }

    impl MessageStore for SlowStore {
        fn query(&self, filter: &SmsFilter) -> Result<Vec<Sms>, StoreError> {
            self.inner.query(filter)
        }

        fn insert(&self, sms: &Sms) -> Result<(), StoreError> {
            std::thread::sleep(self.delay);
            self.inner.insert(sms)
        }

        fn delete(&self, filter: &SmsFilter) -> Result<usize, StoreError> {
            self.inner.delete(filter)
        }

        fn supports_insert(&self) -> bool {
            self.inner.supports_insert()
        }
    }

    fn many(n: i64) -> Vec<Sms> {
        (1..=n)
            .map(|i| Sms::new("A", format!("m{}", i), SmsType::Inbox).with_dates(i, i))
            .collect()
    }

    fn records() -> Vec<Sms> {
        vec![
            Sms::new("A", "one", SmsType::Inbox).with_dates(1, 1),
            Sms::new("A", "two", SmsType::Sent).with_dates(2, 2),
            Sms::new("B", "three", SmsType::Inbox).with_dates(3, 3),
        ]
    }

    #[tokio::test]
    async fn test_backup_then_restore_into_empty_store() {
        let source = BackupService::new(Arc::new(MemoryMessageStore::with_records(records())));
        let location = MemoryLocation::new();
        let meta = source
            .create_backup(SmsFilter::All, location.clone())
            .await
            .unwrap();
        assert_eq!(meta.total, 3);

        let target_store = MemoryMessageStore::new();
        let target = BackupService::new(Arc::new(target_store.clone()));
        let (tx, mut rx) = progress_channel();
        let (decoded, report) = target.restore_from(location, tx).await.unwrap();

        assert_eq!(decoded.messages.len(), 3);
        assert_eq!(report.inserted, 3);
        assert_eq!(target_store.snapshot(), records());

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push((p.current, p.total));
        }
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_concurrent_restores_do_not_double_insert() {
        let store = MemoryMessageStore::new();
        let service = BackupService::new(Arc::new(store.clone()));

        let (tx1, _rx1) = progress_channel();
        let (tx2, _rx2) = progress_channel();
        let (a, b) = tokio::join!(
            service.restore(records(), tx1),
            service.restore(records(), tx2)
        );

        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.inserted + b.inserted, 3);
        assert_eq!(a.skipped + b.skipped, 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_restore_keeps_gate_until_job_ends() {
        let inner = MemoryMessageStore::new();
        let service = BackupService::new(Arc::new(SlowStore {
            inner: inner.clone(),
            delay: Duration::from_millis(50),
        }));

        let (tx1, _rx1) = progress_channel();
        let first = tokio::time::timeout(
            Duration::from_millis(20),
            service.restore(many(5), tx1),
        )
        .await;
        assert!(first.is_err(), "first restore should still be running");

        // the abandoned job keeps inserting; this one must wait for it
        let (tx2, _rx2) = progress_channel();
        let second = service.clone().restore(many(5), tx2).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 5);
        assert_eq!(inner.len(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_clear_holds_gate() {
        let inner = MemoryMessageStore::with_records(many(3));
        let service = BackupService::new(Arc::new(SlowStore {
            inner: inner.clone(),
            delay: Duration::from_millis(50),
        }));

        let (tx1, _rx1) = progress_channel();
        let restore = tokio::time::timeout(
            Duration::from_millis(20),
            service.restore(many(6), tx1),
        )
        .await;
        assert!(restore.is_err());

        let removed = service.clear_all().await.unwrap();
        assert_eq!(removed, 6);
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_counts_without_read_permission() {
        let store = MemoryMessageStore::with_records(records());
        store.set_read_permission(false);
        let service = BackupService::new(Arc::new(store));

        assert_eq!(service.total_count().await.unwrap(), 0);
        assert!(service.threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threads_listing() {
        let service = BackupService::new(Arc::new(MemoryMessageStore::with_records(records())));
        let threads = service.threads().await.unwrap();

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].address, "A");
        assert_eq!(threads[0].count, 2);
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(Progress { current: 1, total: 4 }.fraction(), 0.25);
        assert_eq!(Progress { current: 0, total: 0 }.fraction(), 0.0);
    }
}
