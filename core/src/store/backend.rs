// Message store adapter: the platform message store seen through one trait
//
// Backends: in-memory (tests, dry runs) and sled (persistent, used by the CLI).

use crate::message::{IdentityKey, Sms};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const SMS_TREE: &str = "sms";
const IDENTITY_TREE: &str = "sms_identity";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Read permission not granted")]
    PermissionDenied,
    #[error("Store rejected the write: {0}")]
    Rejected(String),
    #[error("Storage error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which records a query or delete applies to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SmsFilter {
    /// Every record in the store
    #[default]
    All,
    /// Records whose address is in the set
    Addresses(BTreeSet<String>),
    /// Records sharing this identity key
    Identity(IdentityKey),
}

impl SmsFilter {
    pub fn addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SmsFilter::Addresses(addresses.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, sms: &Sms) -> bool {
        match self {
            SmsFilter::All => true,
            SmsFilter::Addresses(addresses) => addresses.contains(&sms.address),
            SmsFilter::Identity(key) => key.matches(sms),
        }
    }
}

/// Access to the device's message store.
///
/// `supports_insert` reflects whether the caller currently holds the write
/// capability (the default-handler role). Writers must check it before any
/// insert.
#[cfg_attr(test, mockall::automock)]
pub trait MessageStore: Send + Sync {
    /// All records matching `filter`, in a stable order
    fn query(&self, filter: &SmsFilter) -> Result<Vec<Sms>, StoreError>;

    fn insert(&self, sms: &Sms) -> Result<(), StoreError>;

    /// Remove matching records, returning how many were removed
    fn delete(&self, filter: &SmsFilter) -> Result<usize, StoreError>;

    fn supports_insert(&self) -> bool;

    fn count(&self, filter: &SmsFilter) -> Result<usize, StoreError> {
        Ok(self.query(filter)?.len())
    }
}

/// Values a real SMS provider refuses to store
pub fn validate(sms: &Sms) -> Result<(), StoreError> {
    if sms.address.trim().is_empty() {
        return Err(StoreError::Rejected("empty address".into()));
    }
    if sms.read > 1 {
        return Err(StoreError::Rejected(format!("read flag {} out of range", sms.read)));
    }
    if sms.seen > 1 {
        return Err(StoreError::Rejected(format!("seen flag {} out of range", sms.seen)));
    }
    Ok(())
}

/// In-memory message store
#[derive(Clone)]
pub struct MemoryMessageStore {
    records: Arc<RwLock<Vec<Sms>>>,
    insert_capability: Arc<AtomicBool>,
    read_permission: Arc<AtomicBool>,
}

impl MemoryMessageStore {
    /// Empty store, readable and writable
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<Sms>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            insert_capability: Arc::new(AtomicBool::new(true)),
            read_permission: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_insert_capability(&self, granted: bool) {
        self.insert_capability.store(granted, Ordering::SeqCst);
    }

    pub fn set_read_permission(&self, granted: bool) {
        self.read_permission.store(granted, Ordering::SeqCst);
    }

    /// Copy of every record, ignoring read permission
    pub fn snapshot(&self) -> Vec<Sms> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for MemoryMessageStore {
    fn query(&self, filter: &SmsFilter) -> Result<Vec<Sms>, StoreError> {
        if !self.read_permission.load(Ordering::SeqCst) {
            return Err(StoreError::PermissionDenied);
        }
        Ok(self
            .records
            .read()
            .iter()
            .filter(|sms| filter.matches(sms))
            .cloned()
            .collect())
    }

    fn insert(&self, sms: &Sms) -> Result<(), StoreError> {
        if !self.supports_insert() {
            return Err(StoreError::Rejected("insert capability not held".into()));
        }
        validate(sms)?;
        self.records.write().push(sms.clone());
        Ok(())
    }

    fn delete(&self, filter: &SmsFilter) -> Result<usize, StoreError> {
        if !self.supports_insert() {
            return Err(StoreError::Rejected("delete capability not held".into()));
        }
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|sms| !filter.matches(sms));
        Ok(before - records.len())
    }

    fn supports_insert(&self) -> bool {
        self.insert_capability.load(Ordering::SeqCst)
    }
}

/// Persistent sled-backed message store.
///
/// Records are JSON values keyed by a monotonically increasing id, so a scan
/// returns them in insertion order. A second tree indexes record keys by
/// identity key; identity lookups are prefix scans over it.
pub struct SledMessageStore {
    db: sled::Db,
    records: sled::Tree,
    identities: sled::Tree,
    insert_capability: bool,
    read_permission: bool,
}

/// Index prefix for an identity key. The JSON array closes with `]`, so no
/// encoded key is a prefix of a different one.
fn identity_prefix(key: &IdentityKey) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&(&key.address, key.sent_at, key.received_at, key.kind.value()))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn index_key(sms: &Sms, record_key: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut key = identity_prefix(&sms.identity_key())?;
    key.extend_from_slice(record_key);
    Ok(key)
}

impl SledMessageStore {
    /// Open or create a store at `path`, readable but not writable
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let records = db
            .open_tree(SMS_TREE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let identities = db
            .open_tree(IDENTITY_TREE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let store = Self {
            db,
            records,
            identities,
            insert_capability: false,
            read_permission: true,
        };
        if store.identities.len() != store.records.len() {
            store.rebuild_index()?;
        }
        Ok(store)
    }

    pub fn with_insert_capability(mut self, granted: bool) -> Self {
        self.insert_capability = granted;
        self
    }

    pub fn with_read_permission(mut self, granted: bool) -> Self {
        self.read_permission = granted;
        self
    }

    /// Recreate the identity index from the record tree
    fn rebuild_index(&self) -> Result<(), StoreError> {
        self.identities
            .clear()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut indexed = 0usize;
        for item in self.records.iter() {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            let sms: Sms = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.identities
                .insert(index_key(&sms, &key)?, key)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            indexed += 1;
        }
        self.flush()?;
        debug!("Rebuilt identity index over {} record(s)", indexed);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(sled::IVec, Sms)>, StoreError> {
        if !self.read_permission {
            return Err(StoreError::PermissionDenied);
        }
        let mut records = Vec::new();
        for item in self.records.iter() {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            let sms: Sms = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            records.push((key, sms));
        }
        Ok(records)
    }

    /// Records sharing `key`, found through the identity index
    fn lookup(&self, key: &IdentityKey) -> Result<Vec<(sled::IVec, Sms)>, StoreError> {
        if !self.read_permission {
            return Err(StoreError::PermissionDenied);
        }
        let mut records = Vec::new();
        for item in self.identities.scan_prefix(identity_prefix(key)?) {
            let (_, record_key) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            let Some(value) = self
                .records
                .get(&record_key)
                .map_err(|e| StoreError::Backend(e.to_string()))?
            else {
                continue;
            };
            let sms: Sms = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            records.push((record_key, sms));
        }
        Ok(records)
    }

    fn matching(&self, filter: &SmsFilter) -> Result<Vec<(sled::IVec, Sms)>, StoreError> {
        match filter {
            SmsFilter::Identity(key) => self.lookup(key),
            _ => Ok(self
                .scan()?
                .into_iter()
                .filter(|(_, sms)| filter.matches(sms))
                .collect()),
        }
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

impl MessageStore for SledMessageStore {
    fn query(&self, filter: &SmsFilter) -> Result<Vec<Sms>, StoreError> {
        Ok(self.matching(filter)?.into_iter().map(|(_, sms)| sms).collect())
    }

    fn insert(&self, sms: &Sms) -> Result<(), StoreError> {
        if !self.insert_capability {
            return Err(StoreError::Rejected("insert capability not held".into()));
        }
        validate(sms)?;

        let id = self
            .db
            .generate_id()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let key = format!("sms_{:020}", id);
        let value =
            serde_json::to_vec(sms).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.records
            .insert(key.as_bytes(), value)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.identities
            .insert(index_key(sms, key.as_bytes())?, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.flush()?;
        debug!("Stored sms {} from {}", key, sms.address);
        Ok(())
    }

    fn delete(&self, filter: &SmsFilter) -> Result<usize, StoreError> {
        if !self.insert_capability {
            return Err(StoreError::Rejected("delete capability not held".into()));
        }

        let mut removed = 0usize;
        for (key, sms) in self.matching(filter)? {
            self.identities
                .remove(index_key(&sms, &key)?)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            self.records
                .remove(&key)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            removed += 1;
        }
        self.flush()?;
        Ok(removed)
    }

    fn supports_insert(&self) -> bool {
        self.insert_capability
    }

    fn count(&self, filter: &SmsFilter) -> Result<usize, StoreError> {
        if matches!(filter, SmsFilter::All) && self.read_permission {
            return Ok(self.records.len());
        }
        Ok(self.matching(filter)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SmsType;

    fn sms(address: &str, at: i64) -> Sms {
        Sms::new(address, "body", SmsType::Inbox).with_dates(at, at)
    }

    #[test]
    fn test_filter_matches() {
        let a = sms("A", 1);
        let b = sms("B", 1);

        let by_address = SmsFilter::addresses(["A"]);
        assert!(by_address.matches(&a));
        assert!(!by_address.matches(&b));

        let by_identity = SmsFilter::Identity(a.identity_key());
        assert!(by_identity.matches(&a));
        assert!(!by_identity.matches(&b));

        assert!(SmsFilter::All.matches(&b));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(validate(&sms("A", 1)).is_ok());
        assert!(validate(&sms("  ", 1)).is_err());

        let mut bad_flag = sms("A", 1);
        bad_flag.read = 3;
        assert!(matches!(validate(&bad_flag), Err(StoreError::Rejected(_))));
    }

    #[test]
    fn test_memory_store_query_and_delete() {
        let store = MemoryMessageStore::with_records(vec![sms("A", 1), sms("B", 2), sms("A", 3)]);

        assert_eq!(store.query(&SmsFilter::addresses(["A"])).unwrap().len(), 2);
        assert_eq!(store.count(&SmsFilter::All).unwrap(), 3);

        assert_eq!(store.delete(&SmsFilter::addresses(["A"])).unwrap(), 2);
        assert_eq!(store.snapshot(), vec![sms("B", 2)]);
    }

    #[test]
    fn test_memory_store_without_capability() {
        let store = MemoryMessageStore::new();
        store.set_insert_capability(false);

        assert!(!store.supports_insert());
        assert!(store.insert(&sms("A", 1)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_without_read_permission() {
        let store = MemoryMessageStore::with_records(vec![sms("A", 1)]);
        store.set_read_permission(false);

        assert_eq!(store.query(&SmsFilter::All), Err(StoreError::PermissionDenied));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sled_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledMessageStore::open(dir.path().join("store"))
            .unwrap()
            .with_insert_capability(true);

        store.insert(&sms("A", 1)).unwrap();
        store.insert(&sms("B", 2)).unwrap();
        store.insert(&sms("A", 3)).unwrap();

        // insertion order survives the scan
        let all = store.query(&SmsFilter::All).unwrap();
        assert_eq!(all, vec![sms("A", 1), sms("B", 2), sms("A", 3)]);
        assert_eq!(store.count(&SmsFilter::All).unwrap(), 3);

        let key = sms("B", 2).identity_key();
        assert_eq!(store.count(&SmsFilter::Identity(key)).unwrap(), 1);

        assert_eq!(store.delete(&SmsFilter::All).unwrap(), 3);
        assert_eq!(store.count(&SmsFilter::All).unwrap(), 0);
    }

    #[test]
    fn test_sled_store_read_only_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledMessageStore::open(dir.path().join("store")).unwrap();

        assert!(!store.supports_insert());
        assert!(store.insert(&sms("A", 1)).is_err());
        assert!(store.delete(&SmsFilter::All).is_err());
    }

    #[test]
    fn test_sled_identity_index_ignores_body_and_near_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledMessageStore::open(dir.path().join("store"))
            .unwrap()
            .with_insert_capability(true);

        let original = sms("A", 10);
        let mut edited = original.clone();
        edited.body = "different text".into();
        store.insert(&original).unwrap();
        store.insert(&sms("AB", 10)).unwrap();
        store.insert(&sms("A", 100)).unwrap();

        let found = store.query(&SmsFilter::Identity(edited.identity_key())).unwrap();
        assert_eq!(found, vec![original.clone()]);

        assert_eq!(store.delete(&SmsFilter::Identity(original.identity_key())).unwrap(), 1);
        assert_eq!(store.count(&SmsFilter::Identity(original.identity_key())).unwrap(), 0);
        assert_eq!(store.count(&SmsFilter::All).unwrap(), 2);
    }

    #[test]
    fn test_sled_index_rebuilt_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        {
            let store = SledMessageStore::open(&path).unwrap().with_insert_capability(true);
            store.insert(&sms("A", 1)).unwrap();
            store.insert(&sms("B", 2)).unwrap();
            store.identities.clear().unwrap();
            store.db.flush().unwrap();
        }

        let store = SledMessageStore::open(&path).unwrap();
        assert_eq!(store.count(&SmsFilter::Identity(sms("B", 2).identity_key())).unwrap(), 1);
    }
}
