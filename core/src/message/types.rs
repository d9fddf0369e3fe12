// Message types: one SMS record and the envelope metadata of a backup file

use serde::{Deserialize, Serialize};

/// Timestamp value used when the store has no date for a record
pub const NO_TIMESTAMP: i64 = -1;

/// Box the record lives in on the device.
///
/// Persisted as an integer (0..=6). Integers outside that range decode to
/// `SmsType::None` rather than failing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SmsType {
    #[default]
    None,
    Inbox,
    Sent,
    Draft,
    Outbox,
    Failed,
    Queued,
}

impl SmsType {
    pub fn value(self) -> i64 {
        match self {
            SmsType::None => 0,
            SmsType::Inbox => 1,
            SmsType::Sent => 2,
            SmsType::Draft => 3,
            SmsType::Outbox => 4,
            SmsType::Failed => 5,
            SmsType::Queued => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SmsType::None => "none",
            SmsType::Inbox => "inbox",
            SmsType::Sent => "sent",
            SmsType::Draft => "draft",
            SmsType::Outbox => "outbox",
            SmsType::Failed => "failed",
            SmsType::Queued => "queued",
        }
    }
}

impl From<i64> for SmsType {
    fn from(value: i64) -> Self {
        match value {
            1 => SmsType::Inbox,
            2 => SmsType::Sent,
            3 => SmsType::Draft,
            4 => SmsType::Outbox,
            5 => SmsType::Failed,
            6 => SmsType::Queued,
            _ => SmsType::None,
        }
    }
}

impl From<SmsType> for i64 {
    fn from(kind: SmsType) -> Self {
        kind.value()
    }
}

/// A single SMS as read from the store or decoded from a backup.
///
/// Field names on the wire follow the backup format: `date` is the time the
/// record landed on the device, `dateSent` the time the sender sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sms {
    /// Conversation address (phone number or short code)
    pub address: String,
    /// Message text, may be empty
    pub body: String,
    /// Received timestamp (epoch millis), `NO_TIMESTAMP` when unknown
    #[serde(rename = "date")]
    pub received_at: i64,
    /// Sent timestamp (epoch millis), `NO_TIMESTAMP` when unknown
    #[serde(rename = "dateSent")]
    pub sent_at: i64,
    /// 0 = unread, 1 = read
    pub read: u8,
    /// 0 = not yet seen, 1 = seen
    pub seen: u8,
    #[serde(rename = "type")]
    pub kind: SmsType,
}

impl Sms {
    pub fn new(address: impl Into<String>, body: impl Into<String>, kind: SmsType) -> Self {
        Self {
            address: address.into(),
            body: body.into(),
            received_at: NO_TIMESTAMP,
            sent_at: NO_TIMESTAMP,
            read: 0,
            seen: 0,
            kind,
        }
    }

    pub fn with_dates(mut self, received_at: i64, sent_at: i64) -> Self {
        self.received_at = received_at;
        self.sent_at = sent_at;
        self
    }

    pub fn with_flags(mut self, read: bool, seen: bool) -> Self {
        self.read = u8::from(read);
        self.seen = u8::from(seen);
        self
    }

    /// Key used to decide whether a restored record is already in the store.
    /// The body is deliberately not part of it.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            address: self.address.clone(),
            sent_at: self.sent_at,
            received_at: self.received_at,
            kind: self.kind,
        }
    }
}

/// `(address, sentAt, receivedAt, type)`: two records with equal keys are the
/// same message regardless of body text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub address: String,
    pub sent_at: i64,
    pub received_at: i64,
    pub kind: SmsType,
}

impl IdentityKey {
    pub fn matches(&self, sms: &Sms) -> bool {
        self.address == sms.address
            && self.sent_at == sms.sent_at
            && self.received_at == sms.received_at
            && self.kind == sms.kind
    }
}

/// Creation date stored in `meta.date`.
///
/// This crate writes epoch millis; other producers have written a formatted
/// date string, which is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackupDate {
    Millis(i64),
    Text(String),
}

/// The `meta` object of a backup file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub date: BackupDate,
    /// Schema the payload was written with
    pub version: u32,
    /// Number of entries in `data` at write time
    pub total: usize,
}

/// A complete backup file: envelope metadata plus the ordered payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub meta: BackupMetadata,
    pub data: Vec<Sms>,
}
