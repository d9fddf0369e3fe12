// Store module: message store adapter and thread aggregation

pub mod backend;
pub mod threads;

pub use backend::{validate, MemoryMessageStore, MessageStore, SledMessageStore, SmsFilter, StoreError};
pub use threads::{group_by_thread, thread_sizes, thread_summaries, ThreadSelection, ThreadSummary};
