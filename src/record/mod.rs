//! Memory records and their encrypted, file-backed store
//!
//! A `MemoryRecord` owns one recorded utterance or document: encrypted
//! content plus the cleartext metadata (tags, timestamp, tombstone flag)
//! that access decisions need without decryption.

mod store;
mod types;

pub use store::{ExportedRecord, RecordStore, StoreStats};
pub use types::{EncryptionMeta, MemoryRecord, RecordDraft};
