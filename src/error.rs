//! MemVault error types

use thiserror::Error;

/// MemVault error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error (I/O or persistence failure)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cryptographic error (encryption or decryption failure)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Embedding or index error
    #[error("Index error: {0}")]
    Index(String),

    /// A record exists in the store but not the index, or vice versa.
    /// Reported, never silently repaired; triggers a reconciliation pass.
    #[error("Index inconsistency: {0}")]
    IndexInconsistency(String),

    /// The embedding or search step exceeded its deadline
    #[error("Retrieval timed out after {0}ms")]
    Timeout(u64),

    /// Audit entry could not be durably recorded
    #[error("Audit error: {0}")]
    Audit(String),

    /// A composed answer contained content absent from its evidence set.
    /// This is a programming defect; composition halts rather than emit
    /// unverified content.
    #[error("Non-fabrication violation: {0}")]
    Fabrication(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for MemVault operations
pub type Result<T> = std::result::Result<T, Error>;
