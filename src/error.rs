//! Error types for VeriCite

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Chain linkage error: expected previous hash {expected}, got {found}")]
    ChainLinkage { expected: String, found: String },

    #[error("Proof rejected: {proof} does not have {difficulty} leading zeros")]
    ProofRejected { difficulty: u32, proof: String },

    #[error("Hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch { claimed: String, computed: String },

    #[error("Invalid block index: expected {expected}, got {found}")]
    InvalidIndex { expected: u64, found: u64 },

    #[error("Corrupt chain at block #{index}: {reason}")]
    CorruptChain { index: u64, reason: String },

    #[error("Chain has no blocks")]
    EmptyChain,

    #[error("Mining cancelled")]
    MiningCancelled,

    #[error("Mining gave up after {attempts} attempts")]
    MiningExhausted { attempts: u64 },

    #[error("Mining worker failed: {0}")]
    Worker(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChainError {
    /// Whether this error comes from one of the candidate checks run before an
    /// append, as opposed to a storage or runtime failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ChainError::ChainLinkage { .. }
                | ChainError::ProofRejected { .. }
                | ChainError::HashMismatch { .. }
                | ChainError::InvalidIndex { .. }
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
