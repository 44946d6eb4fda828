//! VeriCite - an append-only, hash-linked ledger of verified sources
//!
//! Entries are queued on submit and recorded one block at a time by a
//! proof-of-work mining step. Each block links to its predecessor by hash.
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the chain and its validation rules
//! - [`mempool`] - Submission queue
//! - [`ledger`] - Submit/mine workflow over a chain and queue
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work search
//!
//! ## Cryptography
//! - [`crypto`] - Canonical block encoding and SHA-256 hashing
//!
//! ## State Management
//! - [`persistence`] - Storage backends (JSON file, SQLite, in-memory)
//!
//! ## Service & Integration
//! - [`node`] - Thread-safe ledger service with background mining
//! - [`api`] - HTTP endpoints and explorer page
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod ledger;
pub mod mempool;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Service & Integration
// ============================================================================
pub mod node;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use blockchain::{Block, Chain, SourceEntry};
pub use error::{ChainError, Result};
pub use ledger::{Ledger, MineOutcome};
pub use mempool::SubmissionId;
pub use miner::ProofOfWork;
pub use node::Node;
