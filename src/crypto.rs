//! Hashing primitives for VeriCite
//!
//! Block hashes are SHA-256 over the *canonical encoding* of a block. The
//! encoding is a contract shared by every implementation that wants to
//! reproduce VeriCite hashes: [`HashPreimage`] declares its fields in key
//! order and is serialized compactly by `serde_json`.
//!
//! # Canonical encoding, version 1
//!
//! A compact JSON object (no insignificant whitespace, UTF-8) containing every
//! block field except `hash`, with keys in lexicographic order:
//!
//! ```text
//! {"author":..,"hash_summary":..,"index":..,"nonce":..,"previous_hash":..,"tags":[..],"timestamp":..,"url":..,"validator":..}
//! ```
//!
//! Strings use standard JSON escaping, integers are base-10.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length in characters of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// The fields that make up a block's hash preimage, declared in lexicographic
/// key order.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HashPreimage<'a> {
    pub author: &'a str,
    pub hash_summary: &'a str,
    pub index: u64,
    pub nonce: u64,
    pub previous_hash: &'a str,
    pub tags: &'a [String],
    pub timestamp: u64,
    pub url: &'a str,
    pub validator: &'a str,
}

/// Encodes a preimage with canonical encoding version 1.
pub fn canonical_bytes(preimage: &HashPreimage<'_>) -> Vec<u8> {
    // Only strings and integers; serialization cannot fail.
    serde_json::to_vec(preimage).unwrap_or_default()
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hashes a block preimage: `digest(canonical_bytes(preimage))`.
pub fn hash_preimage(preimage: &HashPreimage<'_>) -> String {
    digest(&canonical_bytes(preimage))
}

/// True when `hash` begins with at least `difficulty` `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash.len() >= needed && hash.bytes().take(needed).all(|b| b == b'0')
}
