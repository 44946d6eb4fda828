//! Proof-of-work search
//!
//! A block is accepted once its hex hash starts with `difficulty` `'0'`
//! characters. The search walks nonces upward from 0 on the calling thread;
//! callers that need to stop it pass a cancellation flag and/or an attempt
//! bound.

use crate::blockchain::Block;
use crate::crypto::{meets_difficulty, DIGEST_HEX_LEN};
use crate::error::{ChainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub const DEFAULT_DIFFICULTY: u32 = 3;

/// How many hashes are tried between checks of the cancellation flag.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: u32,
    max_attempts: Option<u64>,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Self {
        Self {
            difficulty,
            max_attempts: None,
        }
    }

    /// Caps the number of hashes a single search may compute.
    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn max_attempts(&self) -> Option<u64> {
        self.max_attempts
    }

    /// True when the block's stored hash is genuine and meets the difficulty.
    pub fn verify(&self, block: &Block) -> bool {
        meets_difficulty(&block.hash, self.difficulty) && block.has_valid_hash()
    }

    /// Uncancellable [`ProofOfWork::search`].
    pub fn solve(&self, block: &mut Block) -> Result<String> {
        self.search(block, &AtomicBool::new(false))
    }

    /// Finds a nonce for `block`, leaving the winning nonce and hash set on it
    /// and returning the hash.
    ///
    /// Fails with [`ChainError::MiningCancelled`] once `cancel` is observed set,
    /// and with [`ChainError::MiningExhausted`] when the attempt bound or the
    /// nonce space runs out. The block is left holding the last nonce tried.
    pub fn search(&self, block: &mut Block, cancel: &AtomicBool) -> Result<String> {
        if self.difficulty as usize > DIGEST_HEX_LEN {
            return Err(ChainError::Config(format!(
                "difficulty {} exceeds digest length {}",
                self.difficulty, DIGEST_HEX_LEN
            )));
        }

        let mut nonce: u64 = 0;
        let mut attempts: u64 = 0;
        loop {
            if self.max_attempts.is_some_and(|max| attempts >= max) {
                debug!(index = block.index, attempts, "search exhausted attempt bound");
                return Err(ChainError::MiningExhausted { attempts });
            }
            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                debug!(index = block.index, attempts, "search cancelled");
                return Err(ChainError::MiningCancelled);
            }

            attempts += 1;
            if meets_difficulty(block.set_nonce(nonce), self.difficulty) {
                debug!(index = block.index, nonce, attempts, "proof found");
                return Ok(block.hash.clone());
            }

            nonce = nonce
                .checked_add(1)
                .ok_or(ChainError::MiningExhausted { attempts })?;
        }
    }
}
