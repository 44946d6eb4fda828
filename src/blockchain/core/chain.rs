use crate::blockchain::core::validation::{check_candidate, verify_chain};
use crate::crypto::{hash_preimage, HashPreimage};
use crate::error::{ChainError, Result};
use crate::persistence::Persistence;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Genesis timestamp (2023-01-01T00:00:00Z, in milliseconds).
pub const GENESIS_TIMESTAMP: u64 = 1672531200000;
pub const GENESIS_HASH_SUMMARY: &str = "Genesis";
pub const GENESIS_AUTHORITY: &str = "System";

/// A verified source waiting to be recorded, or the payload of a recorded block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    pub hash_summary: String,
    pub author: String,
    pub validator: String,
    pub tags: Vec<String>,
}

impl SourceEntry {
    pub fn new(
        url: impl Into<String>,
        hash_summary: impl Into<String>,
        author: impl Into<String>,
        validator: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            url: url.into(),
            hash_summary: hash_summary.into(),
            author: author.into(),
            validator: validator.into(),
            tags,
        }
    }
}

/// One ledger record. The persisted form is this struct as a flat record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub url: String,
    pub hash_summary: String,
    pub author: String,
    pub validator: String,
    pub tags: Vec<String>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Builds a block from its contents and computes its hash.
    pub fn seal(
        index: u64,
        timestamp: u64,
        entry: SourceEntry,
        previous_hash: impl Into<String>,
        nonce: u64,
    ) -> Self {
        let SourceEntry {
            url,
            hash_summary,
            author,
            validator,
            tags,
        } = entry;

        let mut block = Block {
            index,
            timestamp,
            url,
            hash_summary,
            author,
            validator,
            tags,
            previous_hash: previous_hash.into(),
            nonce,
            hash: String::new(),
        };
        block.hash = block.recompute_hash();
        block
    }

    /// A candidate block stamped with the current time and nonce 0.
    pub fn new(index: u64, previous_hash: impl Into<String>, entry: SourceEntry) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::seal(index, timestamp, entry, previous_hash, 0)
    }

    /// The fixed first block of every chain.
    pub fn genesis() -> Self {
        let entry = SourceEntry::new(
            "",
            GENESIS_HASH_SUMMARY,
            GENESIS_AUTHORITY,
            GENESIS_AUTHORITY,
            Vec::new(),
        );
        Self::seal(0, GENESIS_TIMESTAMP, entry, GENESIS_PREVIOUS_HASH, 0)
    }

    pub fn preimage(&self) -> HashPreimage<'_> {
        HashPreimage {
            author: &self.author,
            hash_summary: &self.hash_summary,
            index: self.index,
            nonce: self.nonce,
            previous_hash: &self.previous_hash,
            tags: &self.tags,
            timestamp: self.timestamp,
            url: &self.url,
            validator: &self.validator,
        }
    }

    /// Hash of the current field values; ignores the stored `hash`.
    pub fn recompute_hash(&self) -> String {
        hash_preimage(&self.preimage())
    }

    /// Sets the nonce and reseals the block.
    pub fn set_nonce(&mut self, nonce: u64) -> &str {
        self.nonce = nonce;
        self.hash = self.recompute_hash();
        &self.hash
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.recompute_hash()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn entry(&self) -> SourceEntry {
        SourceEntry {
            url: self.url.clone(),
            hash_summary: self.hash_summary.clone(),
            author: self.author.clone(),
            validator: self.validator.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Ordered, append-only sequence of blocks starting at genesis.
pub struct Chain {
    blocks: Vec<Block>,
    difficulty: u32,
    persistence: Box<dyn Persistence>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.blocks.len())
            .field("difficulty", &self.difficulty)
            .field("storage", &self.persistence.describe())
            .finish()
    }
}

impl Chain {
    /// A genesis-only chain. Nothing is written until the first append.
    pub fn new(difficulty: u32, persistence: Box<dyn Persistence>) -> Self {
        Self {
            blocks: vec![Self::genesis()],
            difficulty,
            persistence,
        }
    }

    pub fn genesis() -> Block {
        Block::genesis()
    }

    /// Loads the stored chain, or starts a genesis-only chain when storage is
    /// empty. With `verify` set, every stored block is re-checked and the first
    /// corrupt one is reported.
    pub fn restore(difficulty: u32, persistence: Box<dyn Persistence>, verify: bool) -> Result<Self> {
        let stored = persistence.load_chain()?;
        let Some(blocks) = stored else {
            info!(storage = %persistence.describe(), "no stored chain, starting from genesis");
            return Ok(Self::new(difficulty, persistence));
        };

        if blocks.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        if verify {
            verify_chain(&blocks, difficulty)?;
        }

        info!(
            storage = %persistence.describe(),
            blocks = blocks.len(),
            verified = verify,
            "chain restored"
        );
        Ok(Self {
            blocks,
            difficulty,
            persistence,
        })
    }

    pub fn tip(&self) -> Result<&Block> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    /// Checks `candidate` against the tip and `proof` without appending.
    pub fn validate(&self, candidate: &Block, proof: &str) -> Result<()> {
        check_candidate(self.tip()?, candidate, proof, self.difficulty)
    }

    /// Validates, appends and persists. Rejections come back as the failed
    /// check; a storage failure undoes the in-memory append.
    pub fn append(&mut self, candidate: Block, proof: &str) -> Result<()> {
        self.validate(&candidate, proof)?;

        let index = candidate.index;
        self.blocks.push(candidate);
        if let Err(e) = self.persist() {
            self.blocks.pop();
            return Err(e);
        }

        info!(index, hash = %proof, "block appended");
        Ok(())
    }

    /// [`Chain::append`] with rejections folded into `Ok(false)`.
    pub fn try_append(&mut self, candidate: Block, proof: &str) -> Result<bool> {
        let index = candidate.index;
        match self.append(candidate, proof) {
            Ok(()) => Ok(true),
            Err(e) if e.is_rejection() => {
                warn!(index, reason = %e, "candidate block rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrites storage with the full block sequence.
    pub fn persist(&self) -> Result<()> {
        self.persistence.save_chain(&self.blocks)
    }

    pub fn verify(&self) -> Result<()> {
        verify_chain(&self.blocks, self.difficulty)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::ProofOfWork;
    use crate::persistence::InMemoryPersistence;

    struct BrokenStorage;

    impl Persistence for BrokenStorage {
        fn save_chain(&self, _blocks: &[Block]) -> Result<()> {
            Err(ChainError::Storage("disk full".to_string()))
        }

        fn load_chain(&self) -> Result<Option<Vec<Block>>> {
            Ok(None)
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    fn entry() -> SourceEntry {
        SourceEntry::new("http://x", "abc", "alice", "bob", vec!["t1".to_string()])
    }

    fn mined_candidate(chain: &Chain) -> (Block, String) {
        let tip = chain.tip().unwrap();
        let mut block = Block::new(tip.index + 1, tip.hash.clone(), entry());
        let proof = ProofOfWork::new(chain.difficulty()).solve(&mut block).unwrap();
        (block, proof)
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Chain::genesis();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.hash_summary, "Genesis");
        assert_eq!(genesis.author, "System");
        assert_eq!(genesis.validator, "System");
        assert!(genesis.url.is_empty());
        assert!(genesis.tags.is_empty());
        assert_eq!(genesis.nonce, 0);
        assert!(genesis.has_valid_hash());
        assert_eq!(genesis.hash, Chain::genesis().hash);
    }

    #[test]
    fn test_seal_is_deterministic() {
        let a = Block::seal(3, 1000, entry(), "prev", 7);
        let b = Block::seal(3, 1000, entry(), "prev", 7);
        assert_eq!(a.hash, b.hash);

        let c = Block::seal(3, 1001, entry(), "prev", 7);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_mutation_invalidates_hash() {
        let mut block = Block::seal(1, 1000, entry(), "prev", 0);
        block.author = "mallory".to_string();
        assert!(!block.has_valid_hash());
        block.set_nonce(0);
        assert!(block.has_valid_hash());
    }

    #[test]
    fn test_append_links_to_tip() {
        let mut chain = Chain::new(2, Box::new(InMemoryPersistence::new()));
        for _ in 0..3 {
            let (block, proof) = mined_candidate(&chain);
            assert!(chain.try_append(block, &proof).unwrap());
        }

        assert_eq!(chain.len(), 4);
        for pair in chain.blocks().windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash);
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
        chain.verify().unwrap();
    }

    #[test]
    fn test_rejects_wrong_previous_hash() {
        let mut chain = Chain::new(1, Box::new(InMemoryPersistence::new()));
        let mut block = Block::new(1, "not-the-tip", entry());
        let proof = ProofOfWork::new(1).solve(&mut block).unwrap();

        assert!(matches!(
            chain.validate(&block, &proof),
            Err(ChainError::ChainLinkage { .. })
        ));
        assert!(!chain.try_append(block, &proof).unwrap());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_rejects_proof_below_difficulty() {
        // A proof that honestly matches the block but misses the difficulty.
        let mut chain = Chain::new(3, Box::new(InMemoryPersistence::new()));
        let tip_hash = chain.tip().unwrap().hash.clone();
        let mut block = Block::new(1, tip_hash, entry());
        let mut nonce = 0;
        while block.hash.starts_with('0') {
            nonce += 1;
            block.set_nonce(nonce);
        }
        let proof = block.recompute_hash();

        assert!(matches!(
            chain.validate(&block, &proof),
            Err(ChainError::ProofRejected { difficulty: 3, .. })
        ));
        assert!(!chain.try_append(block, &proof).unwrap());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_rejects_forged_proof() {
        let mut chain = Chain::new(2, Box::new(InMemoryPersistence::new()));
        let (block, _) = mined_candidate(&chain);
        let forged = format!("00{}", "f".repeat(62));

        assert!(matches!(
            chain.validate(&block, &forged),
            Err(ChainError::HashMismatch { .. })
        ));
        assert!(!chain.try_append(block, &forged).unwrap());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_rejects_stale_stored_hash() {
        let storage = InMemoryPersistence::new();
        let mut chain = Chain::new(1, Box::new(storage.clone()));
        let (mut block, proof) = mined_candidate(&chain);
        block.hash = "deadbeef".to_string();

        assert!(!chain.try_append(block, &proof).unwrap());
        assert_eq!(chain.len(), 1);
        assert_eq!(storage.stored_len(), 0);
        chain.verify().unwrap();
    }

    #[test]
    fn test_storage_failure_leaves_chain_unchanged() {
        let mut chain = Chain::new(1, Box::new(BrokenStorage));
        let (block, proof) = mined_candidate(&chain);

        let result = chain.try_append(block, &proof);
        assert!(matches!(result, Err(ChainError::Storage(_))));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_restore_round_trip() {
        let storage = InMemoryPersistence::new();
        let mut chain = Chain::new(1, Box::new(storage.clone()));
        let (block, proof) = mined_candidate(&chain);
        chain.try_append(block, &proof).unwrap();

        let restored = Chain::restore(1, Box::new(storage), true).unwrap();
        assert_eq!(restored.blocks(), chain.blocks());
        for block in restored.blocks() {
            assert_eq!(block.recompute_hash(), block.hash);
        }
    }

    #[test]
    fn test_restore_empty_storage_yields_genesis() {
        let chain = Chain::restore(3, Box::new(InMemoryPersistence::new()), true).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.tip().unwrap(), &Chain::genesis());
    }

    #[test]
    fn test_restore_reports_corrupt_block() {
        let storage = InMemoryPersistence::new();
        let mut chain = Chain::new(1, Box::new(storage.clone()));
        for _ in 0..2 {
            let (block, proof) = mined_candidate(&chain);
            chain.try_append(block, &proof).unwrap();
        }

        let mut blocks = chain.blocks().to_vec();
        blocks[1].hash_summary = "tampered".to_string();
        storage.save_chain(&blocks).unwrap();

        let err = Chain::restore(1, Box::new(storage.clone()), true).unwrap_err();
        assert!(matches!(err, ChainError::CorruptChain { index: 1, .. }));

        // Trusting storage loads it anyway.
        let trusted = Chain::restore(1, Box::new(storage), false).unwrap();
        assert_eq!(trusted.len(), 3);
    }
}
