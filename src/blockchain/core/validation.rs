use crate::blockchain::core::chain::Block;
use crate::crypto::meets_difficulty;
use crate::error::{ChainError, Result};
use rayon::prelude::*;

/// Checks a candidate against the current tip, in order: linkage, proof
/// difficulty, proof against the recomputed hash, stored hash against the
/// proof, then index.
pub fn check_candidate(tip: &Block, candidate: &Block, proof: &str, difficulty: u32) -> Result<()> {
    if candidate.previous_hash != tip.hash {
        return Err(ChainError::ChainLinkage {
            expected: tip.hash.clone(),
            found: candidate.previous_hash.clone(),
        });
    }

    if !meets_difficulty(proof, difficulty) {
        return Err(ChainError::ProofRejected {
            difficulty,
            proof: proof.to_string(),
        });
    }

    let computed = candidate.recompute_hash();
    if proof != computed {
        return Err(ChainError::HashMismatch {
            claimed: proof.to_string(),
            computed,
        });
    }

    if candidate.hash != proof {
        return Err(ChainError::HashMismatch {
            claimed: candidate.hash.clone(),
            computed,
        });
    }

    if candidate.index != tip.index + 1 {
        return Err(ChainError::InvalidIndex {
            expected: tip.index + 1,
            found: candidate.index,
        });
    }

    Ok(())
}

fn check_stored_block(blocks: &[Block], position: usize, difficulty: u32) -> Result<()> {
    let block = &blocks[position];
    let corrupt = |reason: String| ChainError::CorruptChain {
        index: position as u64,
        reason,
    };

    if block.index != position as u64 {
        return Err(corrupt(format!("stored index is {}", block.index)));
    }

    let computed = block.recompute_hash();
    if block.hash != computed {
        return Err(corrupt(format!(
            "stored hash {} does not match computed {}",
            block.hash, computed
        )));
    }

    // The stored hash matches the contents, so comparing hashes compares
    // every genesis field.
    if position == 0 {
        let genesis = Block::genesis();
        if block.hash != genesis.hash {
            return Err(corrupt(format!(
                "genesis hash {} is not the fixed genesis {}",
                block.hash, genesis.hash
            )));
        }
        return Ok(());
    }

    let previous = &blocks[position - 1];
    if block.previous_hash != previous.hash {
        return Err(corrupt(format!(
            "previous hash {} does not link to {}",
            block.previous_hash, previous.hash
        )));
    }

    if !meets_difficulty(&block.hash, difficulty) {
        return Err(corrupt(format!(
            "hash {} has fewer than {} leading zeros",
            block.hash, difficulty
        )));
    }

    Ok(())
}

/// Re-verifies a whole block sequence: index order, genesis sentinel, stored
/// hashes, linkage and difficulty (genesis exempt). Reports the lowest
/// corrupt index.
pub fn verify_chain(blocks: &[Block], difficulty: u32) -> Result<()> {
    if blocks.is_empty() {
        return Err(ChainError::EmptyChain);
    }

    match (0..blocks.len())
        .into_par_iter()
        .map(|position| check_stored_block(blocks, position, difficulty))
        .find_first(|result| result.is_err())
    {
        Some(err) => err,
        None => Ok(()),
    }
}
