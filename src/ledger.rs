//! The ledger: a chain, its submission queue and the proof-of-work that links
//! them into the "submit, then mine" workflow.
//!
//! Mining is split into [`Ledger::begin_mining`] and [`Ledger::finish_mining`]
//! so a caller holding the ledger behind a lock can run the search itself
//! without keeping the lock (see [`crate::node`]). [`Ledger::mine`] does all
//! three steps in place.

use crate::blockchain::{Block, Chain, SourceEntry};
use crate::config::LedgerConfig;
use crate::error::{ChainError, Result};
use crate::mempool::{PendingSubmission, SubmissionId, SubmissionQueue};
use crate::miner::ProofOfWork;
use crate::persistence::Persistence;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

/// Result of one mining attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    /// A block was appended and persisted.
    Mined { index: u64, hash: String },
    /// The queue was empty.
    NothingToMine,
    /// The chain refused the candidate.
    Rejected { requeued: bool },
    /// The search was cancelled or ran out of attempts.
    Interrupted { reason: ChainError, requeued: bool },
}

impl MineOutcome {
    pub fn mined_index(&self) -> Option<u64> {
        match self {
            MineOutcome::Mined { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// A dequeued submission and the candidate block built for it.
#[derive(Debug, Clone)]
pub struct MiningJob {
    submission: PendingSubmission,
    candidate: Block,
}

impl MiningJob {
    pub fn submission_id(&self) -> SubmissionId {
        self.submission.id
    }

    pub fn candidate(&self) -> &Block {
        &self.candidate
    }

    /// Runs the search on the candidate, leaving the found nonce on it.
    pub fn solve(&mut self, pow: &ProofOfWork, cancel: &AtomicBool) -> Result<String> {
        pow.search(&mut self.candidate, cancel)
    }
}

#[derive(Debug)]
pub struct Ledger {
    chain: Chain,
    queue: SubmissionQueue,
    pow: ProofOfWork,
    requeue_on_failure: bool,
}

impl Ledger {
    pub fn new(chain: Chain, pow: ProofOfWork, requeue_on_failure: bool) -> Self {
        Self {
            chain,
            queue: SubmissionQueue::new(),
            pow,
            requeue_on_failure,
        }
    }

    /// Restores the chain from `persistence` (or starts at genesis) and sets up
    /// mining per `config`.
    pub fn open(config: &LedgerConfig, persistence: Box<dyn Persistence>) -> Result<Self> {
        let chain = Chain::restore(config.difficulty, persistence, config.verify_on_load)?;
        let pow = ProofOfWork::new(config.difficulty).with_max_attempts(config.max_attempts);
        Ok(Self::new(chain, pow, config.requeue_on_failure))
    }

    /// Queues an entry and returns its acknowledgment id. Does not mine.
    pub fn submit(&mut self, entry: SourceEntry) -> SubmissionId {
        let submission = PendingSubmission::new(entry);
        let id = submission.id;
        info!(%id, url = %submission.entry.url, "source queued");
        self.queue.enqueue(submission);
        id
    }

    /// Dequeues the oldest entry and mines it on the current thread.
    pub fn mine(&mut self) -> Result<MineOutcome> {
        self.mine_with(&AtomicBool::new(false))
    }

    /// [`Ledger::mine`] with a cancellation flag for the search.
    pub fn mine_with(&mut self, cancel: &AtomicBool) -> Result<MineOutcome> {
        let Some(mut job) = self.begin_mining()? else {
            return Ok(MineOutcome::NothingToMine);
        };
        let pow = self.pow;
        let search = job.solve(&pow, cancel);
        self.finish_mining(job, search)
    }

    /// Dequeues the oldest entry and builds a candidate on top of the tip.
    /// `None` when the queue is empty.
    pub fn begin_mining(&mut self) -> Result<Option<MiningJob>> {
        let tip = self.chain.tip()?;
        let (index, previous_hash) = (tip.index + 1, tip.hash.clone());

        let Some(submission) = self.queue.dequeue_oldest() else {
            return Ok(None);
        };
        let candidate = Block::new(index, previous_hash, submission.entry.clone());
        Ok(Some(MiningJob {
            submission,
            candidate,
        }))
    }

    /// Offers a searched candidate to the chain. The entry goes back to the
    /// queue when nothing was appended and requeueing is enabled.
    pub fn finish_mining(&mut self, job: MiningJob, search: Result<String>) -> Result<MineOutcome> {
        let MiningJob {
            submission,
            candidate,
        } = job;

        let proof = match search {
            Ok(proof) => proof,
            Err(reason @ (ChainError::MiningCancelled | ChainError::MiningExhausted { .. })) => {
                warn!(index = candidate.index, %reason, "mining interrupted");
                let requeued = self.settle_unmined(submission);
                return Ok(MineOutcome::Interrupted { reason, requeued });
            }
            Err(e) => {
                self.settle_unmined(submission);
                return Err(e);
            }
        };

        let index = candidate.index;
        match self.chain.try_append(candidate, &proof) {
            Ok(true) => Ok(MineOutcome::Mined { index, hash: proof }),
            Ok(false) => {
                let requeued = self.settle_unmined(submission);
                Ok(MineOutcome::Rejected { requeued })
            }
            Err(e) => {
                self.settle_unmined(submission);
                Err(e)
            }
        }
    }

    fn settle_unmined(&mut self, submission: PendingSubmission) -> bool {
        if self.requeue_on_failure {
            info!(id = %submission.id, "entry returned to queue");
            self.queue.requeue_front(submission);
            true
        } else {
            warn!(id = %submission.id, url = %submission.entry.url, "entry dropped");
            false
        }
    }

    /// Copy of every block in chain order.
    pub fn snapshot(&self) -> Vec<Block> {
        self.chain.blocks().to_vec()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn queue(&self) -> &SubmissionQueue {
        &self.queue
    }

    pub fn pending_position(&self, id: &SubmissionId) -> Option<usize> {
        self.queue.position(id)
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        self.pow
    }
}
