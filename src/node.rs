//! Shared ledger service
//!
//! Wraps a [`Ledger`] for concurrent use: one lock guards the chain and queue
//! together, at most one mining attempt runs at a time, and the proof-of-work
//! search runs on a blocking thread with the ledger lock released so submits
//! and chain reads proceed meanwhile.

use crate::blockchain::{Block, SourceEntry};
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::ledger::{Ledger, MineOutcome};
use crate::mempool::SubmissionId;
use crate::persistence::open_backend;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct Node {
    ledger: Mutex<Ledger>,
    /// Held for the whole of a mining attempt.
    mining: tokio::sync::Mutex<()>,
    shutdown: Arc<AtomicBool>,
    blocks_mined: AtomicU64,
}

impl Node {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            mining: tokio::sync::Mutex::new(()),
            shutdown: Arc::new(AtomicBool::new(false)),
            blocks_mined: AtomicU64::new(0),
        }
    }

    /// Opens the configured storage backend and restores the ledger from it.
    pub fn open(config: &Config) -> Result<Self> {
        let persistence = open_backend(&config.storage)?;
        let ledger = Ledger::open(&config.ledger, persistence)?;
        info!(
            blocks = ledger.chain().len(),
            difficulty = config.ledger.difficulty,
            "ledger opened"
        );
        Ok(Self::new(ledger))
    }

    pub fn submit(&self, entry: SourceEntry) -> SubmissionId {
        self.ledger.lock().submit(entry)
    }

    /// One mining attempt. Concurrent callers wait their turn.
    ///
    /// The attempt runs as its own task, so it still finishes (appending or
    /// requeueing the entry) and keeps the mining permit until then even if
    /// the returned future is dropped.
    pub async fn mine(self: &Arc<Self>) -> Result<MineOutcome> {
        let node = Arc::clone(self);
        tokio::spawn(async move { node.mine_attempt().await })
            .await
            .map_err(|e| ChainError::Worker(e.to_string()))?
    }

    async fn mine_attempt(&self) -> Result<MineOutcome> {
        let _permit = self.mining.lock().await;

        let (job, pow) = {
            let mut ledger = self.ledger.lock();
            (ledger.begin_mining()?, ledger.proof_of_work())
        };
        let Some(mut job) = job else {
            return Ok(MineOutcome::NothingToMine);
        };

        let cancel = Arc::clone(&self.shutdown);
        let (job, search) = tokio::task::spawn_blocking(move || {
            let search = job.solve(&pow, &cancel);
            (job, search)
        })
        .await
        .map_err(|e| ChainError::Worker(e.to_string()))?;

        let outcome = self.ledger.lock().finish_mining(job, search)?;
        if outcome.mined_index().is_some() {
            self.blocks_mined.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.ledger.lock().snapshot()
    }

    pub fn chain_len(&self) -> usize {
        self.ledger.lock().chain().len()
    }

    pub fn queue_len(&self) -> usize {
        self.ledger.lock().queue().len()
    }

    pub fn pending_position(&self, id: &SubmissionId) -> Option<usize> {
        self.ledger.lock().pending_position(id)
    }

    pub fn difficulty(&self) -> u32 {
        self.ledger.lock().chain().difficulty()
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    /// Cancels any in-flight search and stops the auto-miner.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Background loop that mines whenever entries are queued, until shutdown.
    pub fn spawn_auto_miner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "auto-miner started");
            while !node.is_shutting_down() {
                if node.queue_len() > 0 {
                    match node.mine().await {
                        Ok(MineOutcome::Mined { index, .. }) => {
                            debug!(index, "auto-miner extended chain");
                            continue;
                        }
                        Ok(outcome) => debug!(?outcome, "auto-miner attempt produced no block"),
                        Err(e) => error!("auto-miner failed: {}", e),
                    }
                }
                tokio::time::sleep(interval).await;
            }
            info!("auto-miner stopped");
        })
    }
}
