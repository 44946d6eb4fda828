//! Submission queue: sources accepted for recording but not yet mined.

use crate::blockchain::SourceEntry;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// Acknowledgment token handed back on submit. Lives only as long as the
/// entry stays queued; blocks do not record it.
pub type SubmissionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSubmission {
    pub id: SubmissionId,
    pub entry: SourceEntry,
    /// Milliseconds since the Unix epoch.
    pub queued_at: u64,
}

impl PendingSubmission {
    /// Wraps `entry` with a fresh random identifier.
    pub fn new(entry: SourceEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry,
            queued_at: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

/// FIFO of pending submissions. No validation or deduplication.
#[derive(Debug, Clone, Default)]
pub struct SubmissionQueue {
    pending: VecDeque<PendingSubmission>,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, submission: PendingSubmission) {
        self.pending.push_back(submission);
    }

    /// Removes and returns the oldest submission.
    pub fn dequeue_oldest(&mut self) -> Option<PendingSubmission> {
        self.pending.pop_front()
    }

    /// Puts a dequeued submission back at the head so it is mined next.
    pub fn requeue_front(&mut self, submission: PendingSubmission) {
        self.pending.push_front(submission);
    }

    /// Zero-based position of `id` in mining order.
    pub fn position(&self, id: &SubmissionId) -> Option<usize> {
        self.pending.iter().position(|s| &s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingSubmission> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
