//! Import Queue
//!
//! In-process at-least-once queue with SQS-like semantics.
//!
//! ## Responsibilities
//! - **Publishing**: Appending messages (journal first, then memory).
//! - **Batching**: Handing out up to `max` messages, waiting up to a batching window.
//! - **Visibility**: Hiding received messages until they are deleted or their visibility
//!   timeout expires, after which they are redelivered.
//! - **Dead letters**: Parking messages that exhausted their delivery budget.

use super::journal::{Journal, JournalEntry, ReplayedState};
use super::types::*;
use crate::catalog::types::CardRecord;

use chrono::Utc;
use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// How often a waiting receiver re-checks for redeliveries that no publish announced.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receive-order bookkeeping next to `entries`. It may hold ids that were deleted or
/// claimed since; `claim` checks every candidate against `entries`.
#[derive(Default)]
struct ReadyIndex {
    /// Visible messages by publish sequence.
    visible: BTreeMap<u64, MessageId>,
    /// Visibility deadlines of claimed or extended messages, earliest first.
    deadlines: BinaryHeap<Reverse<(Instant, u64, MessageId)>>,
}

pub struct ImportQueue {
    /// Messages that are visible or in flight.
    entries: DashMap<MessageId, QueueEntry>,
    dead_letters: DashMap<MessageId, DeadLetter>,
    // Lock order: journal writer, then index, then `entries` shards.
    index: Mutex<ReadyIndex>,
    next_seq: AtomicU64,
    settings: QueueSettings,
    journal: Option<Journal>,
    arrivals: Notify,
}

impl ImportQueue {
    /// Creates a queue that lives only as long as the process.
    pub fn in_memory(settings: QueueSettings) -> Self {
        Self {
            entries: DashMap::new(),
            dead_letters: DashMap::new(),
            index: Mutex::new(ReadyIndex::default()),
            next_seq: AtomicU64::new(0),
            settings,
            journal: None,
            arrivals: Notify::new(),
        }
    }

    /// Opens a journaled queue, restoring any messages left over from a previous run.
    pub fn open(
        settings: QueueSettings,
        journal_path: impl AsRef<Path>,
    ) -> Result<Self, QueueError> {
        let (journal, state) = Journal::open(journal_path)?;

        let queue = Self {
            entries: DashMap::new(),
            dead_letters: DashMap::new(),
            index: Mutex::new(ReadyIndex::default()),
            next_seq: AtomicU64::new(state.next_seq),
            settings,
            journal: Some(journal),
            arrivals: Notify::new(),
        };

        {
            let mut index = queue.lock_index();
            for (seq, message) in state.live {
                index.visible.insert(seq, message.message_id.clone());
                queue.entries.insert(
                    message.message_id.clone(),
                    QueueEntry {
                        message,
                        seq,
                        state: MessageState::Visible,
                    },
                );
            }
        }
        for dead_letter in state.dead_letters {
            queue
                .dead_letters
                .insert(dead_letter.message.message_id.clone(), dead_letter);
        }

        Ok(queue)
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    fn lock_index(&self) -> std::sync::MutexGuard<'_, ReadyIndex> {
        self.index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Builds a journal entry only when the queue is journaled.
    fn journaled(&self, entry: impl FnOnce() -> JournalEntry) -> Option<JournalEntry> {
        self.journal.as_ref().map(|_| entry())
    }

    /// Journals `entry` and applies the matching in-memory change.
    fn record<T>(
        &self,
        entry: Option<JournalEntry>,
        apply: impl FnOnce() -> T,
    ) -> Result<T, QueueError> {
        match (&self.journal, entry) {
            (Some(journal), Some(entry)) => journal.append_and(&entry, apply),
            _ => Ok(apply()),
        }
    }

    /// Publishes one record.
    ///
    /// The journal entry is written before the message becomes receivable, so a message a
    /// consumer has seen is always recoverable.
    pub fn enqueue(&self, record: CardRecord) -> Result<MessageId, QueueError> {
        if let Some(max_depth) = self.settings.max_depth
            && self.entries.len() >= max_depth
        {
            return Err(QueueError::Full { max_depth });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let message = ImportMessage {
            message_id: MessageId::new(),
            record,
            delivery_count: 0,
        };
        let message_id = message.message_id.clone();
        tracing::trace!(
            "Enqueued message {} for {}/{}",
            message_id,
            message.record.partition_key,
            message.record.sort_key
        );

        let entry = self.journaled(|| JournalEntry::Published {
            seq,
            message: message.clone(),
        });
        self.record(
            entry,
            || {
                self.entries.insert(
                    message_id.clone(),
                    QueueEntry {
                        message,
                        seq,
                        state: MessageState::Visible,
                    },
                );
                self.lock_index().visible.insert(seq, message_id.clone());
            },
        )?;
        self.arrivals.notify_waiters();

        Ok(message_id)
    }

    /// Receives up to `max` messages, waiting at most `window` for the batch to fill.
    ///
    /// Returns whatever was received when the window closes, possibly nothing.
    pub async fn receive_batch(&self, max: usize, window: Duration) -> Vec<ImportMessage> {
        let deadline = Instant::now() + window;
        let mut batch = Vec::with_capacity(max);

        loop {
            // Register interest before looking, so a publish between the claim and the
            // wait below still wakes us up.
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            batch.extend(self.claim(max - batch.len()));
            if batch.len() >= max {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = (deadline - now).min(RECEIVE_POLL_INTERVAL);
            let _ = tokio::time::timeout(wait, notified).await;
        }

        if !batch.is_empty() {
            tracing::debug!("Received batch of {} messages", batch.len());
        }
        batch
    }

    /// Marks up to `max` receivable messages as in flight, oldest first.
    fn claim(&self, max: usize) -> Vec<ImportMessage> {
        if max == 0 {
            return Vec::new();
        }

        let now = Instant::now();
        let visible_at = now + self.settings.visibility_timeout;
        let mut guard = self.lock_index();
        let index = &mut *guard;

        // Expired leases rejoin the visible set
        while let Some(Reverse((deadline, _, _))) = index.deadlines.peek() {
            if *deadline > now {
                break;
            }
            let Some(Reverse((_, seq, message_id))) = index.deadlines.pop() else {
                break;
            };
            let expired = self
                .entries
                .get(&message_id)
                .is_some_and(|entry| entry.is_receivable(now));
            if expired {
                index.visible.insert(seq, message_id);
            }
        }

        let mut claimed = Vec::with_capacity(max);
        while claimed.len() < max {
            let Some((seq, message_id)) = index.visible.pop_first() else {
                break;
            };
            if let Some(mut entry) = self.entries.get_mut(&message_id)
                && entry.is_receivable(now)
            {
                entry.state = MessageState::InFlight { visible_at };
                entry.message.delivery_count += 1;
                claimed.push(entry.message.clone());
                index.deadlines.push(Reverse((visible_at, seq, message_id)));
            }
        }

        claimed
    }

    /// Pushes the visibility deadline of an in-flight message forward by one timeout.
    pub fn extend_visibility(&self, message_id: &MessageId) -> Result<(), QueueError> {
        let visible_at = Instant::now() + self.settings.visibility_timeout;
        let seq = match self.entries.get_mut(message_id) {
            Some(mut entry) => match entry.state {
                MessageState::InFlight { .. } => {
                    entry.state = MessageState::InFlight { visible_at };
                    entry.seq
                }
                MessageState::Visible => return Err(QueueError::NotFound(message_id.clone())),
            },
            None => return Err(QueueError::NotFound(message_id.clone())),
        };

        self.lock_index()
            .deadlines
            .push(Reverse((visible_at, seq, message_id.clone())));
        Ok(())
    }

    /// Deletes processed messages. Unknown ids are ignored; returns how many were removed.
    pub fn delete(&self, message_ids: &[MessageId]) -> Result<usize, QueueError> {
        let mut removed = 0;
        for message_id in message_ids {
            if !self.entries.contains_key(message_id) {
                continue;
            }
            let entry = self.journaled(|| JournalEntry::Deleted {
                message_id: message_id.clone(),
            });
            let gone = self.record(
                entry,
                || match self.entries.remove(message_id) {
                    Some((_, entry)) => {
                        self.lock_index().visible.remove(&entry.seq);
                        true
                    }
                    None => false,
                },
            )?;
            if gone {
                removed += 1;
            }
        }

        self.compact_journal_if_needed();
        Ok(removed)
    }

    /// Moves a message to the dead-letter set.
    pub fn dead_letter(&self, message_id: &MessageId, reason: &str) -> Result<(), QueueError> {
        let message = self
            .entries
            .get(message_id)
            .map(|entry| entry.message.clone())
            .ok_or_else(|| QueueError::NotFound(message_id.clone()))?;

        let dead_letter = DeadLetter {
            message,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        };
        tracing::warn!(
            "Dead-lettered message {} (card {}, {} deliveries): {}",
            message_id,
            dead_letter.message.record.card_id,
            dead_letter.message.delivery_count,
            reason
        );

        let entry = self.journaled(|| JournalEntry::DeadLettered {
            dead_letter: dead_letter.clone(),
        });
        self.record(
            entry,
            || {
                if let Some((_, entry)) = self.entries.remove(message_id) {
                    self.lock_index().visible.remove(&entry.seq);
                }
                self.dead_letters.insert(message_id.clone(), dead_letter);
            },
        )?;

        self.compact_journal_if_needed();
        Ok(())
    }

    /// Rewrites the journal once deleted messages make up most of it.
    fn compact_journal_if_needed(&self) {
        let Some(journal) = &self.journal else {
            return;
        };
        let live = (self.entries.len() + self.dead_letters.len()) as u64;
        if !journal.needs_compaction(live, self.settings.journal_compaction_min_lines) {
            return;
        }

        let before = journal.line_count();
        match journal.compact_with(|| self.snapshot()) {
            Ok(after) => tracing::info!(
                "Compacted queue journal {} from {} to {} lines",
                journal.path().display(),
                before,
                after
            ),
            Err(e) => tracing::warn!(
                "Failed to compact queue journal {}: {}",
                journal.path().display(),
                e
            ),
        }
    }

    /// Current contents in journal form. Delivery counts are not journaled.
    fn snapshot(&self) -> ReplayedState {
        let live = self
            .entries
            .iter()
            .map(|entry| {
                let mut message = entry.message.clone();
                message.delivery_count = 0;
                (entry.seq, message)
            })
            .collect();
        ReplayedState {
            live,
            dead_letters: self.dead_letters(),
            next_seq: self.next_seq.load(Ordering::SeqCst),
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        let mut letters: Vec<DeadLetter> = self
            .dead_letters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        letters.sort_by(|a, b| a.dead_lettered_at.cmp(&b.dead_lettered_at));
        letters
    }

    pub fn stats(&self) -> QueueStats {
        let now = Instant::now();
        let mut stats = QueueStats {
            dead_lettered: self.dead_letters.len(),
            ..QueueStats::default()
        };
        for entry in self.entries.iter() {
            if entry.value().is_receivable(now) {
                stats.visible += 1;
            } else {
                stats.in_flight += 1;
            }
        }
        stats
    }

    /// Messages that are visible or in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No message is waiting or being processed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
