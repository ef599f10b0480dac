//! Queue Journal
//!
//! Append-only JSON-lines log of queue mutations. Replaying it rebuilds the set of live
//! messages and dead letters after a restart. In-flight state is not journaled: a message
//! that was being processed when the process died simply becomes visible again.
//!
//! The file is compacted on open and, while running, whenever dead lines dominate it.

use super::types::{DeadLetter, ImportMessage, MessageId, QueueError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    Published { seq: u64, message: ImportMessage },
    Deleted { message_id: MessageId },
    DeadLettered { dead_letter: DeadLetter },
}

/// State recovered from a journal.
#[derive(Debug, Default)]
pub struct ReplayedState {
    /// Live messages keyed by publish sequence.
    pub live: BTreeMap<u64, ImportMessage>,
    pub dead_letters: Vec<DeadLetter>,
    pub next_seq: u64,
}

pub struct Journal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    /// Lines currently in the file.
    lines: AtomicU64,
}

impl Journal {
    /// Opens (or creates) the journal at `path`, replays it and compacts it down to the
    /// surviving entries.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, ReplayedState), QueueError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            replay(&path)?
        } else {
            ReplayedState::default()
        };

        let lines = compact(&path, &state)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(
            "Opened queue journal {} ({} live, {} dead-lettered)",
            path.display(),
            state.live.len(),
            state.dead_letters.len()
        );

        Ok((
            Self {
                path,
                writer: Mutex::new(BufWriter::new(file)),
                lines: AtomicU64::new(lines),
            },
            state,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line_count(&self) -> u64 {
        self.lines.load(Ordering::SeqCst)
    }

    /// Appends one entry and flushes it before returning.
    pub fn append(&self, entry: &JournalEntry) -> Result<(), QueueError> {
        self.append_and(entry, || ())
    }

    /// Appends one entry, then runs `apply` before another append or a compaction can
    /// start. Callers update their in-memory state in `apply`, so a compaction snapshot
    /// always reflects every line written before it.
    pub fn append_and<T>(
        &self,
        entry: &JournalEntry,
        apply: impl FnOnce() -> T,
    ) -> Result<T, QueueError> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        self.lines.fetch_add(1, Ordering::SeqCst);
        Ok(apply())
    }

    /// Whether the file holds at least `min_lines` lines and more than twice `live`.
    pub fn needs_compaction(&self, live: u64, min_lines: u64) -> bool {
        let lines = self.line_count();
        lines >= min_lines && lines > live.saturating_mul(2)
    }

    /// Rewrites the file from `snapshot`, which is taken with appends blocked. Returns the
    /// new line count.
    pub fn compact_with(
        &self,
        snapshot: impl FnOnce() -> ReplayedState,
    ) -> Result<u64, QueueError> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush()?;

        let state = snapshot();
        let lines = compact(&self.path, &state)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        *writer = BufWriter::new(file);
        self.lines.store(lines, Ordering::SeqCst);
        Ok(lines)
    }
}

fn replay(path: &Path) -> Result<ReplayedState, QueueError> {
    let reader = BufReader::new(File::open(path)?);
    let mut state = ReplayedState::default();
    let mut seq_by_id: BTreeMap<MessageId, u64> = BTreeMap::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: JournalEntry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(e) => {
                // A torn final write is expected after a crash; skip it
                tracing::warn!(
                    "Skipping unreadable journal line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                );
                continue;
            }
        };

        match entry {
            JournalEntry::Published { seq, message } => {
                seq_by_id.insert(message.message_id.clone(), seq);
                state.live.insert(seq, message);
                state.next_seq = state.next_seq.max(seq + 1);
            }
            JournalEntry::Deleted { message_id } => {
                if let Some(seq) = seq_by_id.remove(&message_id) {
                    state.live.remove(&seq);
                }
            }
            JournalEntry::DeadLettered { dead_letter } => {
                if let Some(seq) = seq_by_id.remove(&dead_letter.message.message_id) {
                    state.live.remove(&seq);
                }
                state.dead_letters.push(dead_letter);
            }
        }
    }

    Ok(state)
}

/// Rewrites the journal so it only contains `state`. Returns the number of lines written.
fn compact(path: &Path, state: &ReplayedState) -> Result<u64, QueueError> {
    let tmp_path = path.with_extension("compact");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for (seq, message) in state.live.iter() {
            let entry = JournalEntry::Published {
                seq: *seq,
                message: message.clone(),
            };
            serde_json::to_writer(&mut writer, &entry)?;
            writer.write_all(b"\n")?;
        }
        for dead_letter in state.dead_letters.iter() {
            let entry = JournalEntry::DeadLettered {
                dead_letter: dead_letter.clone(),
            };
            serde_json::to_writer(&mut writer, &entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok((state.live.len() + state.dead_letters.len()) as u64)
}
