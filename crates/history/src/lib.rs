//! Append-only interaction history.
//!
//! One `InteractionLog` owns the exchanged-message history for every user:
//! events are totally ordered by append sequence, immutable once appended
//! except for the `used` flag, which compaction bulk-flips to `false`.
//! Disabled events are excluded from prompt assembly (`get_active`) but kept
//! for audit and report generation (`get_all`).
//!
//! Durable form: an append-only JSONL record stream, one record per line,
//! replayed at construction. Compaction and hard resets append marker records
//! rather than rewriting the file, so the stream stays append-only; replay
//! folds the markers back into the in-memory state. Corrupt lines are skipped
//! with a warning. Write failures are logged and non-fatal — the event still
//! lives in memory for the current turn.

use chrono::{DateTime, Utc};
use deskhand_core::history::{InteractionEvent, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One line of the durable stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LogRecord {
    /// An appended interaction event.
    Event(InteractionEvent),
    /// Compaction marker: all prior events of this user become unused.
    DisableAll {
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
    /// Hard reset marker: all prior state of this user is forgotten.
    Reset {
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
}

/// Append-only, per-user store of exchanged messages.
///
/// Concurrency: one read-write lock scoped to the whole log, not per user.
/// Lock hold time per operation is O(copy of one user's slice), which keeps
/// the coarse lock acceptable at expected load. Reads return clones so
/// callers cannot mutate internal state.
pub struct InteractionLog {
    events: RwLock<HashMap<UserId, Vec<InteractionEvent>>>,
    log_path: Option<PathBuf>,
}

impl InteractionLog {
    /// Create an in-memory log with no durable backing.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            log_path: None,
        }
    }

    /// Create a log backed by an append-only JSONL file.
    ///
    /// If the file exists, its records are replayed so `get_active` and
    /// `get_all` return exactly what they returned before the restart.
    pub fn with_log_file(path: PathBuf) -> Self {
        let events = Self::replay(&path);
        debug!(
            path = %path.display(),
            users = events.len(),
            "Interaction log replayed"
        );
        Self {
            events: RwLock::new(events),
            log_path: Some(path),
        }
    }

    /// Replay a JSONL record stream into per-user event lists.
    fn replay(path: &PathBuf) -> HashMap<UserId, Vec<InteractionEvent>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return HashMap::new(), // File doesn't exist yet — start empty
        };

        let mut events: HashMap<UserId, Vec<InteractionEvent>> = HashMap::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LogRecord>(line) {
                Ok(LogRecord::Event(event)) => {
                    events.entry(event.user_id.clone()).or_default().push(event);
                }
                Ok(LogRecord::DisableAll { user_id, .. }) => {
                    if let Some(list) = events.get_mut(&user_id) {
                        for ev in list.iter_mut() {
                            ev.used = false;
                        }
                    }
                }
                Ok(LogRecord::Reset { user_id, .. }) => {
                    events.remove(&user_id);
                }
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted history record");
                }
            }
        }
        events
    }

    /// Append one record to the durable stream. Failures are logged and
    /// swallowed — durable-log trouble must not lose the current turn.
    fn persist(&self, record: &LogRecord) {
        let Some(path) = &self.log_path else {
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Failed to create history directory");
                return;
            }
        }

        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "Failed to serialize history record");
                return;
            }
        };

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{line}"));

        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to write history record");
        }
    }

    /// Append an event to the user's history. O(1); never fails — durable
    /// write errors are logged and the event is kept in memory regardless.
    pub async fn append(&self, event: InteractionEvent) {
        let mut events = self.events.write().await;
        events
            .entry(event.user_id.clone())
            .or_default()
            .push(event.clone());
        // Persist while holding the write lock so the stream order matches
        // the append order.
        self.persist(&LogRecord::Event(event));
    }

    /// Active (`used == true`) events for a user, in append order.
    /// This is the slice prompt assembly sees.
    pub async fn get_active(&self, user_id: &UserId) -> Vec<InteractionEvent> {
        let events = self.events.read().await;
        events
            .get(user_id)
            .map(|list| list.iter().filter(|e| e.used).cloned().collect())
            .unwrap_or_default()
    }

    /// Every event for a user regardless of `used`, in append order.
    /// For audit and report generation.
    pub async fn get_all(&self, user_id: &UserId) -> Vec<InteractionEvent> {
        let events = self.events.read().await;
        events.get(user_id).cloned().unwrap_or_default()
    }

    /// Bulk-set `used = false` for every existing event of the user.
    /// Data is not deleted. Used by compaction and the explicit
    /// user-initiated context reset. No-op for an unknown user.
    pub async fn disable_all(&self, user_id: &UserId) {
        let mut events = self.events.write().await;
        let Some(list) = events.get_mut(user_id) else {
            return;
        };
        for ev in list.iter_mut() {
            ev.used = false;
        }
        self.persist(&LogRecord::DisableAll {
            user_id: user_id.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Fully forget in-memory state for a user. Distinct from `disable_all`:
    /// used by hard resets, not compaction.
    pub async fn reset(&self, user_id: &UserId) {
        let mut events = self.events.write().await;
        if events.remove(user_id).is_none() {
            return;
        }
        self.persist(&LogRecord::Reset {
            user_id: user_id.clone(),
            timestamp: Utc::now(),
        });
    }
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::new()
    }
}
