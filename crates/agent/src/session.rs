//! Per-user session state: the turn-budget state machine and prompt
//! overrides.
//!
//! One `SessionStore` service object owns all per-user mutable state —
//! elicitation sessions and system-prompt overrides — under a single
//! map-level lock, instead of scattering synchronized global maps.
//!
//! State machine per user:
//!
//! ```text
//! Idle ──begin──▶ Eliciting(remaining > 0)
//!                     │ non-final turn: remaining -= 1
//!                     ├── remaining still > 0 ────────────▶ (stay)
//!                     ├── remaining == 0 ──▶ forced finalize ──▶ Idle
//!                     └── final status reported ──────────────▶ Idle
//! ```
//!
//! Open-ended multi-turn elicitation can run away in token and latency
//! cost; the hard ceiling plus a graceful forced-final step guarantees
//! bounded turns while still producing a usable terminal artifact.

use deskhand_core::history::UserId;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::output::TurnStatus;

/// Elicitation state for one user.
#[derive(Debug, Clone)]
struct ElicitationSession {
    /// Turns left before finalization is forced. Never negative.
    remaining_turns: u32,
    /// The task the dialogue is eliciting detail for.
    task: String,
}

/// All mutable per-user state.
#[derive(Debug, Clone, Default)]
struct UserState {
    /// `Some` while elicitation mode is active.
    elicitation: Option<ElicitationSession>,
    /// Condensed-memory text folded into the system prompt by compaction.
    prompt_override: String,
}

/// What the orchestrator should know before producing this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnDirective {
    /// Ordinary chat handling.
    Plain,
    /// Elicitation is active.
    Eliciting {
        task: String,
        remaining: u32,
        /// Remaining turns at or below the accelerate threshold — inject the
        /// "prefer closing" hint into the next prompt.
        accelerate: bool,
    },
}

/// The state-machine transition after one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransition {
    /// Not in elicitation mode; the status field carries no meaning.
    NotEliciting,
    /// Session continues with this many turns left.
    Continue { remaining: u32 },
    /// Status was final — session cleared, user back to plain chat.
    Finalized,
    /// Budget hit zero on a non-final turn — session cleared; the caller
    /// must make one forced finalize call and treat its result as final
    /// regardless of the model's own reported status.
    ForceFinalize,
}

/// One service object owning every per-user map.
pub struct SessionStore {
    state: RwLock<HashMap<UserId, UserState>>,
    turn_budget: u32,
    accelerate_threshold: u32,
}

impl SessionStore {
    pub fn new(turn_budget: u32, accelerate_threshold: u32) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            turn_budget: turn_budget.max(1),
            accelerate_threshold,
        }
    }

    /// Enter elicitation mode for a user, arming the full turn budget.
    /// Re-entering restarts the budget for the new task.
    pub async fn begin_elicitation(&self, user_id: &UserId, task: impl Into<String>) -> u32 {
        let mut state = self.state.write().await;
        let entry = state.entry(user_id.clone()).or_default();
        entry.elicitation = Some(ElicitationSession {
            remaining_turns: self.turn_budget,
            task: task.into(),
        });
        info!(user_id = %user_id, budget = self.turn_budget, "Elicitation started");
        self.turn_budget
    }

    /// Whether elicitation mode is active for the user.
    pub async fn is_eliciting(&self, user_id: &UserId) -> bool {
        let state = self.state.read().await;
        state
            .get(user_id)
            .is_some_and(|s| s.elicitation.is_some())
    }

    /// Snapshot of the session before producing a turn.
    pub async fn directive(&self, user_id: &UserId) -> TurnDirective {
        let state = self.state.read().await;
        match state.get(user_id).and_then(|s| s.elicitation.as_ref()) {
            Some(session) => TurnDirective::Eliciting {
                task: session.task.clone(),
                remaining: session.remaining_turns,
                accelerate: session.remaining_turns > 0
                    && session.remaining_turns <= self.accelerate_threshold,
            },
            None => TurnDirective::Plain,
        }
    }

    /// Apply one assistant turn to the state machine.
    ///
    /// Decrements the budget exactly once per non-final turn (floor 0) and
    /// clears the session on any terminal transition.
    pub async fn record_turn(&self, user_id: &UserId, status: TurnStatus) -> TurnTransition {
        let mut state = self.state.write().await;
        let Some(user_state) = state.get_mut(user_id) else {
            return TurnTransition::NotEliciting;
        };
        let Some(session) = user_state.elicitation.as_mut() else {
            return TurnTransition::NotEliciting;
        };

        if status == TurnStatus::Final {
            user_state.elicitation = None;
            info!(user_id = %user_id, "Elicitation concluded organically");
            return TurnTransition::Finalized;
        }

        session.remaining_turns = session.remaining_turns.saturating_sub(1);
        let remaining = session.remaining_turns;
        debug!(user_id = %user_id, remaining, "Elicitation turn consumed");

        if remaining == 0 {
            user_state.elicitation = None;
            info!(user_id = %user_id, "Turn budget exhausted, forcing finalization");
            return TurnTransition::ForceFinalize;
        }

        TurnTransition::Continue { remaining }
    }

    /// The user's current system-prompt override, if any.
    pub async fn prompt_override(&self, user_id: &UserId) -> Option<String> {
        let state = self.state.read().await;
        state
            .get(user_id)
            .map(|s| s.prompt_override.clone())
            .filter(|o| !o.is_empty())
    }

    /// Concatenate condensed-memory text onto the user's prompt override.
    /// Identical text is appended only once. Returns whether anything was
    /// added.
    pub async fn append_override(&self, user_id: &UserId, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let mut state = self.state.write().await;
        let entry = state.entry(user_id.clone()).or_default();
        if entry.prompt_override.contains(text) {
            debug!(user_id = %user_id, "Duplicate compacted context ignored");
            return false;
        }

        if !entry.prompt_override.is_empty() {
            entry.prompt_override.push_str("\n\n");
        }
        entry.prompt_override.push_str(text);
        true
    }

    /// Forget all session state for a user (hard reset).
    pub async fn clear(&self, user_id: &UserId) {
        self.state.write().await.remove(user_id);
    }
}
