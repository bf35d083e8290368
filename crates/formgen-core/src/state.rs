//! Review state machine
//!
//! ```text
//! AwaitingReview -> {Committing, Editing, Regenerating, Abandoned}
//! Committing     -> {Committed, AwaitingReview}
//! Editing        -> {Committed, AwaitingReview}
//! Regenerating   -> {AwaitingReview, Regenerating, Abandoned}
//! ```
//!
//! `Committed` and `Abandoned` are terminal. A session with no recorded
//! state is awaiting review.

use crate::error::StateTransitionError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use formgen_session::SessionId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Where a session is in the review flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    #[default]
    AwaitingReview,
    Committing,
    Regenerating,
    Editing,
    Committed,
    Abandoned,
}

impl ReviewState {
    /// All states
    pub const ALL: [ReviewState; 6] = [
        Self::AwaitingReview,
        Self::Committing,
        Self::Regenerating,
        Self::Editing,
        Self::Committed,
        Self::Abandoned,
    ];

    /// Committed or abandoned
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Abandoned)
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: ReviewState) -> &'static [ReviewState] {
    use ReviewState::{Abandoned, AwaitingReview, Committed, Committing, Editing, Regenerating};
    match from {
        AwaitingReview => &[Committing, Editing, Regenerating, Abandoned],
        Committing | Editing => &[Committed, AwaitingReview],
        // A second regenerate supersedes the first
        Regenerating => &[AwaitingReview, Regenerating, Abandoned],
        Committed | Abandoned => &[],
    }
}

/// Validate a state transition
///
/// # Errors
/// Returns `StateTransitionError` if `to` is not reachable from `from`
pub fn validate_transition(from: ReviewState, to: ReviewState) -> Result<(), StateTransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateTransitionError { from, to })
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: ReviewState,
    touched: Instant,
}

impl Tracked {
    fn now(state: ReviewState) -> Self {
        Self {
            state,
            touched: Instant::now(),
        }
    }
}

/// Per-session review state
///
/// Only sessions away from `AwaitingReview` are stored. Terminal states are
/// validated and then forgotten, so a session that starts a new flow
/// begins again at `AwaitingReview`. Sessions that never come back are
/// dropped by [`ReviewStateTracker::prune`].
#[derive(Debug, Default)]
pub struct ReviewStateTracker {
    states: DashMap<SessionId, Tracked>,
}

impl ReviewStateTracker {
    /// Create empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a session
    #[must_use]
    pub fn current(&self, session: SessionId) -> ReviewState {
        self.states.get(&session).map(|s| s.state).unwrap_or_default()
    }

    /// Move a session to `to`, returning the state it left
    ///
    /// # Errors
    /// Returns `StateTransitionError` if the move is not allowed; the
    /// recorded state is unchanged
    pub fn transition(
        &self,
        session: SessionId,
        to: ReviewState,
    ) -> Result<ReviewState, StateTransitionError> {
        let from = match self.states.entry(session) {
            Entry::Occupied(mut occupied) => {
                let from = occupied.get().state;
                validate_transition(from, to)?;
                if to.is_terminal() || to == ReviewState::AwaitingReview {
                    occupied.remove();
                } else {
                    *occupied.get_mut() = Tracked::now(to);
                }
                from
            }
            Entry::Vacant(vacant) => {
                let from = ReviewState::default();
                validate_transition(from, to)?;
                if !to.is_terminal() {
                    vacant.insert(Tracked::now(to));
                }
                from
            }
        };

        tracing::debug!(session_id = %session, ?from, ?to, "review state transition");
        Ok(from)
    }

    /// Move to `AwaitingReview` when allowed, otherwise leave as is
    pub fn settle(&self, session: SessionId) -> ReviewState {
        let current = self.current(session);
        if current == ReviewState::AwaitingReview {
            return current;
        }
        match self.transition(session, ReviewState::AwaitingReview) {
            Ok(_) => ReviewState::AwaitingReview,
            Err(_) => current,
        }
    }

    /// Forget a session's state
    pub fn reset(&self, session: SessionId) {
        self.states.remove(&session);
    }

    /// Forget sessions whose state last changed more than `retention` ago
    ///
    /// Returns how many were dropped.
    pub fn prune(&self, retention: Duration) -> usize {
        let before = self.states.len();
        self.states
            .retain(|_, tracked| tracked.touched.elapsed() < retention);
        let pruned = before.saturating_sub(self.states.len());
        if pruned > 0 {
            tracing::debug!(pruned, "pruned idle review states");
        }
        pruned
    }

    /// Number of sessions away from `AwaitingReview`
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether every session is awaiting review
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
