//! Append-only record of the states a machine has entered.

use super::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single state entry.
///
/// Entries are written when the machine enters a state, before its entry
/// action runs, so the history reflects entry order rather than
/// completion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct HistoryEntry<S: State> {
    /// The state that was entered
    pub state: S,
    /// When the state was entered
    pub entered_at: DateTime<Utc>,
}

impl<S: State> HistoryEntry<S> {
    pub fn now(state: S) -> Self {
        Self {
            state,
            entered_at: Utc::now(),
        }
    }
}

/// Ordered history of entered states.
///
/// `record` returns a new history with the entry added, leaving the
/// original untouched.
///
/// # Example
///
/// ```rust
/// use micromachine::core::{HistoryEntry, StateHistory};
///
/// let history = StateHistory::new()
///     .record(HistoryEntry::now("INITIAL".to_string()))
///     .record(HistoryEntry::now("FINAL".to_string()));
///
/// assert_eq!(history.names(), vec!["INITIAL", "FINAL"]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StateHistory<S: State> {
    entries: Vec<HistoryEntry<S>>,
}

impl<S: State> Default for StateHistory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> StateHistory<S> {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record an entry, returning a new history.
    pub fn record(&self, entry: HistoryEntry<S>) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self { entries }
    }

    /// Append an entry in place.
    pub fn push(&mut self, entry: HistoryEntry<S>) {
        self.entries.push(entry);
    }

    /// Get the path of states entered, in entry order.
    pub fn get_path(&self) -> Vec<&S> {
        self.entries.iter().map(|entry| &entry.state).collect()
    }

    /// Display names of the entered states, in entry order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.state.name()).collect()
    }

    /// Time elapsed between the first and the last entry.
    ///
    /// Returns `None` for an empty history.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) {
            let duration = last.entered_at.signed_duration_since(first.entered_at);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn entries(&self) -> &[HistoryEntry<S>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&S> {
        self.entries.first().map(|entry| &entry.state)
    }

    pub fn last(&self) -> Option<&S> {
        self.entries.last().map(|entry| &entry.state)
    }
}
