//! `future_state` transitions between successive applied pages.

use crate::model::{FutureState, Run};
use std::collections::HashMap;

/// Applies a run can be absent before it is evicted from the snapshot.
const SNAPSHOT_EVICTION_APPLIES: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub state: FutureState,
    pub last_seen: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub run_id: String,
    pub title: String,
    pub from: FutureState,
    pub to: FutureState,
}

impl Transition {
    pub fn message(&self) -> String {
        match self.to {
            FutureState::Resolved => format!("{} succeeded", self.title),
            s if s.is_failure() => format!("{} failed", self.title),
            FutureState::Canceled => format!("{} was canceled", self.title),
            FutureState::Ran => format!("{} started", self.title),
            s => format!("{} changed to {}", self.title, s.label()),
        }
    }

    pub fn reached_terminal(&self) -> bool {
        !self.from.is_terminal() && self.to.is_terminal()
    }
}

/// Runs only produce transitions once they have been seen before. Entries
/// outlive a run scrolling off the page so paging back does not re-announce it.
#[derive(Debug, Default)]
pub struct StateTracker {
    snapshot: HashMap<String, SnapshotEntry>,
    applies: u64,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_changes(&mut self, runs: &[Run]) -> Vec<Transition> {
        self.applies += 1;
        let current = self.applies;

        let mut transitions = Vec::new();
        for run in runs {
            if let Some(prev) = self.snapshot.get(&run.id) {
                if prev.state != run.future_state {
                    transitions.push(Transition {
                        run_id: run.id.clone(),
                        title: run_title(run),
                        from: prev.state,
                        to: run.future_state,
                    });
                }
            }
        }

        for run in runs {
            self.snapshot.insert(
                run.id.clone(),
                SnapshotEntry {
                    state: run.future_state,
                    last_seen: current,
                },
            );
        }
        self.snapshot
            .retain(|_, e| current.saturating_sub(e.last_seen) <= SNAPSHOT_EVICTION_APPLIES);
        transitions
    }

    pub fn get(&self, run_id: &str) -> Option<&SnapshotEntry> {
        self.snapshot.get(run_id)
    }
}

fn run_title(run: &Run) -> String {
    let name = if run.name.is_empty() {
        run.function_path.as_str()
    } else {
        run.name.as_str()
    };
    format!("{name} ({})", run.short_id())
}
