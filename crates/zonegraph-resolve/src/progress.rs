//! Run progress reporting.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Observable progress of the current run.
///
/// `done <= total` holds in every published state; `total` only grows while
/// a run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressState {
    /// A run is in flight
    pub running: bool,
    /// Names known to the run: candidates plus discovered hops
    pub total: usize,
    /// Names resolved so far
    pub done: usize,
}

/// Progress of one run, published through a watch channel.
///
/// Updates stop once the run's token is cancelled so a superseded run never
/// overwrites its successor's progress.
#[derive(Debug)]
pub(crate) struct RunProgress {
    tx: Arc<watch::Sender<ProgressState>>,
    cancel: CancellationToken,
    known: HashSet<String>,
    done: HashSet<String>,
}

impl RunProgress {
    pub(crate) fn start<'a, I>(
        tx: Arc<watch::Sender<ProgressState>>,
        cancel: CancellationToken,
        candidates: I,
    ) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let progress = Self {
            tx,
            cancel,
            known: candidates.into_iter().cloned().collect(),
            done: HashSet::new(),
        };
        progress.publish(true);
        progress
    }

    /// Count `name` as resolved, registering it if it is new
    pub(crate) fn mark_resolved(&mut self, name: &str) {
        let fresh_known = self.known.insert(name.to_string());
        let fresh_done = self.done.insert(name.to_string());
        if fresh_known || fresh_done {
            self.publish(true);
        }
    }

    pub(crate) fn is_resolved(&self, name: &str) -> bool {
        self.done.contains(name)
    }

    pub(crate) fn state(&self, running: bool) -> ProgressState {
        ProgressState {
            running,
            total: self.known.len(),
            done: self.done.len(),
        }
    }

    /// Publish the final state of a completed run
    pub(crate) fn finish(&self) {
        self.publish(false);
    }

    fn publish(&self, running: bool) {
        if !self.cancel.is_cancelled() {
            self.tx.send_replace(self.state(running));
        }
    }
}

/// Publish the idle state
pub(crate) fn reset(tx: &watch::Sender<ProgressState>) {
    tx.send_replace(ProgressState::default());
}
