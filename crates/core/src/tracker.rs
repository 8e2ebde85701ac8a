//! Execution State Tracker.
//!
//! [`ExecutionTracker`] folds streamed [`ProgressEvent`]s and polled
//! [`ExecutionStatus`] snapshots into a single [`ExecutionView`]. The
//! two sources are not ordered relative to each other, so the tracker
//! applies two corrections:
//!
//! * `percent` is a ratchet: it only ever increases within a session.
//! * a terminal lifecycle is sticky: later snapshots cannot leave it.
//!
//! The tracker is pure state; it never performs I/O.

use std::cmp::Ordering;

use serde::Serialize;

use crate::progress::{ProgressEvent, PERCENT_MAX};
use crate::status::{ExecutionStatus, Lifecycle};
use crate::types::ExecutionId;

/// The only state the rest of the application reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionView {
    /// Run being tracked; `None` before any session started.
    pub execution_id: Option<ExecutionId>,
    pub status: Lifecycle,
    /// Current stage, from the latest event step or status snapshot.
    pub stage: Option<String>,
    /// Displayed completion, 0-100, never decreasing within a session.
    pub percent: f64,
    /// Every event received this session, in arrival order.
    pub events: Vec<ProgressEvent>,
    /// Whether a push connection is currently open. Display only.
    pub connected: bool,
    /// Failure reason reported by the backend, shown verbatim.
    pub error_message: Option<String>,
    pub output_path: Option<String>,
    pub cost: f64,
    pub topic: Option<String>,
}

impl ExecutionView {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn latest_event(&self) -> Option<&ProgressEvent> {
        self.events.last()
    }

    /// Bring this copy up to date with `latest` of the same session.
    ///
    /// Returns whether anything changed. `events` is append-only within
    /// a session, so only the new tail is copied; a copy holding more
    /// events than `latest` belongs to another session and is replaced.
    pub fn sync_from(&mut self, latest: &ExecutionView) -> bool {
        let mut changed = match self.events.len().cmp(&latest.events.len()) {
            Ordering::Less => {
                let seen = self.events.len();
                self.events.extend_from_slice(&latest.events[seen..]);
                true
            }
            Ordering::Greater => {
                self.events.clone_from(&latest.events);
                true
            }
            Ordering::Equal => false,
        };

        changed |= update(&mut self.execution_id, &latest.execution_id);
        changed |= update(&mut self.status, &latest.status);
        changed |= update(&mut self.stage, &latest.stage);
        changed |= update(&mut self.percent, &latest.percent);
        changed |= update(&mut self.connected, &latest.connected);
        changed |= update(&mut self.error_message, &latest.error_message);
        changed |= update(&mut self.output_path, &latest.output_path);
        changed |= update(&mut self.cost, &latest.cost);
        changed |= update(&mut self.topic, &latest.topic);
        changed
    }
}

fn update<T: Clone + PartialEq>(slot: &mut T, value: &T) -> bool {
    if slot == value {
        return false;
    }
    slot.clone_from(value);
    true
}

/// Owns the canonical [`ExecutionView`] of one tracking session.
#[derive(Debug, Clone)]
pub struct ExecutionTracker {
    view: ExecutionView,
}

impl ExecutionTracker {
    /// Start tracking `execution_id` with a fresh view.
    pub fn new(execution_id: ExecutionId) -> Self {
        let mut tracker = Self {
            view: ExecutionView::default(),
        };
        tracker.reset(execution_id);
        tracker
    }

    /// Begin a new session for `execution_id`.
    ///
    /// Clears the event log, zeroes the percent and marks the push
    /// connection closed, whatever the previous session held.
    pub fn reset(&mut self, execution_id: ExecutionId) {
        self.view = ExecutionView {
            execution_id: Some(execution_id),
            ..ExecutionView::default()
        };
    }

    pub fn execution_id(&self) -> Option<ExecutionId> {
        self.view.execution_id
    }

    /// Append a streamed event.
    ///
    /// Moves the stage to the event's step and ratchets the percent up.
    /// An event without a usable percent leaves the percent unchanged.
    /// Never changes the lifecycle.
    pub fn apply_event(&mut self, event: ProgressEvent) {
        if let Some(percent) = event.reported_percent() {
            if percent > self.view.percent {
                self.view.percent = percent;
            }
        }
        self.view.stage = Some(event.step.clone());
        self.view.events.push(event);
    }

    /// Fold a status snapshot into the view.
    ///
    /// Returns `false` (and changes nothing) when the snapshot belongs to
    /// another execution or would move the view out of a terminal state.
    /// A `completed` snapshot closes any gap left by the last event by
    /// forcing the percent to 100; `failed` keeps the percent as is.
    pub fn apply_snapshot(&mut self, snapshot: &ExecutionStatus) -> bool {
        if self.view.execution_id != Some(snapshot.execution_id) {
            tracing::debug!(
                tracked = ?self.view.execution_id,
                received = snapshot.execution_id,
                "Ignoring status snapshot for another execution",
            );
            return false;
        }

        if self.view.status.is_terminal() && snapshot.status != self.view.status {
            tracing::debug!(
                execution_id = snapshot.execution_id,
                current = %self.view.status,
                received = %snapshot.status,
                "Ignoring status snapshot after terminal state",
            );
            return false;
        }

        self.view.status = snapshot.status;
        self.view.stage = snapshot.current_stage.clone();
        self.view.error_message = snapshot.error_message.clone();
        self.view.output_path = snapshot.output_path.clone();
        self.view.cost = snapshot.cost;
        self.view.topic = snapshot.topic.clone();

        if snapshot.status == Lifecycle::Completed && self.view.percent < PERCENT_MAX {
            self.view.percent = PERCENT_MAX;
        }
        true
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.view.connected = connected;
    }

    pub fn view(&self) -> &ExecutionView {
        &self.view
    }
}
