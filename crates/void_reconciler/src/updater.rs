//! Component update handles
//!
//! An [`Updater`] schedules state changes on one mounted component. It is
//! `Send + Sync`: updates are posted into an [`UpdateInbox`] shared with the
//! reconciler, which drains it into the concurrent update table at every task
//! boundary.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::element::Props;
use crate::fiber::FiberId;
use crate::lane::{EventPriority, Lane, Lanes};
use crate::update_queue::{StatePayload, UpdateCallback};

/// An update posted through an [`Updater`], not yet queued on its fiber
pub(crate) struct InboxEntry {
    pub fiber: FiberId,
    pub lane: Lane,
    pub payload: StatePayload,
    pub callback: Option<UpdateCallback>,
}

/// Updates posted by updaters, plus the lane updates are currently issued at
#[derive(Default)]
pub struct UpdateInbox {
    entries: Mutex<Vec<InboxEntry>>,
    ambient_lane: AtomicU32,
}

impl UpdateInbox {
    /// Create an empty inbox
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, entry: InboxEntry) {
        self.entries.lock().push(entry);
    }

    pub(crate) fn drain(&self) -> Vec<InboxEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of posted updates not yet drained
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lane for updates issued now; `NONE` when no priority is set
    pub fn ambient_lane(&self) -> Lane {
        Lanes::from_bits(self.ambient_lane.load(Ordering::Acquire))
    }

    /// Set the ambient lane, returning the previous one
    pub(crate) fn set_ambient_lane(&self, lane: Lane) -> Lane {
        Lanes::from_bits(self.ambient_lane.swap(lane.bits(), Ordering::AcqRel))
    }
}

impl fmt::Debug for UpdateInbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateInbox")
            .field("pending", &self.len())
            .field("ambient_lane", &self.ambient_lane())
            .finish()
    }
}

/// Schedules state updates on one component
#[derive(Clone)]
pub struct Updater {
    fiber: FiberId,
    inbox: Arc<UpdateInbox>,
    lane: Option<Lane>,
}

impl Updater {
    pub(crate) fn new(fiber: FiberId, inbox: Arc<UpdateInbox>) -> Self {
        Self {
            fiber,
            inbox,
            lane: None,
        }
    }

    /// Fiber this updater targets
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// Copy that issues every update at `priority`
    pub fn with_priority(&self, priority: EventPriority) -> Self {
        self.with_lane(priority.lane())
    }

    /// Copy that issues every update on `lane`
    pub fn with_lane(&self, lane: Lane) -> Self {
        Self {
            lane: Some(lane.highest_priority_lane()),
            ..self.clone()
        }
    }

    /// Replace the state
    pub fn set_state(&self, state: Value) -> Lane {
        self.enqueue(StatePayload::Replace(state), None)
    }

    /// Shallow-merge an object into the state
    pub fn merge_state(&self, partial: Value) -> Lane {
        self.enqueue(StatePayload::Merge(partial), None)
    }

    /// Compute the next state from the previous state and current props
    pub fn update<F>(&self, f: F) -> Lane
    where
        F: Fn(&Value, &Props) -> Value + Send + Sync + 'static,
    {
        self.enqueue(StatePayload::Transition(Arc::new(f)), None)
    }

    /// Re-render even if `should_update` says no
    pub fn force_update(&self) -> Lane {
        self.enqueue(StatePayload::Force, None)
    }

    /// Post any state change, with an optional callback run after it commits
    pub fn enqueue(&self, payload: StatePayload, callback: Option<UpdateCallback>) -> Lane {
        let lane = self.lane();
        self.inbox.push(InboxEntry {
            fiber: self.fiber,
            lane,
            payload,
            callback,
        });
        lane
    }

    fn lane(&self) -> Lane {
        if let Some(lane) = self.lane {
            return lane;
        }
        let ambient = self.inbox.ambient_lane();
        if ambient.is_empty() {
            Lanes::DEFAULT
        } else {
            ambient
        }
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("fiber", &self.fiber)
            .field("lane", &self.lane)
            .finish()
    }
}
