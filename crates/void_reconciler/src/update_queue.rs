//! Update queues
//!
//! Each stateful fiber owns an [`UpdateQueue`]: a base state plus a linear
//! list of base updates that were skipped by an earlier render. Newly issued
//! updates land in a [`PendingRing`] held by a [`SharedQueue`], which both
//! alternates of the fiber point at, so an update is never lost whichever
//! alternate ends up committed.
//!
//! Updates live in an arena and link to each other through handles. Lists
//! share tails between the current and work-in-progress queues; unreferenced
//! nodes are reclaimed by [`UpdateStore::collect`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use void_core::guard::catch_panic;
use void_core::{Error, Handle, HandleError, HandleMap};

use crate::element::{Element, Props};
use crate::fiber::FiberState;
use crate::lane::{Lane, Lanes};

/// Handle to an update
pub type UpdateId = Handle<Update>;

/// Handle to a shared queue
pub type SharedQueueId = Handle<SharedQueue>;

/// Completion callback of an update; runs after the update commits
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Functional state update
pub type StateFn = Arc<dyn Fn(&Value, &Props) -> Value + Send + Sync>;

/// Component state change
#[derive(Clone)]
pub enum StatePayload {
    /// Replace the state
    Replace(Value),
    /// Shallow-merge an object into the state
    Merge(Value),
    /// Compute the next state from the previous one
    Transition(StateFn),
    /// Re-render without changing state, bypassing `should_update`
    Force,
}

impl fmt::Debug for StatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatePayload::Replace(v) => write!(f, "Replace({v})"),
            StatePayload::Merge(v) => write!(f, "Merge({v})"),
            StatePayload::Transition(_) => write!(f, "Transition(..)"),
            StatePayload::Force => write!(f, "Force"),
        }
    }
}

/// What an update changes
#[derive(Clone, Debug)]
pub enum UpdatePayload {
    /// New root element
    Element(Option<Element>),
    /// Component state change
    State(StatePayload),
}

/// A queued state change
pub struct Update {
    pub lane: Lane,
    pub event_time: u64,
    pub payload: UpdatePayload,
    pub callback: Option<UpdateCallback>,
    pub next: Option<UpdateId>,
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("lane", &self.lane)
            .field("payload", &self.payload)
            .field("callback", &self.callback.is_some())
            .field("next", &self.next)
            .finish()
    }
}

/// Circular list of pending updates addressed by its last node
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingRing {
    last: Option<UpdateId>,
}

impl PendingRing {
    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// Append an update in O(1)
    pub fn absorb(&mut self, updates: &mut HandleMap<Update>, id: UpdateId) -> Result<(), HandleError> {
        match self.last {
            None => updates.try_get_mut(id)?.next = Some(id),
            Some(last) => {
                let first = updates.try_get(last)?.next;
                updates.try_get_mut(id)?.next = first;
                updates.try_get_mut(last)?.next = Some(id);
            }
        }
        self.last = Some(id);
        Ok(())
    }

    /// Take everything pending as a linear `first..=last` run
    pub fn drain(
        &mut self,
        updates: &mut HandleMap<Update>,
    ) -> Result<Option<(UpdateId, UpdateId)>, HandleError> {
        let Some(last) = self.last.take() else {
            return Ok(None);
        };
        let node = updates.try_get_mut(last)?;
        let first = node.next.unwrap_or(last);
        node.next = None;
        Ok(Some((first, last)))
    }

    fn mark(&self, updates: &HandleMap<Update>, live: &mut HashSet<UpdateId>) {
        let Some(last) = self.last else {
            return;
        };
        let mut cursor = Some(last);
        while let Some(id) = cursor {
            if !live.insert(id) {
                break;
            }
            cursor = updates.get(id).and_then(|u| u.next);
        }
    }
}

/// Pending updates shared by both alternates of a fiber
#[derive(Debug, Default)]
pub struct SharedQueue {
    pub pending: PendingRing,
    /// Lanes of transition updates still queued, for entanglement
    pub lanes: Lanes,
}

/// A fiber's update queue
#[derive(Debug, Clone)]
pub struct UpdateQueue {
    pub base_state: FiberState,
    pub first_base: Option<UpdateId>,
    pub last_base: Option<UpdateId>,
    pub shared: SharedQueueId,
    /// Processed updates whose callbacks run after commit
    pub callbacks: Vec<UpdateId>,
}

impl UpdateQueue {
    /// Copy for the other alternate; callbacks belong to one render only
    pub fn clone_for_work(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            first_base: self.first_base,
            last_base: self.last_base,
            shared: self.shared,
            callbacks: Vec::new(),
        }
    }
}

/// Result of processing a queue
#[derive(Debug)]
pub struct ProcessedQueue {
    pub state: FiberState,
    /// Lanes of updates skipped this render
    pub remaining_lanes: Lanes,
    /// A forced update was applied
    pub force: bool,
    /// Applied updates carry callbacks
    pub has_callbacks: bool,
}

/// Arena of updates and shared queues
#[derive(Debug, Default)]
pub struct UpdateStore {
    pub updates: HandleMap<Update>,
    pub shared: HandleMap<SharedQueue>,
}

impl UpdateStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an update
    pub fn create_update(
        &mut self,
        lane: Lane,
        event_time: u64,
        payload: UpdatePayload,
        callback: Option<UpdateCallback>,
    ) -> UpdateId {
        self.updates.insert(Update {
            lane,
            event_time,
            payload,
            callback,
            next: None,
        })
    }

    /// Fresh queue with its own shared pending ring
    pub fn create_queue(&mut self, base_state: FiberState) -> UpdateQueue {
        UpdateQueue {
            base_state,
            first_base: None,
            last_base: None,
            shared: self.shared.insert(SharedQueue::default()),
            callbacks: Vec::new(),
        }
    }

    /// Append an update to a shared pending ring
    pub fn absorb(&mut self, shared: SharedQueueId, update: UpdateId, lane: Lane) -> Result<(), HandleError> {
        let queue = self.shared.try_get_mut(shared)?;
        queue.pending.absorb(&mut self.updates, update)?;
        if lane.is_transition() {
            queue.lanes |= lane;
        }
        Ok(())
    }

    /// Lanes still queued on a shared queue
    pub fn shared_lanes(&self, shared: SharedQueueId) -> Lanes {
        self.shared.get(shared).map(|q| q.lanes).unwrap_or_default()
    }

    /// Replace the lanes recorded on a shared queue
    pub fn set_shared_lanes(&mut self, shared: SharedQueueId, lanes: Lanes) {
        if let Some(queue) = self.shared.get_mut(shared) {
            queue.lanes = lanes;
        }
    }

    /// Compute the next state from `queue` for `render_lanes`.
    ///
    /// Pending updates are moved into the base list of both `queue` and
    /// `current` first. Updates outside `render_lanes` are skipped and stay
    /// in the base list; once one is skipped, every later update is kept too
    /// (with no lane, so it always re-applies) and the base state freezes, so
    /// a later render replays them in their original order.
    pub fn process(
        &mut self,
        queue: &mut UpdateQueue,
        current: Option<&mut UpdateQueue>,
        memoized: &FiberState,
        props: &Props,
        render_lanes: Lanes,
    ) -> Result<ProcessedQueue, Error> {
        let mut first_base = queue.first_base;
        let mut last_base = queue.last_base;

        let pending = {
            let shared = self.shared.try_get_mut(queue.shared)?;
            shared.pending.drain(&mut self.updates)?
        };
        if let Some((first_pending, last_pending)) = pending {
            self.append(&mut first_base, &mut last_base, first_pending, last_pending)?;
            if let Some(current) = current {
                if current.last_base != last_base {
                    let (mut first, mut last) = (current.first_base, current.last_base);
                    self.append(&mut first, &mut last, first_pending, last_pending)?;
                    current.first_base = first;
                    current.last_base = last;
                }
            }
        }

        let Some(first) = first_base else {
            return Ok(ProcessedQueue {
                state: memoized.clone(),
                remaining_lanes: Lanes::NONE,
                force: false,
                has_callbacks: false,
            });
        };

        let mut state = queue.base_state.clone();
        let mut remaining_lanes = Lanes::NONE;
        let mut new_base_state = None;
        let (mut new_first, mut new_last) = (None, None);
        let mut force = false;
        let mut has_callbacks = false;

        let mut cursor = Some(first);
        while let Some(id) = cursor {
            let (lane, event_time, payload, callback, next) = {
                let update = self.updates.try_get(id)?;
                (
                    update.lane,
                    update.event_time,
                    update.payload.clone(),
                    update.callback.clone(),
                    update.next,
                )
            };

            if !lane.is_subset_of(render_lanes) {
                let clone = self.create_update(lane, event_time, payload, callback);
                if new_last.is_none() {
                    new_base_state = Some(state.clone());
                }
                self.append(&mut new_first, &mut new_last, clone, clone)?;
                remaining_lanes |= lane;
            } else {
                if new_last.is_some() {
                    let clone = self.create_update(Lanes::NONE, event_time, payload.clone(), None);
                    self.append(&mut new_first, &mut new_last, clone, clone)?;
                }
                state = apply_update(&payload, state, props, &mut force)?;
                if callback.is_some() {
                    queue.callbacks.push(id);
                    has_callbacks = true;
                }
            }

            if Some(id) == last_base {
                break;
            }
            cursor = next;
        }

        queue.base_state = new_base_state.unwrap_or_else(|| state.clone());
        queue.first_base = new_first;
        queue.last_base = new_last;
        if new_first.is_none() {
            self.set_shared_lanes(queue.shared, Lanes::NONE);
        }

        Ok(ProcessedQueue {
            state,
            remaining_lanes,
            force,
            has_callbacks,
        })
    }

    fn append(
        &mut self,
        first: &mut Option<UpdateId>,
        last: &mut Option<UpdateId>,
        run_first: UpdateId,
        run_last: UpdateId,
    ) -> Result<(), HandleError> {
        match *last {
            None => *first = Some(run_first),
            Some(tail) => self.updates.try_get_mut(tail)?.next = Some(run_first),
        }
        *last = Some(run_last);
        Ok(())
    }

    /// Free every update and shared queue not reachable from `queues` or
    /// `extra`. Returns the number of updates freed.
    pub fn collect<'a>(
        &mut self,
        queues: impl IntoIterator<Item = &'a UpdateQueue>,
        extra: impl IntoIterator<Item = UpdateId>,
    ) -> usize {
        let mut live_updates: HashSet<UpdateId> = extra.into_iter().collect();
        let mut live_shared = HashSet::new();

        for queue in queues {
            live_shared.insert(queue.shared);
            live_updates.extend(queue.callbacks.iter().copied());
            let mut cursor = queue.first_base;
            while let Some(id) = cursor {
                if !live_updates.insert(id) {
                    break;
                }
                cursor = self.updates.get(id).and_then(|u| u.next);
            }
        }
        for id in &live_shared {
            if let Some(shared) = self.shared.get(*id) {
                shared.pending.mark(&self.updates, &mut live_updates);
            }
        }

        self.shared.retain(|id, _| live_shared.contains(&id));
        self.updates.retain(|id, _| live_updates.contains(&id))
    }
}

fn apply_update(
    payload: &UpdatePayload,
    prev: FiberState,
    props: &Props,
    force: &mut bool,
) -> Result<FiberState, Error> {
    let next = match payload {
        UpdatePayload::Element(element) => FiberState::Root(element.clone()),
        UpdatePayload::State(StatePayload::Replace(value)) => FiberState::Component(value.clone()),
        UpdatePayload::State(StatePayload::Merge(partial)) => {
            FiberState::Component(merge_shallow(prev.value(), partial))
        }
        UpdatePayload::State(StatePayload::Transition(f)) => {
            let value = catch_panic("state update", || f(prev.value(), props))?;
            FiberState::Component(value)
        }
        UpdatePayload::State(StatePayload::Force) => {
            *force = true;
            prev
        }
    };
    Ok(next)
}

fn merge_shallow(prev: &Value, partial: &Value) -> Value {
    match (prev, partial) {
        (Value::Object(base), Value::Object(fields)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (k, v) in fields {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => partial.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(store: &mut UpdateStore, queue: &UpdateQueue, lane: Lane, value: Value) -> UpdateId {
        let id = store.create_update(
            lane,
            0,
            UpdatePayload::State(StatePayload::Replace(value)),
            None,
        );
        store.absorb(queue.shared, id, lane).unwrap();
        id
    }

    fn value(state: &FiberState) -> Value {
        state.value().clone()
    }

    #[test]
    fn test_ring_absorb_drain_keeps_order() {
        let mut store = UpdateStore::new();
        let queue = store.create_queue(FiberState::Component(json!(0)));
        let a = set(&mut store, &queue, Lanes::DEFAULT, json!(1));
        let _b = set(&mut store, &queue, Lanes::DEFAULT, json!(2));
        let c = set(&mut store, &queue, Lanes::DEFAULT, json!(3));

        let shared = store.shared.get_mut(queue.shared).unwrap();
        let (first, last) = shared.pending.drain(&mut store.updates).unwrap().unwrap();
        assert_eq!(first, a);
        assert_eq!(last, c);
        assert!(shared.pending.is_empty());
        assert!(store.updates.get(last).unwrap().next.is_none());
    }

    #[test]
    fn test_process_applies_in_order() {
        let mut store = UpdateStore::new();
        let mut queue = store.create_queue(FiberState::Component(json!({"a": 1})));
        store_merge(&mut store, &queue, json!({"b": 2}));
        store_merge(&mut store, &queue, json!({"a": 3}));
        let memo = queue.base_state.clone();
        let out = store
            .process(&mut queue, None, &memo, &Props::new(), Lanes::DEFAULT)
            .unwrap();
        assert_eq!(value(&out.state), json!({"a": 3, "b": 2}));
        assert_eq!(out.remaining_lanes, Lanes::NONE);
        assert!(queue.first_base.is_none());
    }

    fn store_merge(store: &mut UpdateStore, queue: &UpdateQueue, partial: Value) {
        let id = store.create_update(
            Lanes::DEFAULT,
            0,
            UpdatePayload::State(StatePayload::Merge(partial)),
            None,
        );
        store.absorb(queue.shared, id, Lanes::DEFAULT).unwrap();
    }

    #[test]
    fn test_skipped_update_rebases() {
        // Transition update A is skipped by a sync render; sync update B
        // applies now, and replays after A when the transition renders.
        let mut store = UpdateStore::new();
        let mut queue = store.create_queue(FiberState::Component(json!("")));
        let append = |suffix: &'static str| -> StateFn {
            Arc::new(move |prev: &Value, _: &Props| {
                json!(format!("{}{}", prev.as_str().unwrap_or(""), suffix))
            })
        };
        for (lane, suffix) in [(Lanes::TRANSITION_LANE_1, "A"), (Lanes::SYNC, "B")] {
            let id = store.create_update(
                lane,
                0,
                UpdatePayload::State(StatePayload::Transition(append(suffix))),
                None,
            );
            store.absorb(queue.shared, id, lane).unwrap();
        }

        let memo = queue.base_state.clone();
        let sync = store
            .process(&mut queue, None, &memo, &Props::new(), Lanes::SYNC)
            .unwrap();
        assert_eq!(value(&sync.state), json!("B"));
        assert_eq!(sync.remaining_lanes, Lanes::TRANSITION_LANE_1);
        assert_eq!(value(&queue.base_state), json!(""));

        let full = store
            .process(
                &mut queue,
                None,
                &sync.state,
                &Props::new(),
                Lanes::SYNC | Lanes::TRANSITION_LANE_1,
            )
            .unwrap();
        assert_eq!(value(&full.state), json!("AB"));
        assert!(queue.first_base.is_none());
    }

    #[test]
    fn test_pending_copied_to_current_queue() {
        let mut store = UpdateStore::new();
        let mut current = store.create_queue(FiberState::Component(json!(0)));
        let mut work = current.clone_for_work();
        set(&mut store, &work, Lanes::IDLE, json!(1));
        let memo = work.base_state.clone();
        store
            .process(&mut work, Some(&mut current), &memo, &Props::new(), Lanes::SYNC)
            .unwrap();
        // The skipped update survives on the current queue as well
        assert!(current.first_base.is_some());
        assert!(work.first_base.is_some());
    }

    #[test]
    fn test_force_and_callbacks() {
        let mut store = UpdateStore::new();
        let mut queue = store.create_queue(FiberState::Component(json!(5)));
        let id = store.create_update(
            Lanes::SYNC,
            0,
            UpdatePayload::State(StatePayload::Force),
            Some(Arc::new(|| {})),
        );
        store.absorb(queue.shared, id, Lanes::SYNC).unwrap();
        let memo = queue.base_state.clone();
        let out = store
            .process(&mut queue, None, &memo, &Props::new(), Lanes::SYNC)
            .unwrap();
        assert!(out.force);
        assert!(out.has_callbacks);
        assert_eq!(queue.callbacks, vec![id]);
        assert_eq!(value(&out.state), json!(5));
    }

    #[test]
    fn test_panicking_transition_is_reported() {
        let mut store = UpdateStore::new();
        let mut queue = store.create_queue(FiberState::Component(json!(0)));
        let f: StateFn = Arc::new(|_: &Value, _: &Props| panic!("bad reducer"));
        let id = store.create_update(
            Lanes::SYNC,
            0,
            UpdatePayload::State(StatePayload::Transition(f)),
            None,
        );
        store.absorb(queue.shared, id, Lanes::SYNC).unwrap();
        let memo = queue.base_state.clone();
        let err = store
            .process(&mut queue, None, &memo, &Props::new(), Lanes::SYNC)
            .unwrap_err();
        assert!(matches!(err, Error::Callback(_)));
    }

    #[test]
    fn test_collect_frees_processed_updates() {
        let mut store = UpdateStore::new();
        let mut queue = store.create_queue(FiberState::Component(json!(0)));
        set(&mut store, &queue, Lanes::SYNC, json!(1));
        set(&mut store, &queue, Lanes::IDLE, json!(2));
        let memo = queue.base_state.clone();
        store
            .process(&mut queue, None, &memo, &Props::new(), Lanes::SYNC)
            .unwrap();
        let pending = set(&mut store, &queue, Lanes::SYNC, json!(3));

        let freed = store.collect([&queue], []);
        // Both originals are gone; the skipped clone and the pending update stay
        assert_eq!(freed, 2);
        assert_eq!(store.updates.len(), 2);
        assert!(store.updates.contains(pending));

        let freed_all = store.collect(std::iter::empty(), []);
        assert_eq!(freed_all, 2);
        assert!(store.shared.is_empty());
    }
}
