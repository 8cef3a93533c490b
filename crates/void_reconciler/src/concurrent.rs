//! Update intake
//!
//! Updates are not appended to a fiber's pending ring the moment they are
//! issued. They go into a side table first and are moved into the rings only
//! when no render is in progress: right away when the reconciler is idle, or
//! when the current render completes or restarts. A render in progress
//! therefore never sees a queue change under it.

use crate::error::{ReconcileError, Result};
use crate::fiber::{FiberId, FiberKind};
use crate::host::Host;
use crate::lane::{Lane, Lanes};
use crate::reconciler::Reconciler;
use crate::root::RootId;
use crate::update_queue::{SharedQueueId, UpdateId, UpdatePayload};

#[derive(Debug, Clone, Copy)]
struct ConcurrentEntry {
    fiber: FiberId,
    update: Option<UpdateId>,
    lane: Lane,
}

/// Updates issued but not yet in their fibers' pending rings
#[derive(Debug, Default)]
pub(crate) struct ConcurrentUpdates {
    entries: Vec<ConcurrentEntry>,
    lanes: Lanes,
}

impl ConcurrentUpdates {
    fn push(&mut self, fiber: FiberId, update: Option<UpdateId>, lane: Lane) {
        self.entries.push(ConcurrentEntry {
            fiber,
            update,
            lane,
        });
        self.lanes |= lane;
    }

    fn take(&mut self) -> Vec<ConcurrentEntry> {
        self.lanes = Lanes::NONE;
        std::mem::take(&mut self.entries)
    }

    /// Lanes of the buffered updates
    pub fn lanes(&self) -> Lanes {
        self.lanes
    }

    /// Fibers and lanes of the buffered transition updates
    fn transitions(&self) -> impl Iterator<Item = (FiberId, Lane)> + '_ {
        self.entries
            .iter()
            .filter(|e| e.update.is_some() && e.lane.is_transition())
            .map(|e| (e.fiber, e.lane))
    }

    /// Buffered updates, kept alive by garbage collection
    pub fn update_ids(&self) -> impl Iterator<Item = UpdateId> + '_ {
        self.entries.iter().filter_map(|e| e.update)
    }
}

impl<H: Host> Reconciler<H> {
    /// Queue `update` on `fiber` and schedule its root
    pub(crate) fn enqueue_update(
        &mut self,
        fiber: FiberId,
        update: UpdateId,
        lane: Lane,
    ) -> Result<RootId> {
        let root = self.root_of(fiber)?;
        self.concurrent.push(fiber, Some(update), lane);
        {
            let alternate = {
                let f = self.fibers.get_mut(fiber)?;
                f.lanes |= lane;
                f.alternate
            };
            if let Some(alt) = alternate {
                if let Ok(a) = self.fibers.get_mut(alt) {
                    a.lanes |= lane;
                }
            }
        }

        if self.session.root.is_none() {
            self.finish_queueing_concurrent_updates()?;
        }

        self.schedule_update_on_fiber(root, lane)?;
        if lane.is_transition() && self.config.entangle_transitions {
            self.entangle_transitions(root, fiber, lane)?;
        }
        Ok(root)
    }

    /// Mark the lane on the root and make sure a task will work on it
    fn schedule_update_on_fiber(&mut self, root: RootId, lane: Lane) -> Result<()> {
        let now = self.scheduler.now();
        self.root_mut(root)?.lanes.mark_updated(lane, now);
        log::trace!("Scheduled {lane:?} on {root:?}");
        self.ensure_root_is_scheduled(root)
    }

    /// Tie a new transition lane to the transitions still queued on the same
    /// fiber, so they finish together. Updates buffered behind a render in
    /// progress count as queued.
    fn entangle_transitions(&mut self, root: RootId, fiber: FiberId, lane: Lane) -> Result<()> {
        let Some(shared) = self.shared_queue_of(fiber)? else {
            return Ok(());
        };
        let buffered = self
            .concurrent
            .transitions()
            .filter(|(f, _)| matches!(self.shared_queue_of(*f), Ok(Some(s)) if s == shared))
            .fold(Lanes::NONE, |acc, (_, l)| acc | l);

        let record = self.roots.get_mut(root).ok_or(ReconcileError::StaleRoot(root))?;
        let queued = (self.updates.shared_lanes(shared) | buffered) & record.lanes.pending;
        let entangled = queued | lane;
        self.updates.set_shared_lanes(shared, entangled);
        if entangled != lane {
            log::debug!("Entangling transition lanes {entangled:?}");
            record.lanes.mark_entangled(entangled);
        }
        Ok(())
    }

    fn shared_queue_of(&self, fiber: FiberId) -> Result<Option<SharedQueueId>> {
        Ok(self.fibers.get(fiber)?.update_queue.as_ref().map(|q| q.shared))
    }

    /// Move every buffered update into its fiber's pending ring and mark the
    /// path up to the root
    pub(crate) fn finish_queueing_concurrent_updates(&mut self) -> Result<()> {
        for entry in self.concurrent.take() {
            if !self.fibers.contains(entry.fiber) {
                log::warn!("Dropping update for a freed fiber {:?}", entry.fiber);
                continue;
            }
            if let Some(update) = entry.update {
                let shared = self
                    .fibers
                    .get(entry.fiber)?
                    .update_queue
                    .as_ref()
                    .map(|q| q.shared)
                    .ok_or_else(|| {
                        ReconcileError::Structural(format!(
                            "update queued on {:?}, which has no update queue",
                            entry.fiber
                        ))
                    })?;
                self.updates.absorb(shared, update, entry.lane)?;
            }
            self.mark_update_lane_from_fiber_to_root(entry.fiber, entry.lane)?;
        }
        Ok(())
    }

    /// Add `lane` to the fiber and to `child_lanes` of every ancestor, on
    /// both alternates
    fn mark_update_lane_from_fiber_to_root(&mut self, fiber: FiberId, lane: Lane) -> Result<()> {
        let (alternate, mut parent) = {
            let f = self.fibers.get_mut(fiber)?;
            f.lanes |= lane;
            (f.alternate, f.parent)
        };
        if let Some(alt) = alternate {
            if let Ok(a) = self.fibers.get_mut(alt) {
                a.lanes |= lane;
            }
        }
        while let Some(id) = parent {
            let (alternate, next) = {
                let f = self.fibers.get_mut(id)?;
                f.child_lanes |= lane;
                (f.alternate, f.parent)
            };
            if let Some(alt) = alternate {
                if let Ok(a) = self.fibers.get_mut(alt) {
                    a.child_lanes |= lane;
                }
            }
            parent = next;
        }
        Ok(())
    }

    /// Root a fiber belongs to
    pub(crate) fn root_of(&self, fiber: FiberId) -> Result<RootId> {
        let mut node = fiber;
        loop {
            let f = self.fibers.get(node)?;
            match f.parent {
                Some(parent) => node = parent,
                None => {
                    return match f.kind {
                        FiberKind::Root { root } => Ok(root),
                        _ => Err(ReconcileError::Structural(format!(
                            "{fiber:?} is not attached to a root"
                        ))),
                    }
                }
            }
        }
    }

    /// Turn everything posted through updaters into queued updates
    pub(crate) fn drain_external_updates(&mut self) -> Result<()> {
        let entries = self.inbox.drain();
        if entries.is_empty() {
            return Ok(());
        }
        let now = self.scheduler.now();
        for entry in entries {
            if !self.fibers.contains(entry.fiber) {
                log::warn!("Dropping update for unmounted component {:?}", entry.fiber);
                continue;
            }
            let update = self.updates.create_update(
                entry.lane,
                now,
                UpdatePayload::State(entry.payload),
                entry.callback,
            );
            match self.enqueue_update(entry.fiber, update, entry.lane) {
                Ok(_) => {}
                Err(e @ (ReconcileError::Structural(_) | ReconcileError::Handle(_))) => {
                    log::warn!("Dropping update for {:?}: {e}", entry.fiber);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
