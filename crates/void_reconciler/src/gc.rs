//! Arena garbage collection
//!
//! Discarded renders and replaced alternates leave fibers, host instances,
//! component slots and updates behind in their arenas. A mark-sweep pass
//! keeps everything reachable from a root's committed tree (plus alternates)
//! and from the render in progress, and frees the rest.

use std::collections::HashSet;

use crate::fiber::FiberId;
use crate::host::{Host, InstanceId};
use crate::reconciler::Reconciler;

impl<H: Host> Reconciler<H> {
    /// Free everything no longer reachable. Returns the number of fibers
    /// freed.
    pub fn collect_garbage(&mut self) -> usize {
        let mut live: HashSet<FiberId> = HashSet::new();
        let mut starts: Vec<FiberId> = self.roots.iter().map(|(_, r)| r.current).collect();
        starts.extend(self.session.wip_root);
        if let Some(pending) = &self.pending_passive {
            starts.push(pending.finished);
        }
        for start in starts {
            self.mark_tree(start, &mut live);
        }

        let fibers_freed = self.fibers.retain(|id, _| live.contains(&id));

        let mut live_instances: HashSet<InstanceId> =
            self.roots.iter().map(|(_, r)| r.container).collect();
        let mut live_slots = HashSet::new();
        for (_, fiber) in self.fibers.iter() {
            live_instances.extend(fiber.kind.instance());
            live_slots.extend(fiber.kind.slot());
        }
        self.instances
            .retain(|id, _| live_instances.contains(&id.cast()));
        self.components.retain(|id, _| live_slots.contains(&id));

        let queues = self.fibers.iter().filter_map(|(_, f)| f.update_queue.as_ref());
        let updates_freed = self.updates.collect(queues, self.concurrent.update_ids());

        self.stats.fibers_collected += fibers_freed as u64;
        self.stats.updates_collected += updates_freed as u64;
        if fibers_freed > 0 || updates_freed > 0 {
            log::debug!("Collected {fibers_freed} fibers and {updates_freed} updates");
        }
        fibers_freed
    }

    /// Collect if the arenas have grown past the current mark
    pub(crate) fn maybe_collect_garbage(&mut self) {
        let size = self.fibers.len() + self.updates.updates.len();
        if size <= self.gc_mark {
            return;
        }
        self.collect_garbage();
        let remaining = self.fibers.len() + self.updates.updates.len();
        self.gc_mark = self.config.gc_threshold.max(remaining * 2);
    }

    /// Mark `start`, its descendants and all of their alternates
    fn mark_tree(&self, start: FiberId, live: &mut HashSet<FiberId>) {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Ok(fiber) = self.fibers.get(id) else {
                continue;
            };
            if !visited.insert(id) {
                continue;
            }
            live.insert(id);
            live.extend(fiber.alternate);
            stack.extend(fiber.child);
            stack.extend(fiber.sibling.filter(|_| id != start));
        }
    }
}
