//! Commit phase
//!
//! Applies a finished tree to the host in one uninterrupted pass, then swaps
//! it in as the root's current tree.
//!
//! 1. **Mutation**: deletions (unmount callbacks run before host nodes are
//!    detached), then placements, then attribute and text updates
//! 2. **Layout**: `on_mount` / `on_update`, update callbacks, ref attachment,
//!    children before parents
//! 3. **Passive**: effects and their cleanups, in a later task unless
//!    configured to run synchronously
//!
//! Every pass walks only the parts of the tree whose `subtree_flags`
//! mention it, and clears the flags it has handled.

use std::any::Any;
use std::rc::Rc;

use void_core::guard::catch_panic;
use void_core::CallbackError;
use void_scheduler::PriorityLevel;

use crate::begin_work::ref_changed;
use crate::component::{Component, LifecycleContext};
use crate::config::PassiveEffectMode;
use crate::element::Props;
use crate::error::{ReconcileError, Result};
use crate::fiber::{ComponentSlotId, Fiber, FiberId, FiberKind};
use crate::flags::Flags;
use crate::host::{Host, InstanceId};
use crate::lane::{lanes_to_event_priority, EventPriority, Lanes};
use crate::reconciler::{NestedUpdates, PendingPassive, Reconciler, RootTask};
use crate::root::RootId;

/// One step of tearing down a deleted subtree
enum DeletionStep {
    /// Unmount a fiber; `Option` is the host node its topmost host
    /// descendants are detached from
    Visit(FiberId, Option<InstanceId>),
    /// Detach a host node once everything below it has unmounted
    Detach(InstanceId, InstanceId),
}

impl<H: Host> Reconciler<H> {
    /// Commit the root's finished work
    pub(crate) fn commit_root(&mut self, root: RootId) -> Result<()> {
        let (finished, lanes) = {
            let record = self.root_mut(root)?;
            (
                record.finished_work.take(),
                std::mem::take(&mut record.finished_lanes),
            )
        };
        let Some(finished) = finished else {
            return Ok(());
        };
        log::debug!("Committing {root:?} at {lanes:?}");

        let (remaining, has_passive) = {
            let f = self.fibers.get(finished)?;
            (
                f.lanes | f.child_lanes | self.concurrent.lanes(),
                (f.flags | f.subtree_flags).intersects(Flags::PASSIVE_MASK),
            )
        };
        self.root_mut(root)?.lanes.mark_finished(remaining);

        let previous_lane = self.inbox.set_ambient_lane(EventPriority::Discrete.lane());
        self.host.prepare_for_commit();
        let mutation = self.commit_mutation_effects(finished);
        self.host.reset_after_commit();
        if let Err(e) = mutation {
            self.inbox.set_ambient_lane(previous_lane);
            return Err(e);
        }

        self.root_mut(root)?.current = finished;

        let layout = self.commit_layout_effects(finished);
        self.inbox.set_ambient_lane(previous_lane);
        layout?;
        self.stats.commits += 1;

        if has_passive || !self.passive_unmounts.is_empty() {
            self.pending_passive = Some(PendingPassive { finished, lanes });
            match self.config.passive_effects {
                PassiveEffectMode::Synchronous => {
                    self.flush_passive_effects()?;
                }
                PassiveEffectMode::Deferred => {
                    self.scheduler
                        .schedule(PriorityLevel::Normal, RootTask::PassiveEffects);
                }
            }
        }

        self.maybe_collect_garbage();
        self.drain_external_updates()?;
        self.check_nested_updates(root)?;
        self.ensure_root_is_scheduled(root)
    }

    /// Fail a root that keeps re-committing synchronously
    fn check_nested_updates(&mut self, root: RootId) -> Result<()> {
        if !self.root_ref(root)?.lanes.pending.includes_some(Lanes::SYNC) {
            self.nested = NestedUpdates::default();
            return Ok(());
        }
        if self.nested.root == Some(root) {
            self.nested.count += 1;
        } else {
            self.nested = NestedUpdates {
                root: Some(root),
                count: 1,
            };
        }
        if self.nested.count > self.config.nested_update_limit {
            let count = self.nested.count;
            self.nested = NestedUpdates::default();
            log::error!("{root:?} re-rendered synchronously {count} times in a row");
            self.fail_root(root);
            return Err(ReconcileError::NestedUpdateLimit(count));
        }
        Ok(())
    }

    /// Fibers below `root` (inclusive) whose flags intersect `mask`,
    /// children before parents
    fn collect_effects(&self, root: FiberId, mask: Flags) -> Result<Vec<FiberId>> {
        let mut out = Vec::new();
        // `true` once the fiber's children have been pushed
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let f = self.fibers.get(id)?;
            if expanded {
                if f.flags.intersects(mask) {
                    out.push(id);
                }
                continue;
            }
            stack.push((id, true));
            if f.subtree_flags.intersects(mask) {
                let children = self.fibers.children(id)?;
                stack.extend(children.into_iter().rev().map(|child| (child, false)));
            }
        }
        Ok(out)
    }

    fn commit_mutation_effects(&mut self, finished: FiberId) -> Result<()> {
        let f = self.fibers.get(finished)?;
        if !(f.flags | f.subtree_flags).intersects(Flags::MUTATION_MASK) {
            log::trace!("No host mutations in {finished:?}");
            return Ok(());
        }

        for parent in self.collect_effects(finished, Flags::CHILD_DELETION)? {
            let deletions = {
                let f = self.fibers.get_mut(parent)?;
                f.flags.remove(Flags::CHILD_DELETION);
                std::mem::take(&mut f.deletions)
            };
            for deleted in deletions {
                self.commit_deletion(parent, deleted)?;
            }
        }

        for fiber in self.collect_effects(finished, Flags::PLACEMENT)? {
            self.commit_placement(fiber)?;
            self.fibers.get_mut(fiber)?.flags.remove(Flags::PLACEMENT);
        }

        for fiber in self.collect_effects(finished, Flags::UPDATE | Flags::REF)? {
            self.commit_host_update(fiber)?;
        }
        Ok(())
    }

    /// Nearest host instance at or above `start`
    fn find_host_parent(&self, start: FiberId, for_fiber: FiberId) -> Result<InstanceId> {
        let mut node = Some(start);
        while let Some(id) = node {
            let f = self.fibers.get(id)?;
            match &f.kind {
                FiberKind::Host {
                    instance: Some(instance),
                    ..
                } => return Ok(*instance),
                FiberKind::Root { root } => return Ok(self.root_ref(*root)?.container),
                _ => node = f.parent,
            }
        }
        Err(ReconcileError::HostParentNotFound(for_fiber))
    }

    fn commit_deletion(&mut self, parent: FiberId, deleted: FiberId) -> Result<()> {
        let host_parent = self.find_host_parent(parent, deleted)?;
        log::trace!("Deleting {deleted:?}");
        self.commit_deletion_effects(host_parent, deleted)?;
        self.release_subtree(deleted)
    }

    /// Unmount callbacks and host detachment for a deleted subtree. Only the
    /// topmost host nodes are detached; their descendants go with them, after
    /// every unmount callback below them has run.
    fn commit_deletion_effects(&mut self, host_parent: InstanceId, deleted: FiberId) -> Result<()> {
        let mut stack = vec![DeletionStep::Visit(deleted, Some(host_parent))];
        while let Some(step) = stack.pop() {
            let (fiber, host_parent) = match step {
                DeletionStep::Detach(parent, child) => {
                    self.remove_host_child(parent, child)?;
                    continue;
                }
                DeletionStep::Visit(fiber, host_parent) => (fiber, host_parent),
            };

            let kind = self.fibers.get(fiber)?.kind.clone();
            let children_host_parent = match kind {
                FiberKind::Host { instance, .. } => {
                    if let Some(node_ref) = &self.fibers.get(fiber)?.node_ref {
                        node_ref.set(None);
                    }
                    if let (Some(parent), Some(child)) = (host_parent, instance) {
                        stack.push(DeletionStep::Detach(parent, child));
                    }
                    None
                }
                FiberKind::Text { instance } => {
                    if let (Some(parent), Some(child)) = (host_parent, instance) {
                        self.remove_host_child(parent, child)?;
                    }
                    continue;
                }
                FiberKind::Component { component, slot } => {
                    if let Some(slot) = slot {
                        self.commit_unmount(fiber, component.as_ref(), slot)?;
                    }
                    host_parent
                }
                FiberKind::Root { .. } | FiberKind::Fragment => host_parent,
            };

            let children = self.fibers.children(fiber)?;
            stack.extend(
                children
                    .into_iter()
                    .rev()
                    .map(|child| DeletionStep::Visit(child, children_host_parent)),
            );
        }
        Ok(())
    }

    fn commit_unmount(
        &mut self,
        fiber: FiberId,
        component: &dyn Component,
        slot: ComponentSlotId,
    ) -> Result<()> {
        let (props, state) = {
            let f = self.fibers.get(fiber)?;
            (f.memoized_props.clone(), f.memoized_state.clone())
        };
        let (updater, cleanup) = {
            let s = self.components.try_get_mut(slot)?;
            (s.updater.clone(), s.passive_cleanup.take())
        };
        let ctx = LifecycleContext::new(&props, state.value(), &updater);
        if let Err(e) = catch_panic("on_will_unmount", || component.on_will_unmount(&ctx)) {
            self.report_callback_error(component.name(), &e);
        }
        if let Some(cleanup) = cleanup {
            self.passive_unmounts
                .push((component.name().to_string(), cleanup));
        }
        Ok(())
    }

    fn remove_host_child(&mut self, parent: InstanceId, child: InstanceId) -> Result<()> {
        let p = self.instances.try_get(parent.cast())?;
        let c = self.instances.try_get(child.cast())?;
        self.host.remove_child(p, c);
        Ok(())
    }

    /// Free a deleted subtree's fibers along with their alternates, host
    /// instances and component slots
    fn release_subtree(&mut self, deleted: FiberId) -> Result<()> {
        for id in self.fibers.subtree(deleted)? {
            let Some(fiber) = self.fibers.remove(id) else {
                continue;
            };
            if let Some(alt) = fiber.alternate {
                if let Some(alternate) = self.fibers.remove(alt) {
                    self.release_resources(&alternate);
                }
            }
            self.release_resources(&fiber);
        }
        Ok(())
    }

    fn release_resources(&mut self, fiber: &Fiber) {
        if let Some(instance) = fiber.kind.instance() {
            self.instances.remove(instance.cast());
        }
        if let Some(slot) = fiber.kind.slot() {
            self.components.remove(slot);
        }
    }

    fn commit_placement(&mut self, fiber: FiberId) -> Result<()> {
        let parent = self
            .fibers
            .get(fiber)?
            .parent
            .ok_or(ReconcileError::HostParentNotFound(fiber))?;
        let host_parent = self.find_host_parent(parent, fiber)?;
        let before = self.get_host_sibling(fiber)?;
        self.insert_or_append_placement_node(fiber, before, host_parent)
    }

    /// First host node after `fiber` in document order that is already in
    /// place, staying under the same host parent
    fn get_host_sibling(&self, fiber: FiberId) -> Result<Option<InstanceId>> {
        let mut node = fiber;
        'siblings: loop {
            loop {
                let f = self.fibers.get(node)?;
                if let Some(sibling) = f.sibling {
                    node = sibling;
                    break;
                }
                match f.parent {
                    Some(parent) if !self.fibers.get(parent)?.kind.is_host_parent() => {
                        node = parent
                    }
                    _ => return Ok(None),
                }
            }

            // Descend to the first host node of this sibling
            loop {
                let f = self.fibers.get(node)?;
                if f.kind.is_host_node() {
                    break;
                }
                if f.flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match f.child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }

            let f = self.fibers.get(node)?;
            if !f.flags.contains(Flags::PLACEMENT) {
                return Ok(f.kind.instance());
            }
        }
    }

    fn insert_or_append_placement_node(
        &mut self,
        fiber: FiberId,
        before: Option<InstanceId>,
        parent: InstanceId,
    ) -> Result<()> {
        // Topmost host nodes at or below `fiber`, in order
        let mut stack = vec![fiber];
        while let Some(id) = stack.pop() {
            let (is_host, instance) = {
                let f = self.fibers.get(id)?;
                (f.kind.is_host_node(), f.kind.instance())
            };
            if !is_host {
                let children = self.fibers.children(id)?;
                stack.extend(children.into_iter().rev());
                continue;
            }

            let instance = instance.ok_or_else(|| {
                ReconcileError::Structural(format!("placing {id:?} before its instance exists"))
            })?;
            let p = self.instances.try_get(parent.cast())?;
            let c = self.instances.try_get(instance.cast())?;
            match before {
                Some(before) => {
                    let b = self.instances.try_get(before.cast())?;
                    self.host.insert_before(p, c, b);
                }
                None => self.host.append_child(p, c),
            }
        }
        Ok(())
    }

    /// Detach a replaced ref and apply attribute or text updates
    fn commit_host_update(&mut self, fiber: FiberId) -> Result<()> {
        let (kind, flags, alternate, host_update, new_props, new_ref) = {
            let f = self.fibers.get_mut(fiber)?;
            (
                f.kind.clone(),
                f.flags,
                f.alternate,
                f.host_update.take(),
                f.memoized_props.clone(),
                f.node_ref.clone(),
            )
        };
        let (old_props, old_ref) = match alternate {
            Some(alt) => {
                let a = self.fibers.get(alt)?;
                (a.memoized_props.clone(), a.node_ref.clone())
            }
            None => (Props::new(), None),
        };

        match kind {
            FiberKind::Host {
                tag,
                instance: Some(instance),
            } => {
                if flags.contains(Flags::REF) && ref_changed(old_ref.as_ref(), new_ref.as_ref()) {
                    if let Some(old) = &old_ref {
                        old.set(None);
                    }
                }
                if flags.contains(Flags::UPDATE) {
                    if let Some(update) = host_update {
                        let node = self.instances.try_get(instance.cast())?;
                        self.host
                            .commit_update(node, &update, &tag, &old_props, &new_props);
                        log::trace!("Updated <{tag}> {fiber:?}");
                    }
                    self.fibers.get_mut(fiber)?.flags.remove(Flags::UPDATE);
                }
            }
            FiberKind::Text {
                instance: Some(instance),
            } if flags.contains(Flags::UPDATE) => {
                let node = self.instances.try_get(instance.cast())?;
                self.host.commit_text_update(
                    node,
                    old_props.text_content().unwrap_or(""),
                    new_props.text_content().unwrap_or(""),
                );
                self.fibers.get_mut(fiber)?.flags.remove(Flags::UPDATE);
            }
            _ => {}
        }
        Ok(())
    }

    fn commit_layout_effects(&mut self, finished: FiberId) -> Result<()> {
        for fiber in self.collect_effects(finished, Flags::LAYOUT_MASK)? {
            let (kind, flags, alternate) = {
                let f = self.fibers.get(fiber)?;
                (f.kind.clone(), f.flags, f.alternate)
            };
            match &kind {
                FiberKind::Component {
                    component,
                    slot: Some(slot),
                } => {
                    if flags.contains(Flags::UPDATE) {
                        self.commit_lifecycle(fiber, component.as_ref(), *slot, alternate)?;
                    }
                    if flags.contains(Flags::CALLBACK) {
                        self.commit_callbacks(fiber, kind.label())?;
                    }
                }
                FiberKind::Root { .. } if flags.contains(Flags::CALLBACK) => {
                    self.commit_callbacks(fiber, kind.label())?;
                }
                FiberKind::Host {
                    instance: Some(instance),
                    ..
                } if flags.contains(Flags::REF) => {
                    if let Some(node_ref) = self.fibers.get(fiber)?.node_ref.clone() {
                        let public = self.host.public_instance(self.instance(*instance)?);
                        node_ref.set(Some(Rc::new(public) as Rc<dyn Any>));
                    }
                }
                _ => {}
            }
            self.fibers
                .get_mut(fiber)?
                .flags
                .remove(Flags::UPDATE | Flags::CALLBACK | Flags::REF);
        }
        Ok(())
    }

    fn commit_lifecycle(
        &mut self,
        fiber: FiberId,
        component: &dyn Component,
        slot: ComponentSlotId,
        alternate: Option<FiberId>,
    ) -> Result<()> {
        let (props, state) = {
            let f = self.fibers.get(fiber)?;
            (f.memoized_props.clone(), f.memoized_state.clone())
        };
        let updater = self.components.try_get(slot)?.updater.clone();
        let ctx = LifecycleContext::new(&props, state.value(), &updater);

        let result = match alternate {
            None => catch_panic("on_mount", || component.on_mount(&ctx)),
            Some(alt) => {
                let (prev_props, prev_state) = {
                    let a = self.fibers.get(alt)?;
                    (a.memoized_props.clone(), a.memoized_state.clone())
                };
                catch_panic("on_update", || {
                    component.on_update(&ctx, &prev_props, prev_state.value())
                })
            }
        };
        if let Err(e) = result {
            self.report_callback_error(component.name(), &e);
        }
        Ok(())
    }

    /// Run the callbacks of updates applied in this commit
    fn commit_callbacks(&mut self, fiber: FiberId, label: &str) -> Result<()> {
        let ids = match self.fibers.get_mut(fiber)?.update_queue.as_mut() {
            Some(queue) => std::mem::take(&mut queue.callbacks),
            None => return Ok(()),
        };
        for id in ids {
            let callback = self.updates.updates.get(id).and_then(|u| u.callback.clone());
            if let Some(callback) = callback {
                if let Err(e) = catch_panic("update callback", || callback()) {
                    self.report_callback_error(label, &e);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn report_callback_error(&mut self, name: &str, error: &CallbackError) {
        self.stats.callback_errors += 1;
        log::error!("{name}: {error}");
    }

    /// Run passive effects left by the last commit. Returns whether there
    /// was anything to run.
    pub fn flush_passive_effects(&mut self) -> Result<bool> {
        let pending = self.pending_passive.take();
        if pending.is_none() && self.passive_unmounts.is_empty() {
            return Ok(false);
        }

        let priority = pending
            .map(|p| lanes_to_event_priority(p.lanes))
            .unwrap_or(EventPriority::Default)
            .max(EventPriority::Default);
        let previous_lane = self.inbox.set_ambient_lane(priority.lane());

        for (name, cleanup) in std::mem::take(&mut self.passive_unmounts) {
            if let Err(e) = catch_panic("passive cleanup", cleanup) {
                self.report_callback_error(&name, &e);
            }
        }
        let result = match pending {
            Some(p) if self.fibers.contains(p.finished) => self.commit_passive_effects(p.finished),
            _ => Ok(()),
        };

        self.inbox.set_ambient_lane(previous_lane);
        result?;
        self.stats.passive_flushes += 1;
        log::trace!("Flushed passive effects");
        self.drain_external_updates()?;
        Ok(true)
    }

    fn commit_passive_effects(&mut self, finished: FiberId) -> Result<()> {
        let effects = self.collect_effects(finished, Flags::PASSIVE)?;

        // All cleanups of the previous run go before any new effect
        for &fiber in &effects {
            let (label, slot) = {
                let f = self.fibers.get(fiber)?;
                (f.kind.label().to_string(), f.kind.slot())
            };
            let cleanup = slot
                .and_then(|s| self.components.get_mut(s))
                .and_then(|s| s.passive_cleanup.take());
            if let Some(cleanup) = cleanup {
                if let Err(e) = catch_panic("passive cleanup", cleanup) {
                    self.report_callback_error(&label, &e);
                }
            }
        }

        for &fiber in &effects {
            let (kind, props, state) = {
                let f = self.fibers.get_mut(fiber)?;
                f.flags.remove(Flags::PASSIVE);
                (f.kind.clone(), f.memoized_props.clone(), f.memoized_state.clone())
            };
            let FiberKind::Component {
                component,
                slot: Some(slot),
            } = kind
            else {
                continue;
            };
            let updater = self.components.try_get(slot)?.updater.clone();
            let ctx = LifecycleContext::new(&props, state.value(), &updater);
            match catch_panic("passive_effect", || component.passive_effect(&ctx)) {
                Ok(cleanup) => self.components.try_get_mut(slot)?.passive_cleanup = cleanup,
                Err(e) => self.report_callback_error(component.name(), &e),
            }
        }
        Ok(())
    }
}
