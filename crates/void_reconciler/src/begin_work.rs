//! Begin phase
//!
//! `begin_work` renders one fiber and reconciles its new children, returning
//! the first child to work on next. A fiber whose props are unchanged and
//! which has no work in the render lanes is skipped, and so is its whole
//! subtree when no descendant has work either.

use std::rc::Rc;

use void_core::guard::catch_panic;
use void_core::Error as CoreError;

use crate::component::{Component, ComponentSlot};
use crate::element::{Element, NodeRef};
use crate::error::{ReconcileError, RenderError, WorkError};
use crate::fiber::{FiberId, FiberKind, FiberState};
use crate::flags::Flags;
use crate::host::Host;
use crate::lane::Lanes;
use crate::reconciler::Reconciler;
use crate::update_queue::ProcessedQueue;
use crate::updater::Updater;

type WorkResult<T> = std::result::Result<T, WorkError>;

/// Whether a ref must be detached or attached again
pub(crate) fn ref_changed(old: Option<&NodeRef>, new: Option<&NodeRef>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(a), Some(b)) => !a.ptr_eq(b),
        _ => true,
    }
}

impl<H: Host> Reconciler<H> {
    pub(crate) fn begin_work(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        render_lanes: Lanes,
    ) -> WorkResult<Option<FiberId>> {
        if let Some(current) = current {
            let cur = self.fibers.get(current)?;
            let work = self.fibers.get(wip)?;
            let props_changed = !cur.memoized_props.ptr_eq(&work.pending_props);
            if !props_changed && !cur.lanes.includes_some(render_lanes) {
                return self.bailout_on_already_finished_work(wip, render_lanes);
            }
        }

        let kind = {
            let fiber = self.fibers.get_mut(wip)?;
            fiber.lanes = Lanes::NONE;
            fiber.kind.clone()
        };
        log::trace!("Begin {} {wip:?}", kind.label());

        match kind {
            FiberKind::Root { .. } => self.update_host_root(current, wip, render_lanes),
            FiberKind::Host { .. } => self.update_host_component(current, wip, render_lanes),
            FiberKind::Text { .. } => Ok(None),
            FiberKind::Component { component, slot } => {
                self.update_component(current, wip, component, slot, render_lanes)
            }
            FiberKind::Fragment => {
                let props = self.fibers.get(wip)?.pending_props.clone();
                self.reconcile_children(current, wip, props.children(), render_lanes)
            }
        }
    }

    /// Skip a fiber whose output cannot have changed
    pub(crate) fn bailout_on_already_finished_work(
        &mut self,
        wip: FiberId,
        render_lanes: Lanes,
    ) -> WorkResult<Option<FiberId>> {
        if !self.fibers.get(wip)?.child_lanes.includes_some(render_lanes) {
            log::trace!("Skipping subtree of {wip:?}");
            return Ok(None);
        }
        self.fibers.clone_child_fibers(wip)?;
        Ok(self.fibers.get(wip)?.child)
    }

    fn update_host_root(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        render_lanes: Lanes,
    ) -> WorkResult<Option<FiberId>> {
        let previous = self.fibers.get(wip)?.memoized_state.element().cloned();
        let processed = self.process_fiber_queue(current, wip, render_lanes, "root")?;
        let next = processed.state.element().cloned();
        self.store_processed(wip, processed)?;

        let unchanged = match (&previous, &next) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return self.bailout_on_already_finished_work(wip, render_lanes);
        }
        let children: Vec<Element> = next.into_iter().collect();
        self.reconcile_children(current, wip, &children, render_lanes)
    }

    fn update_host_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        render_lanes: Lanes,
    ) -> WorkResult<Option<FiberId>> {
        self.mark_ref(current, wip)?;
        let props = self.fibers.get(wip)?.pending_props.clone();
        self.reconcile_children(current, wip, props.children(), render_lanes)
    }

    fn mark_ref(&mut self, current: Option<FiberId>, wip: FiberId) -> WorkResult<()> {
        let old = match current {
            Some(c) => self.fibers.get(c)?.node_ref.clone(),
            None => None,
        };
        let fiber = self.fibers.get_mut(wip)?;
        if ref_changed(old.as_ref(), fiber.node_ref.as_ref()) {
            fiber.flags |= Flags::REF | Flags::REF_STATIC;
        }
        Ok(())
    }

    fn update_component(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        component: Rc<dyn Component>,
        slot: Option<crate::fiber::ComponentSlotId>,
        render_lanes: Lanes,
    ) -> WorkResult<Option<FiberId>> {
        let name = component.name().to_string();
        let threw = |e| WorkError::Threw {
            fiber: wip,
            error: RenderError::from_callback(&name, e),
        };

        match (current, slot) {
            (Some(current), Some(_)) => {
                let processed = self.process_fiber_queue(Some(current), wip, render_lanes, &name)?;
                let (prev_props, prev_state) = {
                    let cur = self.fibers.get(current)?;
                    (cur.memoized_props.clone(), cur.memoized_state.clone())
                };
                let next_props = self.fibers.get(wip)?.pending_props.clone();
                let should_update = processed.force
                    || catch_panic("should_update", || {
                        component.should_update(
                            &prev_props,
                            &next_props,
                            prev_state.value(),
                            processed.state.value(),
                        )
                    })
                    .map_err(threw)?;
                self.store_processed(wip, processed)?;
                if !should_update {
                    log::trace!("{name} declined to update");
                    return self.bailout_on_already_finished_work(wip, render_lanes);
                }
            }
            _ => {
                let props = self.fibers.get(wip)?.pending_props.clone();
                let initial = catch_panic("initial_state", || component.initial_state(&props))
                    .map_err(threw)?;
                let slot = self
                    .components
                    .insert(ComponentSlot::new(Updater::new(wip, self.inbox.clone())));
                let queue = self
                    .updates
                    .create_queue(FiberState::Component(initial.clone()));
                let fiber = self.fibers.get_mut(wip)?;
                fiber.kind = FiberKind::Component {
                    component: component.clone(),
                    slot: Some(slot),
                };
                fiber.memoized_state = FiberState::Component(initial);
                fiber.update_queue = Some(queue);
                log::trace!("Mounting {name} at {wip:?}");
            }
        }

        {
            let fiber = self.fibers.get_mut(wip)?;
            fiber.flags |= Flags::UPDATE;
            if component.has_passive_effect() {
                fiber.flags |= Flags::PASSIVE | Flags::PASSIVE_STATIC;
            }
        }

        let (props, state) = {
            let fiber = self.fibers.get(wip)?;
            (fiber.pending_props.clone(), fiber.memoized_state.value().clone())
        };
        let children = catch_panic("render", || component.render(&props, &state)).map_err(threw)?;
        self.reconcile_children(current, wip, &children, render_lanes)
    }

    /// Run the fiber's update queue for `render_lanes`
    fn process_fiber_queue(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        render_lanes: Lanes,
        name: &str,
    ) -> WorkResult<ProcessedQueue> {
        let mut queue = self.fibers.get_mut(wip)?.update_queue.take().ok_or_else(|| {
            ReconcileError::Structural(format!("{wip:?} has no update queue"))
        })?;
        let mut current_queue = match current {
            Some(c) => self.fibers.get_mut(c)?.update_queue.take(),
            None => None,
        };
        let (memoized, props) = {
            let fiber = self.fibers.get(wip)?;
            (fiber.memoized_state.clone(), fiber.pending_props.clone())
        };

        let result = self.updates.process(
            &mut queue,
            current_queue.as_mut(),
            &memoized,
            &props,
            render_lanes,
        );

        self.fibers.get_mut(wip)?.update_queue = Some(queue);
        if let (Some(c), Some(q)) = (current, current_queue) {
            self.fibers.get_mut(c)?.update_queue = Some(q);
        }

        result.map_err(|e| match e {
            CoreError::Callback(e) => WorkError::Threw {
                fiber: wip,
                error: RenderError::from_callback(name, e),
            },
            CoreError::Handle(e) => WorkError::from(e),
            CoreError::Message(m) => WorkError::Fatal(ReconcileError::Structural(m.into_string())),
        })
    }

    fn store_processed(&mut self, wip: FiberId, processed: ProcessedQueue) -> WorkResult<()> {
        let fiber = self.fibers.get_mut(wip)?;
        fiber.memoized_state = processed.state;
        fiber.lanes = processed.remaining_lanes;
        if processed.has_callbacks {
            fiber.flags |= Flags::CALLBACK;
        }
        Ok(())
    }
}
