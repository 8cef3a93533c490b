//! Render-phase work loop
//!
//! A render walks the work-in-progress tree depth first: `begin_work` on the
//! way down, `complete_work` on the way up. The synchronous loop runs to the
//! end; the concurrent loop checks the scheduler before every unit and
//! leaves the cursor in place when asked to yield, so the same render can be
//! resumed by the next task.

use void_core::guard::catch_panic;

use crate::error::{ReconcileError, RenderError, Result, WorkError};
use crate::fiber::{FiberId, FiberKind};
use crate::host::Host;
use crate::lane::Lanes;
use crate::reconciler::{Reconciler, RenderSession};
use crate::root::RootId;

impl<H: Host> Reconciler<H> {
    /// Throw away any render in progress and start over on `root`
    fn prepare_fresh_stack(&mut self, root: RootId, lanes: Lanes) -> Result<()> {
        if let Some(previous) = self.session.root {
            self.stats.render_restarts += 1;
            log::debug!("Discarding in-progress render of {previous:?}");
        }

        let current = {
            let record = self.root_mut(root)?;
            record.finished_work = None;
            record.finished_lanes = Lanes::NONE;
            record.current
        };
        let props = self.fibers.get(current)?.memoized_props.clone();
        let wip = self.fibers.create_work_in_progress(current, props)?;

        self.session = RenderSession {
            root: Some(root),
            wip_root: Some(wip),
            cursor: Some(wip),
            render_lanes: lanes,
            recovered: Vec::new(),
        };
        self.stats.renders_started += 1;
        log::debug!("Rendering {root:?} at {lanes:?}");

        self.finish_queueing_concurrent_updates()
    }

    /// Render `root` to completion. Returns the finished root fiber.
    pub(crate) fn render_root_sync(&mut self, root: RootId, lanes: Lanes) -> Result<FiberId> {
        if self.session.root != Some(root) || self.session.render_lanes != lanes {
            self.prepare_fresh_stack(root, lanes)?;
        }
        self.run_work_loop(root, false)?;
        self.complete_session()
    }

    /// Render `root` until done or told to yield. Returns the finished root
    /// fiber when done.
    pub(crate) fn render_root_concurrent(
        &mut self,
        root: RootId,
        lanes: Lanes,
    ) -> Result<Option<FiberId>> {
        if self.session.root != Some(root) || self.session.render_lanes != lanes {
            self.prepare_fresh_stack(root, lanes)?;
        } else {
            log::trace!("Resuming render of {root:?}");
        }
        if self.run_work_loop(root, true)? {
            self.complete_session().map(Some)
        } else {
            self.stats.yields += 1;
            log::trace!("Yielding render of {root:?}");
            Ok(None)
        }
    }

    fn complete_session(&mut self) -> Result<FiberId> {
        let session = std::mem::take(&mut self.session);
        let finished = session.wip_root.ok_or_else(|| {
            ReconcileError::Structural("render completed without a root fiber".into())
        })?;
        self.finish_queueing_concurrent_updates()?;
        Ok(finished)
    }

    /// Abandon the render in progress, if it belongs to `root`
    pub(crate) fn reset_session(&mut self, root: RootId) {
        if self.session.root == Some(root) {
            self.session = RenderSession::default();
        }
    }

    /// Run units of work, recovering thrown errors through boundaries.
    /// Returns whether the tree is complete.
    fn run_work_loop(&mut self, root: RootId, time_slice: bool) -> Result<bool> {
        loop {
            let step = if time_slice {
                self.work_loop_concurrent()
            } else {
                self.work_loop_sync()
            };
            match step {
                Ok(()) => return Ok(self.session.cursor.is_none()),
                Err(WorkError::Threw { fiber, error }) => self.handle_throw(root, fiber, error)?,
                Err(WorkError::Fatal(e)) => return Err(e),
            }
        }
    }

    fn work_loop_sync(&mut self) -> std::result::Result<(), WorkError> {
        while let Some(unit) = self.session.cursor {
            self.perform_unit_of_work(unit)?;
        }
        Ok(())
    }

    fn work_loop_concurrent(&mut self) -> std::result::Result<(), WorkError> {
        while let Some(unit) = self.session.cursor {
            if self.scheduler.should_yield() {
                break;
            }
            self.perform_unit_of_work(unit)?;
        }
        Ok(())
    }

    fn perform_unit_of_work(&mut self, unit: FiberId) -> std::result::Result<(), WorkError> {
        let current = self.fibers.get(unit)?.alternate;
        let next = self.begin_work(current, unit, self.session.render_lanes)?;
        {
            let fiber = self.fibers.get_mut(unit)?;
            fiber.memoized_props = fiber.pending_props.clone();
        }
        self.stats.units_of_work += 1;
        match next {
            Some(child) => self.session.cursor = Some(child),
            None => self.complete_unit_of_work(unit)?,
        }
        Ok(())
    }

    fn complete_unit_of_work(&mut self, unit: FiberId) -> std::result::Result<(), WorkError> {
        let mut completed = unit;
        loop {
            let current = self.fibers.get(completed)?.alternate;
            self.complete_work(current, completed)?;
            let fiber = self.fibers.get(completed)?;
            if let Some(sibling) = fiber.sibling {
                self.session.cursor = Some(sibling);
                return Ok(());
            }
            match fiber.parent {
                Some(parent) if Some(completed) != self.session.wip_root => completed = parent,
                _ => {
                    self.session.cursor = None;
                    return Ok(());
                }
            }
        }
    }

    /// Find the nearest ancestor of `failed` that renders a fallback, and
    /// continue the render from there
    fn handle_throw(&mut self, root: RootId, failed: FiberId, error: RenderError) -> Result<()> {
        log::warn!("{error}");
        let mut boundary = self.fibers.get(failed)?.parent;

        while let Some(id) = boundary {
            let (kind, props, parent) = {
                let f = self.fibers.get(id)?;
                (f.kind.clone(), f.pending_props.clone(), f.parent)
            };
            if let FiberKind::Component { component, .. } = kind {
                if !self.session.recovered.contains(&id) {
                    let fallback = catch_panic("recover_from_error", || {
                        component.recover_from_error(&props, &error)
                    });
                    match fallback {
                        Ok(Some(children)) => {
                            self.session.recovered.push(id);
                            self.stats.recovered_errors += 1;
                            log::debug!("{} recovered from: {error}", component.name());
                            return self.render_fallback(id, &children).map_err(|e| match e {
                                WorkError::Fatal(e) => e,
                                WorkError::Threw { error, .. } => error.into(),
                            });
                        }
                        Ok(None) => {}
                        Err(e) => {
                            self.stats.callback_errors += 1;
                            log::warn!("{} failed to recover: {e}", component.name());
                        }
                    }
                }
            }
            boundary = parent;
        }

        log::error!("Unhandled render error in {root:?}: {error}");
        Err(error.into())
    }

    /// Replace the children of `boundary` with `children` and resume below it
    fn render_fallback(
        &mut self,
        boundary: FiberId,
        children: &[crate::element::Element],
    ) -> std::result::Result<(), WorkError> {
        let current = {
            let f = self.fibers.get_mut(boundary)?;
            f.deletions.clear();
            f.flags.remove(crate::flags::Flags::CHILD_DELETION);
            f.alternate
        };
        let lanes = self.session.render_lanes;
        match self.reconcile_children(current, boundary, children, lanes)? {
            Some(child) => {
                self.session.cursor = Some(child);
                Ok(())
            }
            None => self.complete_unit_of_work(boundary),
        }
    }
}
