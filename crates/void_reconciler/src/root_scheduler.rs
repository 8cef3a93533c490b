//! Root scheduling
//!
//! Each root has at most one scheduler task. Whenever a root's pending lanes
//! change, `ensure_root_is_scheduled` brings the task in line with the most
//! urgent lanes: kept when its priority already matches, otherwise replaced.
//! Running the task renders the root (time-sliced or not) and commits it when
//! the render completes. A task that yielded asks to be continued under the
//! same id.

use crate::error::{ReconcileError, Result};
use crate::fiber::FiberId;
use crate::host::Host;
use crate::lane::{lanes_to_event_priority, Lanes};
use crate::reconciler::{Reconciler, RootTask};
use crate::root::RootId;

impl<H: Host> Reconciler<H> {
    /// Make the root's task match its most urgent pending lanes
    pub(crate) fn ensure_root_is_scheduled(&mut self, root: RootId) -> Result<()> {
        let now = self.scheduler.now();
        let wip_lanes = if self.session.root == Some(root) {
            self.session.render_lanes
        } else {
            Lanes::NONE
        };

        let record = self
            .roots
            .get_mut(root)
            .ok_or(ReconcileError::StaleRoot(root))?;
        let expired = record
            .lanes
            .mark_starved_lanes_as_expired(now, &self.config.expiration);
        if !expired.is_empty() {
            log::debug!("Lanes {expired:?} of {root:?} expired");
        }
        let next = record.lanes.next_lanes(wip_lanes);
        let existing = record.callback_task;

        if next.is_empty() {
            if let Some(task) = existing {
                self.scheduler.cancel(task);
            }
            record.callback_task = None;
            record.callback_priority = Lanes::NONE;
            return Ok(());
        }

        let priority = next.highest_priority_lane();
        if let Some(task) = existing {
            let alive = self.running_task == Some(task) || self.scheduler.is_pending(task);
            if alive && record.callback_priority == priority {
                return Ok(());
            }
            self.scheduler.cancel(task);
        }

        let level = lanes_to_event_priority(next).scheduler_priority();
        let task = self.scheduler.schedule(level, RootTask::Render(root));
        log::trace!("Scheduled {root:?} for {next:?} at {level:?}");
        record.callback_task = Some(task);
        record.callback_priority = priority;
        Ok(())
    }

    /// Whether `lanes` must render without yielding
    fn is_blocking(&self, lanes: Lanes) -> bool {
        if self.config.time_slice_default_lane {
            lanes.includes_some(Lanes::SYNC | Lanes::INPUT_CONTINUOUS)
        } else {
            lanes.is_blocking()
        }
    }

    /// Body of a root's task. Returns whether the task should be continued.
    fn perform_work_on_root(&mut self, root: RootId, did_timeout: bool) -> Result<bool> {
        let original_task = self.root_ref(root)?.callback_task;
        if self.flush_passive_effects()? && self.root_ref(root)?.callback_task != original_task {
            // Effects scheduled something more urgent; this task is stale.
            return Ok(false);
        }

        let wip_lanes = if self.session.root == Some(root) {
            self.session.render_lanes
        } else {
            Lanes::NONE
        };
        let lanes = self.root_ref(root)?.lanes.next_lanes(wip_lanes);
        if lanes.is_empty() {
            return Ok(false);
        }

        let time_slice = !self.is_blocking(lanes)
            && !self.root_ref(root)?.lanes.includes_expired(lanes)
            && !did_timeout;

        let finished = if time_slice {
            self.render_root_concurrent(root, lanes)
        } else {
            self.render_root_sync(root, lanes).map(Some)
        };
        match finished {
            Ok(Some(finished)) => self.finish_render(root, finished, lanes)?,
            Ok(None) => {}
            Err(e) => {
                self.fail_root(root);
                return Err(e);
            }
        }

        self.ensure_root_is_scheduled(root)?;
        let task = self.root_ref(root)?.callback_task;
        Ok(task.is_some() && task == original_task)
    }

    fn finish_render(&mut self, root: RootId, finished: FiberId, lanes: Lanes) -> Result<()> {
        {
            let record = self.root_mut(root)?;
            record.finished_work = Some(finished);
            record.finished_lanes = lanes;
        }
        if let Err(e) = self.commit_root(root) {
            self.fail_root(root);
            return Err(e);
        }
        Ok(())
    }

    /// Render and commit the sync lanes of `root`. Returns whether anything
    /// was committed.
    fn perform_sync_work_on_root(&mut self, root: RootId) -> Result<bool> {
        self.flush_passive_effects()?;
        let lanes = self.root_ref(root)?.lanes.next_lanes(Lanes::NONE);
        if !lanes.includes_some(Lanes::SYNC) {
            self.ensure_root_is_scheduled(root)?;
            return Ok(false);
        }
        match self.render_root_sync(root, lanes) {
            Ok(finished) => self.finish_render(root, finished, lanes).map(|_| true),
            Err(e) => {
                self.fail_root(root);
                Err(e)
            }
        }
    }

    /// Render and commit sync work on every root until none is left
    pub(crate) fn flush_sync_work(&mut self) -> Result<()> {
        self.drain_external_updates()?;
        loop {
            let target = self
                .roots
                .iter()
                .find(|(_, r)| r.lanes.pending.includes_some(Lanes::SYNC))
                .map(|(id, _)| id);
            let Some(root) = target else {
                return Ok(());
            };
            if !self.perform_sync_work_on_root(root)? {
                return Ok(());
            }
            self.drain_external_updates()?;
        }
    }

    /// Give up on a root's pending work after an unrecoverable error
    pub(crate) fn fail_root(&mut self, root: RootId) {
        self.reset_session(root);
        if let Some(record) = self.roots.get_mut(root) {
            record.lanes.mark_finished(Lanes::NONE);
            record.finished_work = None;
            record.finished_lanes = Lanes::NONE;
            record.callback_priority = Lanes::NONE;
            if let Some(task) = record.callback_task.take() {
                self.scheduler.cancel(task);
            }
        }
        log::warn!("Dropped pending work on {root:?}");
    }

    /// Run the most urgent scheduled task. Returns `false` when there was
    /// nothing to run.
    pub fn run_next_task(&mut self) -> Result<bool> {
        self.drain_external_updates()?;
        let Some(task) = self.scheduler.next_task() else {
            return Ok(false);
        };
        self.scheduler.begin_slice();

        match task.payload {
            RootTask::Render(root) => {
                let current = self.roots.get(root).and_then(|r| r.callback_task);
                if current != Some(task.id) {
                    log::trace!("Skipping stale task for {root:?}");
                    return Ok(true);
                }
                self.running_task = Some(task.id);
                let result = self.perform_work_on_root(root, task.did_timeout);
                self.running_task = None;
                if result? {
                    self.scheduler.continue_task(task, RootTask::Render(root));
                }
            }
            RootTask::PassiveEffects => {
                self.flush_passive_effects()?;
            }
        }
        Ok(true)
    }

    /// Run tasks until none are left
    pub fn work_until_idle(&mut self) -> Result<()> {
        while self.run_next_task()? {}
        Ok(())
    }

    /// Run tasks for up to `budget_ms` of clock time. Returns whether work
    /// remains.
    pub fn work_for(&mut self, budget_ms: u64) -> Result<bool> {
        let start = self.scheduler.now();
        while self.scheduler.now().saturating_sub(start) < budget_ms {
            if !self.run_next_task()? {
                return Ok(false);
            }
        }
        Ok(self.scheduler.has_pending() || !self.inbox.is_empty())
    }

    /// Whether any task is scheduled or any update is waiting to be queued
    pub fn has_pending_work(&self) -> bool {
        self.scheduler.has_pending() || !self.inbox.is_empty()
    }
}
