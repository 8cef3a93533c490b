//! The reconciler
//!
//! [`Reconciler`] owns every arena (fibers, host instances, component slots,
//! updates), the task scheduler, and the state of the render in progress.
//! The render phase, commit phase and root scheduling are implemented in
//! their own modules as further `impl` blocks on this type.

use std::sync::Arc;

use void_core::HandleMap;
use void_scheduler::{Clock, Scheduler, SchedulerStats, SystemClock, TaskId};

use crate::component::{Cleanup, ComponentSlot};
use crate::concurrent::ConcurrentUpdates;
use crate::config::ReconcilerConfig;
use crate::element::Element;
use crate::error::{ReconcileError, Result};
use crate::fiber::{Fiber, FiberArena, FiberId, FiberKind, FiberState};
use crate::host::{Host, InstanceId};
use crate::lane::{EventPriority, Lane, Lanes, TransitionLaneCursor};
use crate::root::{FiberRoot, RootId};
use crate::update_queue::{UpdateCallback, UpdatePayload, UpdateStore};
use crate::updater::UpdateInbox;
use crate::element::Props;

/// Work item in the scheduler's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootTask {
    /// Render (and commit) a root
    Render(RootId),
    /// Run pending passive effects
    PassiveEffects,
}

/// The render in progress, if any
#[derive(Debug, Default)]
pub(crate) struct RenderSession {
    pub root: Option<RootId>,
    /// Work-in-progress root fiber
    pub wip_root: Option<FiberId>,
    /// Next unit of work
    pub cursor: Option<FiberId>,
    pub render_lanes: Lanes,
    /// Error boundaries already used in this render
    pub recovered: Vec<FiberId>,
}

/// Passive effects of the last commit, not yet run
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingPassive {
    pub finished: FiberId,
    pub lanes: Lanes,
}

#[derive(Debug, Default)]
pub(crate) struct NestedUpdates {
    pub root: Option<RootId>,
    pub count: u32,
}

/// Counters for debugging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    /// Renders started from a fresh stack
    pub renders_started: u64,
    /// Renders thrown away for more urgent work
    pub render_restarts: u64,
    /// Time-sliced renders that yielded
    pub yields: u64,
    /// Fibers begun
    pub units_of_work: u64,
    /// Commits
    pub commits: u64,
    /// Panics in lifecycle callbacks and effects
    pub callback_errors: u64,
    /// Render errors handled by a fallback
    pub recovered_errors: u64,
    /// Passive effect flushes
    pub passive_flushes: u64,
    /// Fibers freed by garbage collection
    pub fibers_collected: u64,
    /// Updates freed by garbage collection
    pub updates_collected: u64,
}

/// Drives rendering of one or more roots into a [`Host`]
pub struct Reconciler<H: Host> {
    pub(crate) config: ReconcilerConfig,
    pub(crate) host: H,
    pub(crate) scheduler: Scheduler<RootTask>,
    pub(crate) fibers: FiberArena,
    pub(crate) roots: HandleMap<FiberRoot>,
    pub(crate) instances: HandleMap<H::Instance>,
    pub(crate) components: HandleMap<ComponentSlot>,
    pub(crate) updates: UpdateStore,
    pub(crate) concurrent: ConcurrentUpdates,
    pub(crate) inbox: Arc<UpdateInbox>,
    pub(crate) session: RenderSession,
    pub(crate) pending_passive: Option<PendingPassive>,
    /// Cleanups of deleted components, run with the next passive flush
    pub(crate) passive_unmounts: Vec<(String, Cleanup)>,
    pub(crate) transition_lanes: TransitionLaneCursor,
    pub(crate) running_task: Option<TaskId>,
    pub(crate) nested: NestedUpdates,
    pub(crate) gc_mark: usize,
    pub(crate) stats: ReconcilerStats,
}

impl<H: Host> Reconciler<H> {
    /// Create a reconciler on the system clock
    pub fn new(host: H, config: ReconcilerConfig) -> Self {
        Self::with_clock(host, config, Box::new(SystemClock::new()))
    }

    /// Create a reconciler on a given clock
    pub fn with_clock(host: H, config: ReconcilerConfig, clock: Box<dyn Clock>) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("{e}; continuing with the given values");
        }
        let scheduler = Scheduler::with_clock(config.scheduler_config(), clock);
        let gc_mark = config.gc_threshold;
        Self {
            config,
            host,
            scheduler,
            fibers: FiberArena::new(),
            roots: HandleMap::new(),
            instances: HandleMap::new(),
            components: HandleMap::new(),
            updates: UpdateStore::new(),
            concurrent: ConcurrentUpdates::default(),
            inbox: Arc::new(UpdateInbox::new()),
            session: RenderSession::default(),
            pending_passive: None,
            passive_unmounts: Vec::new(),
            transition_lanes: TransitionLaneCursor::new(),
            running_task: None,
            nested: NestedUpdates::default(),
            gc_mark,
            stats: ReconcilerStats::default(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// The host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutably
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Current time on the reconciler's clock
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    /// Create a root rendering into `container`
    pub fn create_root(&mut self, container: H::Instance) -> RootId {
        let container: InstanceId = self.instances.insert(container).cast();
        let mut fiber = Fiber::new(
            FiberKind::Root {
                root: RootId::null(),
            },
            None,
            Props::new(),
        );
        fiber.memoized_state = FiberState::Root(None);
        fiber.update_queue = Some(self.updates.create_queue(FiberState::Root(None)));
        let fiber_id = self.fibers.insert(fiber);

        let root = self.roots.insert(FiberRoot::new(container, fiber_id));
        if let Ok(fiber) = self.fibers.get_mut(fiber_id) {
            fiber.kind = FiberKind::Root { root };
        }
        log::debug!("Created root {root:?}");
        root
    }

    /// Schedule rendering `element` into a root. Returns the lane the update
    /// was issued at.
    pub fn render(&mut self, root: RootId, element: Option<Element>) -> Result<Lane> {
        self.update_container(root, element, None)
    }

    /// Like [`Reconciler::render`], running `callback` after the update commits
    pub fn render_with_callback(
        &mut self,
        root: RootId,
        element: Option<Element>,
        callback: UpdateCallback,
    ) -> Result<Lane> {
        self.update_container(root, element, Some(callback))
    }

    fn update_container(
        &mut self,
        root: RootId,
        element: Option<Element>,
        callback: Option<UpdateCallback>,
    ) -> Result<Lane> {
        let current = self.root_ref(root)?.current;
        let lane = self.request_update_lane();
        let update = self.updates.create_update(
            lane,
            self.scheduler.now(),
            UpdatePayload::Element(element),
            callback,
        );
        self.enqueue_update(current, update, lane)?;
        Ok(lane)
    }

    /// Render nothing into a root, synchronously, then release it and hand
    /// back its container
    pub fn unmount(&mut self, root: RootId) -> Result<H::Instance> {
        self.flush_sync(|r| r.render(root, None))??;
        self.flush_passive_effects()?;

        let record = self
            .roots
            .remove(root)
            .ok_or(ReconcileError::StaleRoot(root))?;
        if let Some(task) = record.callback_task {
            self.scheduler.cancel(task);
        }
        if self.session.root == Some(root) {
            self.session = RenderSession::default();
        }
        for id in self.fibers.subtree(record.current)? {
            if let Some(alt) = self.fibers.get(id)?.alternate {
                self.fibers.remove(alt);
            }
            self.fibers.remove(id);
        }
        log::debug!("Unmounted root {root:?}");
        self.instances
            .remove(record.container.cast())
            .ok_or(ReconcileError::RootUnmounted(root))
    }

    /// Run `f` with discrete priority, then render and commit all
    /// synchronous work it produced
    pub fn flush_sync<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R> {
        let result = self.with_update_priority(EventPriority::Discrete, f);
        self.flush_sync_work()?;
        Ok(result)
    }

    /// Run `f` with updates issued on a transition lane
    pub fn start_transition<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let lane = self.transition_lanes.claim();
        let previous = self.inbox.set_ambient_lane(lane);
        let result = f(self);
        self.inbox.set_ambient_lane(previous);
        result
    }

    /// Run `f` with updates issued at `priority`
    pub fn with_update_priority<R>(
        &mut self,
        priority: EventPriority,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.inbox.set_ambient_lane(priority.lane());
        let result = f(self);
        self.inbox.set_ambient_lane(previous);
        result
    }

    /// Lane for an update issued right now
    pub(crate) fn request_update_lane(&self) -> Lane {
        let ambient = self.inbox.ambient_lane();
        if ambient.is_empty() {
            Lanes::DEFAULT
        } else {
            ambient
        }
    }

    /// Lanes with pending work on a root
    pub fn root_pending_lanes(&self, root: RootId) -> Result<Lanes> {
        Ok(self.root_ref(root)?.lanes.pending)
    }

    /// Pending lanes that must render together with other lanes
    pub fn root_entangled_lanes(&self, root: RootId) -> Result<Lanes> {
        Ok(self.root_ref(root)?.lanes.entangled)
    }

    /// Root fiber of the committed tree
    pub fn root_current(&self, root: RootId) -> Result<FiberId> {
        Ok(self.root_ref(root)?.current)
    }

    /// Container a root renders into
    pub fn container(&self, root: RootId) -> Result<&H::Instance> {
        let container = self.root_ref(root)?.container;
        self.instance(container)
    }

    /// Look up a fiber
    pub fn fiber(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id).ok()
    }

    /// All fibers
    pub fn fibers(&self) -> &FiberArena {
        &self.fibers
    }

    /// Host instance of a fiber, if it has one
    pub fn host_instance(&self, id: FiberId) -> Option<&H::Instance> {
        let instance = self.fiber(id)?.kind.instance()?;
        self.instances.get(instance.cast())
    }

    /// Every `(fiber, alternate)` link currently held
    pub fn alternate_pairs(&self) -> Vec<(FiberId, FiberId)> {
        self.fibers
            .iter()
            .filter_map(|(id, fiber)| fiber.alternate.map(|alt| (id, alt)))
            .collect()
    }

    /// Whether a render is in progress
    pub fn is_rendering(&self) -> bool {
        self.session.root.is_some()
    }

    /// Whether passive effects are waiting to run
    pub fn has_pending_passive_effects(&self) -> bool {
        self.pending_passive.is_some() || !self.passive_unmounts.is_empty()
    }

    /// Counters
    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Scheduler counters
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub(crate) fn root_ref(&self, root: RootId) -> Result<&FiberRoot> {
        self.roots.get(root).ok_or(ReconcileError::StaleRoot(root))
    }

    pub(crate) fn root_mut(&mut self, root: RootId) -> Result<&mut FiberRoot> {
        self.roots.get_mut(root).ok_or(ReconcileError::StaleRoot(root))
    }

    pub(crate) fn instance(&self, id: InstanceId) -> Result<&H::Instance> {
        Ok(self.instances.try_get(id.cast())?)
    }
}

impl<H: Host> std::fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("roots", &self.roots.len())
            .field("fibers", &self.fibers.len())
            .field("instances", &self.instances.len())
            .field("updates", &self.updates.updates.len())
            .field("rendering", &self.session.root)
            .field("scheduler", &self.scheduler)
            .field("stats", &self.stats)
            .finish()
    }
}
