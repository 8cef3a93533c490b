//! Fiber roots

use void_core::Handle;
use void_scheduler::TaskId;

use crate::fiber::FiberId;
use crate::host::InstanceId;
use crate::lane::{Lane, Lanes, RootLanes};

/// Handle to a root
pub type RootId = Handle<FiberRoot>;

/// A mounted tree attached to one host container
#[derive(Debug)]
pub struct FiberRoot {
    /// Host node the tree renders into
    pub container: InstanceId,
    /// Root fiber of the committed tree
    pub current: FiberId,
    /// Completed work-in-progress root fiber awaiting commit
    pub finished_work: Option<FiberId>,
    /// Lanes the finished work was rendered at
    pub finished_lanes: Lanes,
    /// Lane bookkeeping
    pub lanes: RootLanes,
    /// Task scheduled to work on this root
    pub callback_task: Option<TaskId>,
    /// Most urgent lane the scheduled task serves
    pub callback_priority: Lane,
}

impl FiberRoot {
    /// New root around an existing root fiber
    pub fn new(container: InstanceId, current: FiberId) -> Self {
        Self {
            container,
            current,
            finished_work: None,
            finished_lanes: Lanes::NONE,
            lanes: RootLanes::new(),
            callback_task: None,
            callback_priority: Lanes::NONE,
        }
    }
}
