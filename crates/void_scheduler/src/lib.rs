//! # void_scheduler - Cooperative Task Scheduling
//!
//! A single-threaded priority queue of tasks with:
//! - Five priority levels, each with its own expiration timeout
//! - Cancellation by clearing a task's payload (no heap search)
//! - Continuations that keep a task's identity and queue position
//! - Time slicing via `should_yield`, driven by a pluggable [`Clock`]
//!
//! The scheduler does not run anything itself. The owner pulls tasks with
//! [`Scheduler::next_task`] and decides how to execute the payload; this
//! keeps the payload a plain value instead of a boxed closure that would
//! need to borrow its owner.
//!
//! ```
//! use void_scheduler::{ManualClock, PriorityLevel, Scheduler, SchedulerConfig};
//!
//! let clock = ManualClock::new();
//! let mut scheduler = Scheduler::with_clock(SchedulerConfig::default(), Box::new(clock.clone()));
//! scheduler.schedule(PriorityLevel::Normal, "render");
//! scheduler.schedule(PriorityLevel::Immediate, "flush");
//!
//! assert_eq!(scheduler.next_task().unwrap().payload, "flush");
//! ```

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{PriorityLevel, ReadyTask, Scheduler, SchedulerConfig, SchedulerStats, TaskId};

/// Prelude
pub mod prelude {
    pub use crate::{Clock, ManualClock, PriorityLevel, Scheduler, SchedulerConfig, TaskId};
}
