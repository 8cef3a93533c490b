//! Priority task queue
//!
//! Tasks are ordered by expiration time (start time plus a per-priority
//! timeout), then by insertion order. Cancelling a task only clears its
//! payload; the heap entry stays behind and is discarded when it reaches the
//! top, so cancellation never has to search the heap.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Host task priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriorityLevel {
    /// Must run before anything else; never waits
    Immediate,
    /// Direct user interaction
    UserBlocking,
    /// Regular updates
    Normal,
    /// Work that can wait a while
    Low,
    /// Only when nothing else is pending
    Idle,
}

impl Default for PriorityLevel {
    fn default() -> Self {
        Self::Normal
    }
}

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Length of one time slice before `should_yield` reports true
    pub frame_yield_ms: u64,
    /// Timeout for user-blocking tasks
    pub user_blocking_timeout_ms: u64,
    /// Timeout for normal tasks
    pub normal_timeout_ms: u64,
    /// Timeout for low-priority tasks
    pub low_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_yield_ms: 5,
            user_blocking_timeout_ms: 250,
            normal_timeout_ms: 5000,
            low_timeout_ms: 10000,
        }
    }
}

impl SchedulerConfig {
    /// Timeout used to compute a task's expiration; `None` never expires
    pub fn timeout_for(&self, priority: PriorityLevel) -> Option<u64> {
        match priority {
            PriorityLevel::Immediate => Some(0),
            PriorityLevel::UserBlocking => Some(self.user_blocking_timeout_ms),
            PriorityLevel::Normal => Some(self.normal_timeout_ms),
            PriorityLevel::Low => Some(self.low_timeout_ms),
            PriorityLevel::Idle => None,
        }
    }
}

/// Identifies a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct Task<T> {
    payload: Option<T>,
    priority: PriorityLevel,
    expiration_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    sort_index: u64,
    id: TaskId,
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest expiration first, then oldest task
        other
            .sort_index
            .cmp(&self.sort_index)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A task taken off the queue, ready to run
#[derive(Debug)]
pub struct ReadyTask<T> {
    /// The task's identity; stays the same if the task is continued
    pub id: TaskId,
    /// What to run
    pub payload: T,
    /// Priority it was scheduled at
    pub priority: PriorityLevel,
    /// Whether its expiration time has already passed
    pub did_timeout: bool,
    expiration_time: u64,
}

/// Counters for debugging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks scheduled
    pub scheduled: u64,
    /// Tasks cancelled before running
    pub cancelled: u64,
    /// Tasks handed out to run
    pub run: u64,
    /// Tasks re-queued as continuations
    pub continued: u64,
}

/// Cooperative priority scheduler holding payloads of type `T`
pub struct Scheduler<T> {
    config: SchedulerConfig,
    clock: Box<dyn Clock>,
    heap: BinaryHeap<HeapEntry>,
    tasks: HashMap<TaskId, Task<T>>,
    next_id: u64,
    slice_start: u64,
    stats: SchedulerStats,
}

impl<T> Scheduler<T> {
    /// Create a scheduler on the system clock
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock::new()))
    }

    /// Create a scheduler on a given clock
    pub fn with_clock(config: SchedulerConfig, clock: Box<dyn Clock>) -> Self {
        let slice_start = clock.now();
        Self {
            config,
            clock,
            heap: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_id: 1,
            slice_start,
            stats: SchedulerStats::default(),
        }
    }

    /// Current time according to the scheduler's clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Configuration in use
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue `payload` to run at `priority`
    pub fn schedule(&mut self, priority: PriorityLevel, payload: T) -> TaskId {
        let start_time = self.now();
        let expiration_time = match self.config.timeout_for(priority) {
            Some(timeout) => start_time.saturating_add(timeout),
            None => u64::MAX,
        };

        let id = TaskId(self.next_id);
        self.next_id += 1;

        self.tasks.insert(
            id,
            Task {
                payload: Some(payload),
                priority,
                expiration_time,
            },
        );
        self.heap.push(HeapEntry {
            sort_index: expiration_time,
            id,
        });
        self.stats.scheduled += 1;

        log::debug!("Scheduled task {} at {:?} (expires {})", id.0, priority, expiration_time);
        id
    }

    /// Cancel a task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) if task.payload.is_some() => {
                task.payload = None;
                self.stats.cancelled += 1;
                log::debug!("Cancelled task {}", id.0);
                true
            }
            _ => false,
        }
    }

    /// Whether a task is still waiting to run
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.tasks.get(&id).is_some_and(|t| t.payload.is_some())
    }

    /// Mark the start of a time slice
    pub fn begin_slice(&mut self) {
        self.slice_start = self.now();
    }

    /// Whether the current time slice is used up
    pub fn should_yield(&self) -> bool {
        self.now().saturating_sub(self.slice_start) >= self.config.frame_yield_ms
    }

    /// Take the most urgent live task off the queue
    pub fn next_task(&mut self) -> Option<ReadyTask<T>> {
        while let Some(entry) = self.heap.pop() {
            let Some(task) = self.tasks.remove(&entry.id) else {
                continue;
            };
            let Some(payload) = task.payload else {
                // Cancelled; drop the leftover entry
                continue;
            };
            self.stats.run += 1;
            return Some(ReadyTask {
                id: entry.id,
                payload,
                priority: task.priority,
                did_timeout: task.expiration_time <= self.now(),
                expiration_time: task.expiration_time,
            });
        }
        None
    }

    /// Put a task back with a new payload, keeping its identity and place
    pub fn continue_task(&mut self, task: ReadyTask<T>, payload: T) -> TaskId {
        self.tasks.insert(
            task.id,
            Task {
                payload: Some(payload),
                priority: task.priority,
                expiration_time: task.expiration_time,
            },
        );
        self.heap.push(HeapEntry {
            sort_index: task.expiration_time,
            id: task.id,
        });
        self.stats.continued += 1;
        task.id
    }

    /// Whether any live task is queued
    pub fn has_pending(&self) -> bool {
        self.tasks.values().any(|t| t.payload.is_some())
    }

    /// Number of live tasks
    pub fn pending_count(&self) -> usize {
        self.tasks.values().filter(|t| t.payload.is_some()).count()
    }

    /// Counters
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

impl<T> std::fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_count())
            .field("heap_entries", &self.heap.len())
            .field("stats", &self.stats)
            .finish()
    }
}
