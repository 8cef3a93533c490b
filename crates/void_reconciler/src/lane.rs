//! Lanes - bitmask priorities
//!
//! A [`Lane`] is a single bit naming one class of pending work; [`Lanes`] is
//! any union of them. The lowest set bit is the most urgent, so picking the
//! highest-priority lane is `lanes & -lanes`.
//!
//! [`RootLanes`] holds a root's per-lane bookkeeping: which lanes are pending
//! or expired, when each lane was first updated, and when it
//! is considered starved.

use serde::{Deserialize, Serialize};

use crate::config::ExpirationPolicy;

/// Number of usable lanes
pub const TOTAL_LANES: usize = 31;

/// A set of lanes
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lanes(u32);

/// A single lane. Same representation as [`Lanes`], but by convention exactly
/// one bit (or none) is set.
pub type Lane = Lanes;

impl Lanes {
    /// No lanes
    pub const NONE: Self = Self(0);

    /// Discrete user input; always rendered synchronously
    pub const SYNC: Self = Self(1 << 0);

    /// Continuous input such as drags and scrolling
    pub const INPUT_CONTINUOUS: Self = Self(1 << 1);

    /// Updates issued outside of any tracked event
    pub const DEFAULT: Self = Self(1 << 2);

    /// Transition lanes, claimed round-robin
    pub const TRANSITION_LANES: Self = Self(0xFFFF << 3);

    /// First transition lane
    pub const TRANSITION_LANE_1: Self = Self(1 << 3);

    /// Retry lanes
    pub const RETRY_LANES: Self = Self(0x1F << 19);

    /// Work that only runs when nothing else is pending
    pub const IDLE: Self = Self(1 << 29);

    /// Every lane below idle
    pub const NON_IDLE: Self = Self((1 << 29) - 1);

    /// Lanes that are never time sliced
    pub const BLOCKING: Self = Self(Self::SYNC.0 | Self::INPUT_CONTINUOUS.0 | Self::DEFAULT.0);

    /// All lanes
    pub const ALL: Self = Self((1 << TOTAL_LANES) - 1);

    /// Create lanes from raw bits
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Get raw bits
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if no lane is set
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two lane sets
    #[inline]
    pub const fn merge(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two lane sets
    #[inline]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Remove `subset` from this set
    #[inline]
    pub const fn remove(self, subset: Self) -> Self {
        Self(self.0 & !subset.0)
    }

    /// Check if the sets share any lane
    #[inline]
    pub const fn includes_some(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Check if every lane of `self` is also in `set`
    #[inline]
    pub const fn is_subset_of(self, set: Self) -> bool {
        (self.0 & set.0) == self.0
    }

    /// Most urgent lane in the set (lowest set bit)
    #[inline]
    pub const fn highest_priority_lane(self) -> Lane {
        Self(self.0 & self.0.wrapping_neg())
    }

    /// Whether the set needs synchronous service
    #[inline]
    pub const fn is_blocking(self) -> bool {
        self.includes_some(Self::BLOCKING)
    }

    /// Whether the set contains anything below idle
    #[inline]
    pub const fn includes_non_idle_work(self) -> bool {
        self.includes_some(Self::NON_IDLE)
    }

    /// Whether the lane is one of the transition lanes
    #[inline]
    pub const fn is_transition(self) -> bool {
        self.includes_some(Self::TRANSITION_LANES)
    }

    /// Index of a single lane
    #[inline]
    pub const fn index(self) -> usize {
        self.0.trailing_zeros() as usize
    }

    /// Iterate single lanes, most urgent first
    pub fn iter(self) -> impl Iterator<Item = Lane> {
        let mut rest = self;
        core::iter::from_fn(move || {
            if rest.is_empty() {
                return None;
            }
            let lane = rest.highest_priority_lane();
            rest = rest.remove(lane);
            Some(lane)
        })
    }

    /// The group of lanes that is worked on together with the most urgent
    /// lane of this set. Transition and retry lanes are batched; everything
    /// else is serviced one lane at a time.
    pub fn highest_priority_lanes(self) -> Lanes {
        let lane = self.highest_priority_lane();
        if lane.includes_some(Self::TRANSITION_LANES) {
            self.intersect(Self::TRANSITION_LANES)
        } else if lane.includes_some(Self::RETRY_LANES) {
            self.intersect(Self::RETRY_LANES)
        } else {
            lane
        }
    }
}

impl core::ops::BitOr for Lanes {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for Lanes {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl core::ops::BitAnd for Lanes {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl core::ops::BitAndAssign for Lanes {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl core::ops::Not for Lanes {
    type Output = Self;

    #[inline]
    fn not(self) -> Self::Output {
        Self(!self.0 & Self::ALL.0)
    }
}

impl core::fmt::Debug for Lanes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Lanes({:#033b})", self.0)
    }
}

/// Fixed array with one slot per lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneMap<T: Copy>([T; TOTAL_LANES]);

impl<T: Copy> LaneMap<T> {
    /// Create a map with every slot set to `value`
    pub const fn new(value: T) -> Self {
        Self([value; TOTAL_LANES])
    }

    /// Value for a single lane
    pub fn get(&self, lane: Lane) -> T {
        self.0[lane.index()]
    }

    /// Set the value for a single lane
    pub fn set(&mut self, lane: Lane, value: T) {
        self.0[lane.index()] = value;
    }
}

/// Priority of the event that produced an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventPriority {
    /// Clicks, key presses
    Discrete,
    /// Pointer moves, scrolling
    Continuous,
    /// Anything untracked
    Default,
    /// Background work
    Idle,
}

impl EventPriority {
    /// Lane updates at this priority are assigned
    pub const fn lane(self) -> Lane {
        match self {
            Self::Discrete => Lanes::SYNC,
            Self::Continuous => Lanes::INPUT_CONTINUOUS,
            Self::Default => Lanes::DEFAULT,
            Self::Idle => Lanes::IDLE,
        }
    }

    /// Host task priority used to service this event priority
    pub const fn scheduler_priority(self) -> void_scheduler::PriorityLevel {
        use void_scheduler::PriorityLevel;
        match self {
            Self::Discrete => PriorityLevel::Immediate,
            Self::Continuous => PriorityLevel::UserBlocking,
            Self::Default => PriorityLevel::Normal,
            Self::Idle => PriorityLevel::Idle,
        }
    }
}

/// Event priority matching the most urgent lane of a set
pub fn lanes_to_event_priority(lanes: Lanes) -> EventPriority {
    let lane = lanes.highest_priority_lane();
    if lane.is_empty() || lane.bits() <= Lanes::SYNC.bits() {
        EventPriority::Discrete
    } else if lane.bits() <= Lanes::INPUT_CONTINUOUS.bits() {
        EventPriority::Continuous
    } else if lane.includes_non_idle_work() {
        EventPriority::Default
    } else {
        EventPriority::Idle
    }
}

/// Round-robin allocator for transition lanes
#[derive(Debug, Clone, Copy)]
pub struct TransitionLaneCursor {
    next: Lane,
}

impl TransitionLaneCursor {
    /// Start at the first transition lane
    pub const fn new() -> Self {
        Self {
            next: Lanes::TRANSITION_LANE_1,
        }
    }

    /// Hand out the next transition lane, wrapping around after the last
    pub fn claim(&mut self) -> Lane {
        let lane = self.next;
        let shifted = Lanes::from_bits(self.next.bits() << 1);
        self.next = if shifted.includes_some(Lanes::TRANSITION_LANES) {
            shifted
        } else {
            Lanes::TRANSITION_LANE_1
        };
        lane
    }
}

impl Default for TransitionLaneCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-root lane bookkeeping
#[derive(Debug, Clone)]
pub struct RootLanes {
    /// Lanes with unserviced updates
    pub pending: Lanes,
    /// Lanes past their expiration time; rendered as blocking
    pub expired: Lanes,
    /// Lanes that carry entanglements
    pub entangled: Lanes,
    /// For each lane, the lanes it must be rendered together with
    pub entanglements: LaneMap<Lanes>,
    /// Time each lane first became pending
    pub event_times: LaneMap<Option<u64>>,
    /// Time after which each lane is considered starved
    pub expiration_times: LaneMap<Option<u64>>,
}

impl RootLanes {
    /// Empty bookkeeping
    pub const fn new() -> Self {
        Self {
            pending: Lanes::NONE,
            expired: Lanes::NONE,
            entangled: Lanes::NONE,
            entanglements: LaneMap::new(Lanes::NONE),
            event_times: LaneMap::new(None),
            expiration_times: LaneMap::new(None),
        }
    }

    /// Record an update on `lane`
    pub fn mark_updated(&mut self, lane: Lane, event_time: u64) {
        self.pending |= lane;
        for l in lane.iter() {
            if self.event_times.get(l).is_none() {
                self.event_times.set(l, Some(event_time));
            }
        }
    }

    /// A render covering some lanes committed; `remaining` are still pending
    pub fn mark_finished(&mut self, remaining: Lanes) {
        let no_longer_pending = self.pending.remove(remaining);

        self.pending = remaining;
        self.expired &= remaining;
        self.entangled &= remaining;

        for lane in no_longer_pending.iter() {
            self.event_times.set(lane, None);
            self.expiration_times.set(lane, None);
            self.entanglements.set(lane, Lanes::NONE);
        }
    }

    /// Require `lanes` to always be rendered together
    pub fn mark_entangled(&mut self, lanes: Lanes) {
        self.entangled |= lanes;
        for lane in self.entangled.iter() {
            let existing = self.entanglements.get(lane);
            if lane.includes_some(lanes) || existing.includes_some(lanes) {
                self.entanglements.set(lane, existing | lanes);
            }
        }
    }

    /// `render_lanes` plus everything entangled with them
    pub fn entangled_lanes(&self, render_lanes: Lanes) -> Lanes {
        let mut result = render_lanes;
        for lane in self.entangled.intersect(render_lanes).iter() {
            result |= self.entanglements.get(lane);
        }
        result
    }

    /// Pick the lanes to render next.
    ///
    /// `wip_lanes` are the lanes of a render already in progress on this
    /// root; they are kept unless the new candidate is strictly more urgent,
    /// so a yielded render is not thrown away for work of equal or lower
    /// priority.
    pub fn next_lanes(&self, wip_lanes: Lanes) -> Lanes {
        if self.pending.is_empty() {
            return Lanes::NONE;
        }

        let next = self.pending.highest_priority_lanes();

        if !wip_lanes.is_empty() && wip_lanes != next {
            let next_lane = next.highest_priority_lane();
            let wip_lane = wip_lanes.highest_priority_lane();
            if next_lane.bits() >= wip_lane.bits()
                || (next_lane == Lanes::DEFAULT && wip_lane.is_transition())
            {
                return wip_lanes;
            }
        }

        self.entangled_lanes(next)
    }

    /// Starvation check: assign expiration times to newly pending lanes and
    /// move lanes whose time has passed into `expired`.
    pub fn mark_starved_lanes_as_expired(&mut self, now: u64, policy: &ExpirationPolicy) -> Lanes {
        let mut newly_expired = Lanes::NONE;
        for lane in self.pending.iter() {
            match self.expiration_times.get(lane) {
                None => {
                    let expiration = policy.timeout_for(lane).map(|t| now.saturating_add(t));
                    self.expiration_times.set(lane, expiration);
                }
                Some(time) if time <= now => {
                    if !self.expired.includes_some(lane) {
                        newly_expired |= lane;
                    }
                    self.expired |= lane;
                }
                Some(_) => {}
            }
        }
        newly_expired
    }

    /// Whether any of `lanes` has expired
    pub fn includes_expired(&self, lanes: Lanes) -> bool {
        self.expired.includes_some(lanes)
    }
}

impl Default for RootLanes {
    fn default() -> Self {
        Self::new()
    }
}
