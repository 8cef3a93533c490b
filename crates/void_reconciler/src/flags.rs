//! Fiber effect flags
//!
//! Flags mark what the commit phase has to do for a fiber. `subtree_flags`
//! on each fiber is the union of its descendants' flags, which lets the
//! commit passes skip subtrees with nothing to do.

use serde::{Deserialize, Serialize};

/// Effect flags carried by a fiber
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flags(u32);

impl Flags {
    /// Nothing to do
    pub const NONE: Self = Self(0);

    /// Insert or move the fiber's host nodes
    pub const PLACEMENT: Self = Self(1 << 1);

    /// Apply an update payload, or run mount/update lifecycle
    pub const UPDATE: Self = Self(1 << 2);

    /// Fiber has children queued in `deletions`
    pub const CHILD_DELETION: Self = Self(1 << 4);

    /// Run update completion callbacks
    pub const CALLBACK: Self = Self(1 << 6);

    /// Attach or detach a node ref
    pub const REF: Self = Self(1 << 9);

    /// Run passive effects after commit
    pub const PASSIVE: Self = Self(1 << 11);

    /// Fiber holds a ref at all; survives bailouts
    pub const REF_STATIC: Self = Self(1 << 21);

    /// Fiber has passive effects at all; survives bailouts
    pub const PASSIVE_STATIC: Self = Self(1 << 23);

    /// Flags copied when a fiber is cloned into the work-in-progress tree
    pub const STATIC_MASK: Self = Self(Self::REF_STATIC.0 | Self::PASSIVE_STATIC.0);

    /// Flags handled by the mutation pass
    pub const MUTATION_MASK: Self =
        Self(Self::PLACEMENT.0 | Self::UPDATE.0 | Self::CHILD_DELETION.0 | Self::REF.0);

    /// Flags handled by the layout pass
    pub const LAYOUT_MASK: Self = Self(Self::UPDATE.0 | Self::CALLBACK.0 | Self::REF.0);

    /// Flags handled by the passive pass
    pub const PASSIVE_MASK: Self = Self(Self::PASSIVE.0 | Self::CHILD_DELETION.0);

    /// Get raw bits
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if no flag is set
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check if all flags in `other` are set
    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any flag in `other` is set
    #[inline]
    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Set flags
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear flags
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Flags present in both
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl core::ops::BitOr for Flags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for Flags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl core::ops::BitAnd for Flags {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl core::ops::Not for Flags {
    type Output = Self;

    #[inline]
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}
