//! Generational handles and the arena they address
//!
//! Graph-shaped data (trees with parent, sibling and alternate links) is kept
//! in a [`HandleMap`] and linked through [`Handle`] values instead of
//! references. A handle carries the generation of the slot it was issued for,
//! so a handle that outlives its value is detected as stale instead of
//! silently aliasing whatever reused the slot.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use alloc::vec::Vec;

use crate::error::HandleError;

/// A type-safe handle to a value of type `T` stored in a [`HandleMap`]
#[repr(transparent)]
pub struct Handle<T> {
    /// Lower 32 bits: index, upper 32 bits: generation
    bits: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Create a handle from index and generation
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            bits: (generation as u64) << 32 | index as u64,
            _marker: PhantomData,
        }
    }

    /// Create an invalid/null handle
    #[inline]
    pub const fn null() -> Self {
        Self {
            bits: u64::MAX,
            _marker: PhantomData,
        }
    }

    /// Check if this handle is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.bits == u64::MAX
    }

    /// Slot index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits as u32
    }

    /// Slot generation this handle was issued for
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits >> 32) as u32
    }

    /// Reinterpret as a handle to another marker type.
    ///
    /// Used when a value stored in one map is addressed through a public
    /// marker type that does not expose the storage type.
    #[inline]
    pub const fn cast<U>(self) -> Handle<U> {
        Handle {
            bits: self.bits,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.bits.cmp(&other.bits)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "#null")
        } else {
            write!(f, "#{}v{}", self.index(), self.generation())
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena storing values addressed by generational handles.
///
/// Removing a value bumps the slot generation and recycles the slot, so
/// allocation stays bounded by the peak number of live values.
pub struct HandleMap<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> HandleMap<T> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with room for `capacity` values
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Insert a value and get a handle to it
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            Handle::new(index, 0)
        }
    }

    /// Remove a value; stale or null handles return `None`
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index());
        self.len -= 1;
        Some(value)
    }

    /// Get a reference to a value
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if handle.is_null() {
            return None;
        }
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Get a mutable reference to a value
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slot_mut(handle)?.value.as_mut()
    }

    /// Like [`HandleMap::get`] but reports why the lookup failed
    pub fn try_get(&self, handle: Handle<T>) -> Result<&T, HandleError> {
        self.check(handle)?;
        self.get(handle).ok_or(HandleError::Stale)
    }

    /// Like [`HandleMap::get_mut`] but reports why the lookup failed
    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, HandleError> {
        self.check(handle)?;
        self.get_mut(handle).ok_or(HandleError::Stale)
    }

    /// Check if a handle addresses a live value
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated, including recycled ones
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over live handles and values
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Handle::new(i as u32, slot.generation), v))
        })
    }

    /// Iterate over live handles and mutable values
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(move |v| (Handle::new(i as u32, generation), v))
        })
    }

    /// Collect the handles of all live values
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(h, _)| h).collect()
    }

    /// Remove every value for which `keep` returns false
    pub fn retain(&mut self, mut keep: impl FnMut(Handle<T>, &T) -> bool) -> usize {
        let doomed: Vec<Handle<T>> = self
            .iter()
            .filter(|(h, v)| !keep(*h, v))
            .map(|(h, _)| h)
            .collect();
        for handle in &doomed {
            self.remove(*handle);
        }
        doomed.len()
    }

    fn check(&self, handle: Handle<T>) -> Result<(), HandleError> {
        if handle.is_null() {
            return Err(HandleError::Null);
        }
        if handle.index() as usize >= self.slots.len() {
            return Err(HandleError::OutOfBounds);
        }
        Ok(())
    }

    fn slot_mut(&mut self, handle: Handle<T>) -> Option<&mut Slot<T>> {
        if handle.is_null() {
            return None;
        }
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        Some(slot)
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleMap")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .finish()
    }
}
