//! Child reconciliation
//!
//! Matches a fiber's new child elements against its current child fibers.
//! Fibers are reused when key and type agree, otherwise created; leftovers
//! are recorded as deletions on the parent. The first pass walks both lists
//! in step while keys line up; the rest is matched through a key map.
//!
//! Moves are detected against `last_placed_index`: a reused fiber whose old
//! index is lower than that of a fiber already kept in place must move and
//! gets `PLACEMENT`. For `[A, B, C] -> [C, A, B]` this keeps `C` and moves
//! `A` and `B`.

use std::collections::HashMap;

use crate::element::{Element, Key};
use crate::error::WorkError;
use crate::fiber::FiberId;
use crate::flags::Flags;
use crate::host::Host;
use crate::lane::Lanes;
use crate::reconciler::Reconciler;

type WorkResult<T> = std::result::Result<T, WorkError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Key(Key),
    Index(usize),
}

impl ChildKey {
    fn new(key: Option<&Key>, index: usize) -> Self {
        match key {
            Some(key) => ChildKey::Key(key.clone()),
            None => ChildKey::Index(index),
        }
    }
}

/// Appends new fibers to a sibling list
#[derive(Default)]
struct ChildList {
    first: Option<FiberId>,
    last: Option<FiberId>,
}

impl<H: Host> Reconciler<H> {
    /// Reconcile `children` into `wip`'s child list
    pub(crate) fn reconcile_children(
        &mut self,
        current: Option<FiberId>,
        wip: FiberId,
        children: &[Element],
        render_lanes: Lanes,
    ) -> WorkResult<Option<FiberId>> {
        let current_first = match current {
            Some(c) => self.fibers.get(c)?.child,
            None => None,
        };
        // Nothing under a fresh fiber is on screen, so there is nothing to
        // move or delete.
        let track = current.is_some();
        let first = self.reconcile_child_list(wip, current_first, children, render_lanes, track)?;
        self.fibers.get_mut(wip)?.child = first;
        Ok(first)
    }

    fn reconcile_child_list(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        children: &[Element],
        lanes: Lanes,
        track: bool,
    ) -> WorkResult<Option<FiberId>> {
        let mut list = ChildList::default();
        let mut old = current_first;
        let mut last_placed = 0;
        let mut new_idx = 0;

        while let Some(old_fiber) = old {
            if new_idx >= children.len() {
                break;
            }
            let (old_index, old_sibling) = {
                let f = self.fibers.get(old_fiber)?;
                (f.index, f.sibling)
            };
            let (slot, next_old) = if old_index > new_idx {
                (None, Some(old_fiber))
            } else {
                (Some(old_fiber), old_sibling)
            };

            let Some(new_fiber) = self.update_slot(parent, slot, &children[new_idx], lanes)? else {
                break;
            };
            if track {
                if let Some(slot) = slot {
                    if self.fibers.get(new_fiber)?.alternate.is_none() {
                        self.delete_child(parent, slot)?;
                    }
                }
            }
            last_placed = self.place_child(new_fiber, last_placed, new_idx, track)?;
            self.link(&mut list, new_fiber)?;
            old = next_old;
            new_idx += 1;
        }

        if new_idx == children.len() {
            self.delete_remaining_children(parent, old, track)?;
            return Ok(list.first);
        }

        if old.is_none() {
            for (idx, element) in children.iter().enumerate().skip(new_idx) {
                let fiber = self.create_child(parent, element, lanes);
                last_placed = self.place_child(fiber, last_placed, idx, track)?;
                self.link(&mut list, fiber)?;
            }
            return Ok(list.first);
        }

        let (mut existing, order) = self.map_remaining_children(old)?;
        for (idx, element) in children.iter().enumerate().skip(new_idx) {
            let key = ChildKey::new(element.key.as_ref(), idx);
            let matched = existing.get(&key).copied();
            let fiber = self.update_element(parent, matched, element, lanes)?;
            if track && self.fibers.get(fiber)?.alternate.is_some() {
                existing.remove(&key);
            }
            last_placed = self.place_child(fiber, last_placed, idx, track)?;
            self.link(&mut list, fiber)?;
        }

        if track {
            for (key, fiber) in order {
                if existing.contains_key(&key) {
                    self.delete_child(parent, fiber)?;
                }
            }
        }
        Ok(list.first)
    }

    /// Reuse `old` for `element` if keys agree; `None` means the lists
    /// diverge here
    fn update_slot(
        &mut self,
        parent: FiberId,
        old: Option<FiberId>,
        element: &Element,
        lanes: Lanes,
    ) -> WorkResult<Option<FiberId>> {
        let old_key = match old {
            Some(id) => self.fibers.get(id)?.key.clone(),
            None => None,
        };
        if old_key != element.key {
            return Ok(None);
        }
        self.update_element(parent, old, element, lanes).map(Some)
    }

    /// Work-in-progress copy of `current` if its type matches, else a new fiber
    fn update_element(
        &mut self,
        parent: FiberId,
        current: Option<FiberId>,
        element: &Element,
        lanes: Lanes,
    ) -> WorkResult<FiberId> {
        if let Some(current) = current {
            if self.fibers.get(current)?.kind.matches(&element.kind) {
                let fiber = self.use_fiber(current, element)?;
                self.fibers.get_mut(fiber)?.parent = Some(parent);
                return Ok(fiber);
            }
        }
        Ok(self.create_child(parent, element, lanes))
    }

    fn use_fiber(&mut self, current: FiberId, element: &Element) -> WorkResult<FiberId> {
        let fiber = self
            .fibers
            .create_work_in_progress(current, element.props.clone())?;
        let f = self.fibers.get_mut(fiber)?;
        f.index = 0;
        f.sibling = None;
        f.node_ref = element.node_ref.clone();
        Ok(fiber)
    }

    fn create_child(&mut self, parent: FiberId, element: &Element, lanes: Lanes) -> FiberId {
        let fiber = self.fibers.create_from_element(element, lanes);
        if let Ok(f) = self.fibers.get_mut(fiber) {
            f.parent = Some(parent);
        }
        fiber
    }

    /// Record the new index and decide whether the fiber needs placing
    fn place_child(
        &mut self,
        fiber: FiberId,
        last_placed: usize,
        new_idx: usize,
        track: bool,
    ) -> WorkResult<usize> {
        let alternate = {
            let f = self.fibers.get_mut(fiber)?;
            f.index = new_idx;
            if !track {
                return Ok(last_placed);
            }
            f.alternate
        };
        match alternate {
            Some(current) => {
                let old_index = self.fibers.get(current)?.index;
                if old_index < last_placed {
                    self.fibers.get_mut(fiber)?.flags |= Flags::PLACEMENT;
                    Ok(last_placed)
                } else {
                    Ok(old_index)
                }
            }
            None => {
                self.fibers.get_mut(fiber)?.flags |= Flags::PLACEMENT;
                Ok(last_placed)
            }
        }
    }

    fn link(&mut self, list: &mut ChildList, fiber: FiberId) -> WorkResult<()> {
        match list.last {
            Some(last) => self.fibers.get_mut(last)?.sibling = Some(fiber),
            None => list.first = Some(fiber),
        }
        list.last = Some(fiber);
        Ok(())
    }

    fn delete_child(&mut self, parent: FiberId, child: FiberId) -> WorkResult<()> {
        let f = self.fibers.get_mut(parent)?;
        f.deletions.push(child);
        f.flags |= Flags::CHILD_DELETION;
        Ok(())
    }

    fn delete_remaining_children(
        &mut self,
        parent: FiberId,
        mut child: Option<FiberId>,
        track: bool,
    ) -> WorkResult<()> {
        if !track {
            return Ok(());
        }
        while let Some(id) = child {
            self.delete_child(parent, id)?;
            child = self.fibers.get(id)?.sibling;
        }
        Ok(())
    }

    /// Key map of the unmatched old children, plus their order for
    /// deterministic deletion
    fn map_remaining_children(
        &self,
        mut child: Option<FiberId>,
    ) -> WorkResult<(HashMap<ChildKey, FiberId>, Vec<(ChildKey, FiberId)>)> {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        while let Some(id) = child {
            let f = self.fibers.get(id)?;
            let key = ChildKey::new(f.key.as_ref(), f.index);
            map.insert(key.clone(), id);
            order.push((key, id));
            child = f.sibling;
        }
        Ok((map, order))
    }
}
