//! Complete phase
//!
//! Runs on the way back up the tree. New host fibers get a detached instance
//! with their host children already attached; updated ones get their
//! attribute diff computed now and applied at commit. Every completed fiber
//! then folds its children's flags and lanes into its own.

use crate::error::{ReconcileError, WorkError};
use crate::fiber::{FiberId, FiberKind};
use crate::flags::Flags;
use crate::host::{Host, InstanceId};
use crate::lane::Lanes;
use crate::reconciler::Reconciler;

type WorkResult<T> = std::result::Result<T, WorkError>;

impl<H: Host> Reconciler<H> {
    pub(crate) fn complete_work(&mut self, current: Option<FiberId>, wip: FiberId) -> WorkResult<()> {
        let (kind, new_props) = {
            let f = self.fibers.get(wip)?;
            (f.kind.clone(), f.pending_props.clone())
        };

        match kind {
            FiberKind::Host { tag, instance } => match (current, instance) {
                (Some(current), Some(instance)) => {
                    let old_props = self.fibers.get(current)?.memoized_props.clone();
                    if !old_props.ptr_eq(&new_props) {
                        let update = self.host.prepare_update(
                            self.instance(instance)?,
                            &tag,
                            &old_props,
                            &new_props,
                        );
                        if let Some(update) = update {
                            let f = self.fibers.get_mut(wip)?;
                            f.host_update = Some(update);
                            f.flags |= Flags::UPDATE;
                        }
                    }
                }
                _ => {
                    let created = self.host.create_instance(&tag, &new_props);
                    let id: InstanceId = self.instances.insert(created).cast();
                    self.append_all_children(id, wip)?;
                    self.fibers.get_mut(wip)?.kind.set_instance(id);
                    log::trace!("Created <{tag}> for {wip:?}");
                }
            },
            FiberKind::Text { instance } => {
                let new_text = new_props.text_content().unwrap_or("");
                match (current, instance) {
                    (Some(current), Some(_)) => {
                        let old = self.fibers.get(current)?.memoized_props.clone();
                        if old.text_content().unwrap_or("") != new_text {
                            self.fibers.get_mut(wip)?.flags |= Flags::UPDATE;
                        }
                    }
                    _ => {
                        let created = self.host.create_text_instance(new_text);
                        let id: InstanceId = self.instances.insert(created).cast();
                        self.fibers.get_mut(wip)?.kind.set_instance(id);
                    }
                }
            }
            FiberKind::Root { .. } | FiberKind::Component { .. } | FiberKind::Fragment => {}
        }

        self.bubble_properties(wip)
    }

    /// Attach the nearest host descendants of `wip` to its new instance
    fn append_all_children(&mut self, parent: InstanceId, wip: FiberId) -> WorkResult<()> {
        let mut node = self.fibers.get(wip)?.child;
        while let Some(id) = node {
            let (instance, is_host, child) = {
                let f = self.fibers.get(id)?;
                (f.kind.instance(), f.kind.is_host_node(), f.child)
            };
            if is_host {
                let instance = instance.ok_or_else(|| {
                    ReconcileError::Structural(format!("host fiber {id:?} completed without an instance"))
                })?;
                let (Some(p), Some(c)) = (
                    self.instances.get(parent.cast()),
                    self.instances.get(instance.cast()),
                ) else {
                    return Err(ReconcileError::Structural("host instance freed during render".into()).into());
                };
                self.host.append_initial_child(p, c);
            } else if let Some(child) = child {
                node = Some(child);
                continue;
            }

            // Next sibling, climbing back up as far as needed
            let mut cursor = id;
            node = loop {
                let f = self.fibers.get(cursor)?;
                if let Some(sibling) = f.sibling {
                    break Some(sibling);
                }
                match f.parent {
                    Some(p) if p != wip => cursor = p,
                    _ => break None,
                }
            };
        }
        Ok(())
    }

    /// Fold children's lanes and flags into `completed`
    fn bubble_properties(&mut self, completed: FiberId) -> WorkResult<()> {
        let (alternate, first_child) = {
            let f = self.fibers.get(completed)?;
            (f.alternate, f.child)
        };
        // Children still shared with the current tree were not rendered; only
        // their static flags are meaningful.
        let did_bailout = match alternate {
            Some(alt) => self.fibers.get(alt).map(|a| a.child == first_child).unwrap_or(false),
            None => false,
        };

        let mut child_lanes = Lanes::NONE;
        let mut subtree = Flags::NONE;
        let mut cursor = first_child;
        while let Some(id) = cursor {
            let f = self.fibers.get_mut(id)?;
            child_lanes |= f.lanes | f.child_lanes;
            if did_bailout {
                subtree |= (f.subtree_flags | f.flags).intersection(Flags::STATIC_MASK);
            } else {
                subtree |= f.subtree_flags | f.flags;
            }
            f.parent = Some(completed);
            cursor = f.sibling;
        }

        let f = self.fibers.get_mut(completed)?;
        f.subtree_flags |= subtree;
        f.child_lanes = child_lanes;
        Ok(())
    }
}
