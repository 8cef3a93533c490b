//! Host interface
//!
//! The reconciler never touches output nodes directly. Everything it does to
//! the output tree goes through a [`Host`]: node creation during the render
//! phase (detached nodes only), and attach/detach/update during commit.

use serde_json::Value;
use void_core::Handle;

use crate::element::Props;

/// Marker for host instance handles
pub enum HostNode {}

/// Handle to a host instance stored by the reconciler
pub type InstanceId = Handle<HostNode>;

/// Changed attributes of a host node, computed during render and applied
/// during commit. `None` values are removed attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostUpdate {
    pub changes: Vec<(String, Option<Value>)>,
}

impl HostUpdate {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Attribute diff between two prop sets
pub fn diff_attributes(old: &Props, new: &Props) -> Option<HostUpdate> {
    let mut changes = Vec::new();
    for (name, old_value) in old.attributes() {
        if !new.attributes().contains_key(name) {
            changes.push((name.clone(), None));
        } else if new.get(name) != Some(old_value) {
            changes.push((name.clone(), new.get(name).cloned()));
        }
    }
    for (name, value) in new.attributes() {
        if !old.attributes().contains_key(name) {
            changes.push((name.clone(), Some(value.clone())));
        }
    }
    if changes.is_empty() {
        None
    } else {
        Some(HostUpdate { changes })
    }
}

/// Output-tree backend
pub trait Host {
    /// A node of the output tree
    type Instance: 'static;
    /// What node refs receive
    type Public: Clone + 'static;

    /// Create a detached element node
    fn create_instance(&mut self, tag: &str, props: &Props) -> Self::Instance;

    /// Create a detached text node
    fn create_text_instance(&mut self, text: &str) -> Self::Instance;

    /// Attach a child while building a detached subtree
    fn append_initial_child(&mut self, parent: &Self::Instance, child: &Self::Instance) {
        self.append_child(parent, child);
    }

    /// Attach `child` as the last child of `parent`, moving it if attached
    fn append_child(&mut self, parent: &Self::Instance, child: &Self::Instance);

    /// Attach `child` before `before`, moving it if attached
    fn insert_before(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
        before: &Self::Instance,
    );

    /// Detach `child` from `parent`
    fn remove_child(&mut self, parent: &Self::Instance, child: &Self::Instance);

    /// Compute the update payload for a host node whose props changed
    fn prepare_update(
        &self,
        _instance: &Self::Instance,
        _tag: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Option<HostUpdate> {
        diff_attributes(old_props, new_props)
    }

    /// Apply an update payload
    fn commit_update(
        &mut self,
        instance: &Self::Instance,
        update: &HostUpdate,
        tag: &str,
        old_props: &Props,
        new_props: &Props,
    );

    /// Replace a text node's content
    fn commit_text_update(&mut self, instance: &Self::Instance, old_text: &str, new_text: &str);

    /// Value handed to node refs
    fn public_instance(&self, instance: &Self::Instance) -> Self::Public;

    /// Called before the first mutation of a commit
    fn prepare_for_commit(&mut self) {}

    /// Called after the last mutation of a commit
    fn reset_after_commit(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_attributes() {
        let old = Props::new().with("a", 1).with("b", 2).with("c", 3);
        let new = Props::new().with("a", 1).with("b", 5).with("d", 4);
        let update = diff_attributes(&old, &new).unwrap();
        assert_eq!(
            update.changes,
            vec![
                ("b".to_string(), Some(json!(5))),
                ("c".to_string(), None),
                ("d".to_string(), Some(json!(4))),
            ]
        );
    }

    #[test]
    fn test_diff_unchanged_is_none() {
        let old = Props::new().with("a", 1);
        let new = Props::new().with("a", 1);
        assert!(diff_attributes(&old, &new).is_none());
    }
}
