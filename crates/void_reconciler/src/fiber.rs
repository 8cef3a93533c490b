//! Fiber tree
//!
//! Fibers are the reconciler's per-node records. They live in a
//! [`FiberArena`] and link to each other by [`FiberId`]: `parent`, first
//! `child`, next `sibling`, and `alternate`, the same node's record in the
//! other of the two trees (committed "current" and "work in progress").
//! Alternates always point at each other in pairs.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use void_core::{Handle, HandleError, HandleMap};

use crate::component::{Component, ComponentSlot};
use crate::element::{Element, ElementKind, Key, NodeRef, Props};
use crate::flags::Flags;
use crate::host::{HostUpdate, InstanceId};
use crate::lane::Lanes;
use crate::root::RootId;
use crate::update_queue::UpdateQueue;

/// Handle to a fiber
pub type FiberId = Handle<Fiber>;

/// Handle to a mounted component's instance slot
pub type ComponentSlotId = Handle<ComponentSlot>;

/// What a fiber represents
#[derive(Clone)]
pub enum FiberKind {
    /// Top of a tree; its host parent is the root's container
    Root { root: RootId },
    /// Host node
    Host {
        tag: Rc<str>,
        instance: Option<InstanceId>,
    },
    /// Host text node
    Text { instance: Option<InstanceId> },
    /// User component; the slot is shared by both alternates
    Component {
        component: Rc<dyn Component>,
        slot: Option<ComponentSlotId>,
    },
    /// Grouping without a host node
    Fragment,
}

impl FiberKind {
    /// Kind for a newly created fiber of an element
    pub fn from_element(kind: &ElementKind) -> Self {
        match kind {
            ElementKind::Host(tag) => FiberKind::Host {
                tag: tag.clone(),
                instance: None,
            },
            ElementKind::Text => FiberKind::Text { instance: None },
            ElementKind::Component(component) => FiberKind::Component {
                component: component.clone(),
                slot: None,
            },
            ElementKind::Fragment => FiberKind::Fragment,
        }
    }

    /// Whether this fiber can be reused for an element of `kind`
    pub fn matches(&self, kind: &ElementKind) -> bool {
        match (self, kind) {
            (FiberKind::Host { tag, .. }, ElementKind::Host(other)) => tag == other,
            (FiberKind::Text { .. }, ElementKind::Text) => true,
            (FiberKind::Component { component, .. }, ElementKind::Component(other)) => {
                std::ptr::addr_eq(Rc::as_ptr(component), Rc::as_ptr(other))
            }
            (FiberKind::Fragment, ElementKind::Fragment) => true,
            _ => false,
        }
    }

    /// Whether the fiber owns a host node
    pub fn is_host_node(&self) -> bool {
        matches!(self, FiberKind::Host { .. } | FiberKind::Text { .. })
    }

    /// Whether the fiber can act as a host parent
    pub fn is_host_parent(&self) -> bool {
        matches!(self, FiberKind::Host { .. } | FiberKind::Root { .. })
    }

    /// Host instance, if created
    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            FiberKind::Host { instance, .. } | FiberKind::Text { instance } => *instance,
            _ => None,
        }
    }

    pub(crate) fn set_instance(&mut self, id: InstanceId) {
        if let FiberKind::Host { instance, .. } | FiberKind::Text { instance } = self {
            *instance = Some(id);
        }
    }

    /// Component slot, if mounted
    pub fn slot(&self) -> Option<ComponentSlotId> {
        match self {
            FiberKind::Component { slot, .. } => *slot,
            _ => None,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &str {
        match self {
            FiberKind::Root { .. } => "#root",
            FiberKind::Host { tag, .. } => tag,
            FiberKind::Text { .. } => "#text",
            FiberKind::Component { component, .. } => component.name(),
            FiberKind::Fragment => "#fragment",
        }
    }
}

impl fmt::Debug for FiberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberKind::Root { root } => write!(f, "Root({root:?})"),
            FiberKind::Host { tag, instance } => write!(f, "Host({tag}, {instance:?})"),
            FiberKind::Text { instance } => write!(f, "Text({instance:?})"),
            FiberKind::Component { component, slot } => {
                write!(f, "Component({}, {slot:?})", component.name())
            }
            FiberKind::Fragment => write!(f, "Fragment"),
        }
    }
}

/// Memoized state of a fiber
#[derive(Debug, Clone, Default)]
pub enum FiberState {
    #[default]
    Empty,
    /// Element rendered by a root
    Root(Option<Element>),
    /// Component state
    Component(Value),
}

static NULL_STATE: Value = Value::Null;

impl FiberState {
    /// Component state, or null
    pub fn value(&self) -> &Value {
        match self {
            FiberState::Component(value) => value,
            _ => &NULL_STATE,
        }
    }

    /// Element rendered by a root
    pub fn element(&self) -> Option<&Element> {
        match self {
            FiberState::Root(element) => element.as_ref(),
            _ => None,
        }
    }
}

/// One node of the fiber tree
#[derive(Debug)]
pub struct Fiber {
    pub kind: FiberKind,
    pub key: Option<Key>,
    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    /// Position among siblings
    pub index: usize,
    pub pending_props: Props,
    pub memoized_props: Props,
    pub memoized_state: FiberState,
    pub update_queue: Option<UpdateQueue>,
    /// Attribute changes computed in render, applied in commit
    pub host_update: Option<HostUpdate>,
    pub flags: Flags,
    pub subtree_flags: Flags,
    /// Children removed in this render
    pub deletions: Vec<FiberId>,
    /// Lanes of pending work on this fiber
    pub lanes: Lanes,
    /// Lanes of pending work below this fiber
    pub child_lanes: Lanes,
    pub alternate: Option<FiberId>,
    pub node_ref: Option<NodeRef>,
}

impl Fiber {
    /// Fresh, unlinked fiber
    pub fn new(kind: FiberKind, key: Option<Key>, pending_props: Props) -> Self {
        Self {
            kind,
            key,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            memoized_props: pending_props.clone(),
            pending_props,
            memoized_state: FiberState::Empty,
            update_queue: None,
            host_update: None,
            flags: Flags::NONE,
            subtree_flags: Flags::NONE,
            deletions: Vec::new(),
            lanes: Lanes::NONE,
            child_lanes: Lanes::NONE,
            alternate: None,
            node_ref: None,
        }
    }
}

/// Arena owning every fiber of every root
#[derive(Debug, Default)]
pub struct FiberArena {
    map: HandleMap<Fiber>,
}

impl FiberArena {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fiber
    pub fn get(&self, id: FiberId) -> Result<&Fiber, HandleError> {
        self.map.try_get(id)
    }

    /// Look up a fiber mutably
    pub fn get_mut(&mut self, id: FiberId) -> Result<&mut Fiber, HandleError> {
        self.map.try_get_mut(id)
    }

    /// Whether a fiber is alive
    pub fn contains(&self, id: FiberId) -> bool {
        self.map.contains(id)
    }

    /// Number of live fibers
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over live fibers
    pub fn iter(&self) -> impl Iterator<Item = (FiberId, &Fiber)> {
        self.map.iter()
    }

    /// Add a fiber
    pub fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.map.insert(fiber)
    }

    /// Free a fiber
    pub fn remove(&mut self, id: FiberId) -> Option<Fiber> {
        self.map.remove(id)
    }

    /// Free every fiber `keep` rejects
    pub fn retain(&mut self, keep: impl FnMut(FiberId, &Fiber) -> bool) -> usize {
        self.map.retain(keep)
    }

    /// New fiber for a declared element
    pub fn create_from_element(&mut self, element: &Element, lanes: Lanes) -> FiberId {
        let mut fiber = Fiber::new(
            FiberKind::from_element(&element.kind),
            element.key.clone(),
            element.props.clone(),
        );
        fiber.lanes = lanes;
        fiber.node_ref = element.node_ref.clone();
        self.map.insert(fiber)
    }

    /// The alternate of `current`, prepared to be worked on with
    /// `pending_props`.
    ///
    /// The alternate is reused if one exists, otherwise allocated and linked.
    /// Either way it starts as a copy of `current` with only static flags.
    pub fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: Props,
    ) -> Result<FiberId, HandleError> {
        let cur = self.map.try_get(current)?;
        let kind = cur.kind.clone();
        let key = cur.key.clone();
        let reusable = cur.alternate.filter(|alt| self.map.contains(*alt));

        let copy = (
            cur.flags.intersection(Flags::STATIC_MASK),
            cur.lanes,
            cur.child_lanes,
            cur.child,
            cur.sibling,
            cur.index,
            cur.memoized_props.clone(),
            cur.memoized_state.clone(),
            cur.update_queue.as_ref().map(UpdateQueue::clone_for_work),
            cur.node_ref.clone(),
        );

        let wip = match reusable {
            Some(alt) => {
                let fiber = self.map.try_get_mut(alt)?;
                fiber.kind = kind;
                fiber.pending_props = pending_props;
                fiber.subtree_flags = Flags::NONE;
                fiber.deletions.clear();
                fiber.host_update = None;
                alt
            }
            None => {
                let mut fiber = Fiber::new(kind, key, pending_props);
                fiber.alternate = Some(current);
                let id = self.map.insert(fiber);
                self.map.try_get_mut(current)?.alternate = Some(id);
                id
            }
        };

        let (flags, lanes, child_lanes, child, sibling, index, props, state, queue, node_ref) = copy;
        let fiber = self.map.try_get_mut(wip)?;
        fiber.flags = flags;
        fiber.lanes = lanes;
        fiber.child_lanes = child_lanes;
        fiber.child = child;
        fiber.sibling = sibling;
        fiber.index = index;
        fiber.memoized_props = props;
        fiber.memoized_state = state;
        fiber.update_queue = queue;
        fiber.node_ref = node_ref;
        Ok(wip)
    }

    /// Replace the children of `wip`, still shared with its alternate, with
    /// their own work-in-progress copies
    pub fn clone_child_fibers(&mut self, wip: FiberId) -> Result<(), HandleError> {
        let Some(mut current_child) = self.map.try_get(wip)?.child else {
            return Ok(());
        };

        let props = self.map.try_get(current_child)?.pending_props.clone();
        let mut new_child = self.create_work_in_progress(current_child, props)?;
        self.map.try_get_mut(wip)?.child = Some(new_child);
        self.map.try_get_mut(new_child)?.parent = Some(wip);

        while let Some(next) = self.map.try_get(current_child)?.sibling {
            current_child = next;
            let props = self.map.try_get(current_child)?.pending_props.clone();
            let cloned = self.create_work_in_progress(current_child, props)?;
            self.map.try_get_mut(new_child)?.sibling = Some(cloned);
            self.map.try_get_mut(cloned)?.parent = Some(wip);
            new_child = cloned;
        }
        self.map.try_get_mut(new_child)?.sibling = None;
        Ok(())
    }

    /// Direct children in order
    pub fn children(&self, id: FiberId) -> Result<Vec<FiberId>, HandleError> {
        let mut out = Vec::new();
        let mut cursor = self.map.try_get(id)?.child;
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.map.try_get(child)?.sibling;
        }
        Ok(out)
    }

    /// `id` and all of its descendants, parents before children
    pub fn subtree(&self, id: FiberId) -> Result<Vec<FiberId>, HandleError> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            let children = self.children(next)?;
            stack.extend(children.into_iter().rev());
        }
        Ok(out)
    }
}
