//! # Void Reconciler
//!
//! Keeps a host tree in sync with declared element trees. It provides:
//! - Fiber trees, double-buffered between a committed and a work-in-progress copy
//! - Keyed child diffing with move detection
//! - Prioritized updates on lanes, with skipped updates rebased in order
//! - Interruptible, time-sliced rendering on a cooperative scheduler
//! - A commit phase that applies every host mutation of a render at once
//! - Lifecycle callbacks, passive effects, refs and error fallbacks
//!
//! ## Architecture
//!
//! ```text
//! render() / Updater ──► update queues ──► root scheduler ──► scheduler task
//!                                                                   │
//!                                                                   ▼
//!                              begin_work ◄──► complete_work   (render phase)
//!                                                                   │
//!                                                                   ▼
//!                          mutation ──► layout ──► passive    (commit phase)
//!                              │
//!                              ▼
//!                            Host
//! ```
//!
//! The reconciler never holds host nodes outside its instance arena, and only
//! creates detached nodes during render. Everything visible happens in commit.
//!
//! ## Key Invariants
//!
//! 1. **Alternates pair up** - a fiber and its alternate point at each other
//! 2. **Commit is atomic** - a render either commits completely or not at all
//! 3. **Updates are never lost** - pending updates are shared by both alternates
//! 4. **Order survives skipping** - updates skipped for priority replay in order
//! 5. **Callbacks are contained** - a panicking callback is logged, not propagated
//!
//! ## Example
//!
//! ```
//! use void_reconciler::prelude::*;
//!
//! /// Host that stores nodes as tags with child lists
//! #[derive(Default)]
//! struct Tree {
//!     nodes: Vec<(String, Vec<usize>)>,
//! }
//!
//! impl Host for Tree {
//!     type Instance = usize;
//!     type Public = usize;
//!
//!     fn create_instance(&mut self, tag: &str, _props: &Props) -> usize {
//!         self.nodes.push((tag.to_string(), Vec::new()));
//!         self.nodes.len() - 1
//!     }
//!     fn create_text_instance(&mut self, text: &str) -> usize {
//!         self.nodes.push((format!("'{text}'"), Vec::new()));
//!         self.nodes.len() - 1
//!     }
//!     fn append_child(&mut self, parent: &usize, child: &usize) {
//!         self.nodes[*parent].1.retain(|c| c != child);
//!         self.nodes[*parent].1.push(*child);
//!     }
//!     fn insert_before(&mut self, parent: &usize, child: &usize, before: &usize) {
//!         let children = &mut self.nodes[*parent].1;
//!         children.retain(|c| c != child);
//!         let at = children.iter().position(|c| c == before).unwrap_or(children.len());
//!         children.insert(at, *child);
//!     }
//!     fn remove_child(&mut self, parent: &usize, child: &usize) {
//!         self.nodes[*parent].1.retain(|c| c != child);
//!     }
//!     fn commit_update(&mut self, _: &usize, _: &HostUpdate, _: &str, _: &Props, _: &Props) {}
//!     fn commit_text_update(&mut self, node: &usize, _old: &str, new: &str) {
//!         self.nodes[*node].0 = format!("'{new}'");
//!     }
//!     fn public_instance(&self, node: &usize) -> usize {
//!         *node
//!     }
//! }
//!
//! let mut host = Tree::default();
//! let container = host.create_instance("root", &Props::new());
//! let mut reconciler = Reconciler::new(host, ReconcilerConfig::default());
//! let root = reconciler.create_root(container);
//!
//! let list = Element::host("list").children([Element::text("a"), Element::text("b")]);
//! reconciler.render(root, Some(list)).unwrap();
//! reconciler.work_until_idle().unwrap();
//!
//! let tree = reconciler.host();
//! let list_node = tree.nodes[0].1[0];
//! assert_eq!(tree.nodes[list_node].1.len(), 2);
//! ```

pub mod component;
pub mod config;
pub mod element;
pub mod error;
pub mod fiber;
pub mod flags;
pub mod host;
pub mod lane;
pub mod reconciler;
pub mod root;
pub mod update_queue;
pub mod updater;

mod begin_work;
mod child;
mod commit;
mod complete_work;
mod concurrent;
mod gc;
mod root_scheduler;
mod work_loop;

pub use component::{function_component, Cleanup, Component, ComponentSlot, FnComponent, LifecycleContext};
pub use config::{ExpirationPolicy, PassiveEffectMode, ReconcilerConfig};
pub use element::{Element, ElementKind, Key, NodeRef, Props};
pub use error::{ReconcileError, RenderError, Result};
pub use fiber::{Fiber, FiberArena, FiberId, FiberKind, FiberState};
pub use flags::Flags;
pub use host::{diff_attributes, Host, HostUpdate, InstanceId};
pub use lane::{lanes_to_event_priority, EventPriority, Lane, Lanes, RootLanes};
pub use reconciler::{Reconciler, ReconcilerStats};
pub use root::{FiberRoot, RootId};
pub use update_queue::{StateFn, StatePayload, UpdateCallback};
pub use updater::{UpdateInbox, Updater};

pub use void_scheduler::{Clock, ManualClock, SystemClock};

/// Prelude
pub mod prelude {
    pub use crate::{
        function_component, Component, Element, EventPriority, Host, HostUpdate, Lanes,
        LifecycleContext, NodeRef, Props, Reconciler, ReconcilerConfig, RootId, Updater,
    };
}
