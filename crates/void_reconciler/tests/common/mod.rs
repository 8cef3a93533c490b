//! Shared fixtures for the void_reconciler integration tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{json, Value};
use void_reconciler::prelude::*;
use void_reconciler::{Cleanup, Lane, ManualClock, ReconcileError, RenderError};

pub type NodeId = usize;

/// One call made on the test host
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    Create { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    AppendInitial { parent: NodeId, child: NodeId },
    Append { parent: NodeId, child: NodeId },
    Insert { parent: NodeId, child: NodeId, before: NodeId },
    Remove { parent: NodeId, child: NodeId },
    Update { node: NodeId, changes: Vec<(String, Option<Value>)> },
    TextUpdate { node: NodeId, old: String, new: String },
}

impl HostOp {
    /// Whether the op changes a tree that may be on screen
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            HostOp::Create { .. } | HostOp::CreateText { .. } | HostOp::AppendInitial { .. }
        )
    }

    /// Whether the op attaches an existing node somewhere
    pub fn is_move(&self) -> bool {
        matches!(self, HostOp::Append { .. } | HostOp::Insert { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestNode {
    pub tag: String,
    pub text: Option<String>,
    pub attrs: BTreeMap<String, Value>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// In-memory host that records every call
#[derive(Debug, Default)]
pub struct TestHost {
    pub nodes: Vec<TestNode>,
    pub ops: Vec<HostOp>,
    pub in_commit: bool,
    pub commits: usize,
    /// Mutations seen outside `prepare_for_commit` / `reset_after_commit`
    pub stray_mutations: usize,
}

impl TestHost {
    fn record(&mut self, op: HostOp) {
        if op.is_mutation() && !self.in_commit {
            self.stray_mutations += 1;
        }
        self.ops.push(op);
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child].parent.take() {
            self.nodes[parent].children.retain(|c| *c != child);
        }
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, at: Option<usize>) {
        self.detach(child);
        let children = &mut self.nodes[parent].children;
        let at = at.unwrap_or(children.len()).min(children.len());
        children.insert(at, child);
        self.nodes[child].parent = Some(parent);
    }

    /// Markup of a node's children
    pub fn markup(&self, node: NodeId) -> String {
        self.nodes[node]
            .children
            .iter()
            .map(|c| self.node_markup(*c))
            .collect()
    }

    /// Markup of a node and its subtree
    pub fn node_markup(&self, node: NodeId) -> String {
        let n = &self.nodes[node];
        match &n.text {
            Some(text) => text.clone(),
            None => format!("<{}>{}</{}>", n.tag, self.markup(node), n.tag),
        }
    }

    /// Recorded ops that matched `pred`
    pub fn count(&self, pred: impl Fn(&HostOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }
}

impl Host for TestHost {
    type Instance = NodeId;
    type Public = NodeId;

    fn create_instance(&mut self, tag: &str, props: &Props) -> NodeId {
        let node = self.nodes.len();
        self.nodes.push(TestNode {
            tag: tag.to_string(),
            attrs: props.attributes().clone(),
            ..TestNode::default()
        });
        self.record(HostOp::Create {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text_instance(&mut self, text: &str) -> NodeId {
        let node = self.nodes.len();
        self.nodes.push(TestNode {
            tag: "#text".to_string(),
            text: Some(text.to_string()),
            ..TestNode::default()
        });
        self.record(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn append_initial_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.attach(*parent, *child, None);
        self.record(HostOp::AppendInitial {
            parent: *parent,
            child: *child,
        });
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.attach(*parent, *child, None);
        self.record(HostOp::Append {
            parent: *parent,
            child: *child,
        });
    }

    fn insert_before(&mut self, parent: &NodeId, child: &NodeId, before: &NodeId) {
        self.detach(*child);
        let at = self.nodes[*parent].children.iter().position(|c| c == before);
        self.attach(*parent, *child, at);
        self.record(HostOp::Insert {
            parent: *parent,
            child: *child,
            before: *before,
        });
    }

    fn remove_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.detach(*child);
        self.record(HostOp::Remove {
            parent: *parent,
            child: *child,
        });
    }

    fn commit_update(
        &mut self,
        node: &NodeId,
        update: &HostUpdate,
        _tag: &str,
        _old_props: &Props,
        _new_props: &Props,
    ) {
        for (name, value) in &update.changes {
            match value {
                Some(value) => self.nodes[*node].attrs.insert(name.clone(), value.clone()),
                None => self.nodes[*node].attrs.remove(name),
            };
        }
        self.record(HostOp::Update {
            node: *node,
            changes: update.changes.clone(),
        });
    }

    fn commit_text_update(&mut self, node: &NodeId, old_text: &str, new_text: &str) {
        self.nodes[*node].text = Some(new_text.to_string());
        self.record(HostOp::TextUpdate {
            node: *node,
            old: old_text.to_string(),
            new: new_text.to_string(),
        });
    }

    fn public_instance(&self, node: &NodeId) -> NodeId {
        *node
    }

    fn prepare_for_commit(&mut self) {
        self.in_commit = true;
    }

    fn reset_after_commit(&mut self) {
        self.in_commit = false;
        self.commits += 1;
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A reconciler on a manual clock with one root
pub struct Harness {
    pub reconciler: Reconciler<TestHost>,
    pub clock: ManualClock,
    pub root: RootId,
    pub container: NodeId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        init_logging();
        let mut host = TestHost::default();
        let container = host.create_instance("root", &Props::new());
        host.ops.clear();

        let clock = ManualClock::new();
        let mut reconciler = Reconciler::with_clock(host, config, Box::new(clock.clone()));
        let root = reconciler.create_root(container);
        Self {
            reconciler,
            clock,
            root,
            container,
        }
    }

    /// Render at discrete priority and commit before returning
    pub fn render_sync(&mut self, element: Element) {
        self.try_render_sync(element).unwrap();
    }

    pub fn try_render_sync(&mut self, element: Element) -> Result<Lane, ReconcileError> {
        let root = self.root;
        self.reconciler.flush_sync(|r| r.render(root, Some(element)))?
    }

    /// Schedule a render at the ambient priority without running it
    pub fn render(&mut self, element: Element) -> Lane {
        self.reconciler.render(self.root, Some(element)).unwrap()
    }

    /// Run every scheduled task
    pub fn settle(&mut self) {
        self.reconciler.work_until_idle().unwrap();
    }

    pub fn host(&self) -> &TestHost {
        self.reconciler.host()
    }

    /// Markup currently attached to the container
    pub fn markup(&self) -> String {
        self.host().markup(self.container)
    }

    /// Forget the ops recorded so far
    pub fn clear_ops(&mut self) {
        self.reconciler.host_mut().ops.clear();
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.host().ops
    }
}

/// `<list>` of keyed `<item>`s, each holding its key as text
pub fn keyed_list(keys: &[&str]) -> Element {
    Element::host("list").children(
        keys.iter()
            .map(|k| Element::host("item").key(*k).child(Element::text(*k))),
    )
}

/// Stateful component that renders its state as text followed by fixed
/// children, and records its lifecycle
pub struct Probe {
    pub name: &'static str,
    pub children: Vec<Element>,
    pub passive: bool,
    pub events: Rc<RefCell<Vec<String>>>,
    pub renders: Rc<Cell<usize>>,
    pub updater: Rc<RefCell<Option<Updater>>>,
}

impl Probe {
    pub fn new(name: &'static str, events: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            name,
            children: Vec::new(),
            passive: false,
            events: events.clone(),
            renders: Rc::new(Cell::new(0)),
            updater: Rc::new(RefCell::new(None)),
        }
    }

    pub fn with_children(mut self, children: Vec<Element>) -> Self {
        self.children = children;
        self
    }

    pub fn with_passive_effect(mut self) -> Self {
        self.passive = true;
        self
    }

    fn log(&self, event: &str, state: &Value) {
        self.events
            .borrow_mut()
            .push(format!("{} {} {}", self.name, event, state_text(state)));
    }
}

pub fn state_text(state: &Value) -> String {
    match state {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Component for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn initial_state(&self, props: &Props) -> Value {
        props.get("start").cloned().unwrap_or(json!(0))
    }

    fn render(&self, _props: &Props, state: &Value) -> Vec<Element> {
        self.renders.set(self.renders.get() + 1);
        let mut out = vec![Element::text(format!("{}:{}", self.name, state_text(state)))];
        out.extend(self.children.iter().cloned());
        out
    }

    fn on_mount(&self, ctx: &LifecycleContext<'_>) {
        *self.updater.borrow_mut() = Some(ctx.updater().clone());
        self.log("mount", ctx.state());
    }

    fn on_update(&self, ctx: &LifecycleContext<'_>, _prev_props: &Props, _prev_state: &Value) {
        self.log("update", ctx.state());
    }

    fn on_will_unmount(&self, ctx: &LifecycleContext<'_>) {
        self.log("unmount", ctx.state());
    }

    fn has_passive_effect(&self) -> bool {
        self.passive
    }

    fn passive_effect(&self, ctx: &LifecycleContext<'_>) -> Option<Cleanup> {
        self.log("effect", ctx.state());
        let events = self.events.clone();
        let line = format!("{} cleanup {}", self.name, state_text(ctx.state()));
        Some(Box::new(move || events.borrow_mut().push(line)))
    }
}

/// Renders the `label` prop as text, advancing the clock by `cost` ms
pub struct Slow {
    pub clock: ManualClock,
    pub cost: u64,
}

impl Component for Slow {
    fn name(&self) -> &str {
        "Slow"
    }

    fn render(&self, props: &Props, _state: &Value) -> Vec<Element> {
        self.clock.advance(self.cost);
        let label = props.get("label").and_then(Value::as_str).unwrap_or("");
        vec![Element::text(label)]
    }
}

/// Panics while rendering
pub struct Bomb;

impl Component for Bomb {
    fn name(&self) -> &str {
        "Bomb"
    }

    fn render(&self, _props: &Props, _state: &Value) -> Vec<Element> {
        panic!("boom");
    }
}

/// Renders its children, or a text fallback once a descendant fails
pub struct Boundary {
    pub children: Vec<Element>,
    pub caught: Rc<RefCell<Vec<String>>>,
}

impl Component for Boundary {
    fn name(&self) -> &str {
        "Boundary"
    }

    fn render(&self, _props: &Props, _state: &Value) -> Vec<Element> {
        self.children.clone()
    }

    fn recover_from_error(&self, _props: &Props, error: &RenderError) -> Option<Vec<Element>> {
        self.caught.borrow_mut().push(error.to_string());
        Some(vec![Element::text("fallback")])
    }
}
