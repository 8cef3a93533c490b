//! Integration tests for void_reconciler

mod common;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use serde_json::{json, Value};
use void_reconciler::prelude::*;
use void_reconciler::{PassiveEffectMode, ReconcileError};

fn events() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_initial_mount() {
    let mut h = Harness::new();
    h.render(Element::host("list").children([
        Element::text("a"),
        Element::text("b"),
        Element::text("c"),
    ]));
    assert_eq!(h.markup(), "");

    h.reconciler.work_until_idle().unwrap();
    assert_eq!(h.markup(), "<list>abc</list>");

    // Detached subtree built during render, attached once during commit
    assert_eq!(h.host().count(|op| matches!(op, HostOp::CreateText { .. })), 3);
    assert_eq!(h.host().count(|op| matches!(op, HostOp::AppendInitial { .. })), 3);
    let mutations: Vec<_> = h.ops().iter().filter(|op| op.is_mutation()).collect();
    assert_eq!(mutations.len(), 1);
    assert!(matches!(mutations[0], HostOp::Append { parent, .. } if *parent == h.container));
    assert_eq!(h.host().stray_mutations, 0);
}

#[test]
fn test_text_update() {
    let mut h = Harness::new();
    h.render_sync(Element::host("p").child(Element::text("A")));
    h.clear_ops();

    h.render_sync(Element::host("p").child(Element::text("B")));
    assert_eq!(h.markup(), "<p>B</p>");
    assert_eq!(h.ops().len(), 1);
    assert!(matches!(
        &h.ops()[0],
        HostOp::TextUpdate { old, new, .. } if old == "A" && new == "B"
    ));
}

#[test]
fn test_attribute_update() {
    let mut h = Harness::new();
    h.render_sync(Element::host("box").attr("color", "red").attr("size", 1));
    h.clear_ops();

    h.render_sync(Element::host("box").attr("color", "blue"));
    assert_eq!(h.ops().len(), 1);
    let HostOp::Update { node, changes } = &h.ops()[0] else {
        panic!("expected an attribute update, got {:?}", h.ops());
    };
    assert_eq!(
        changes,
        &vec![
            ("color".to_string(), Some(json!("blue"))),
            ("size".to_string(), None),
        ]
    );
    assert_eq!(h.host().nodes[*node].attrs.get("color"), Some(&json!("blue")));
    assert!(!h.host().nodes[*node].attrs.contains_key("size"));
}

#[test]
fn test_identical_rerender_touches_nothing() {
    let mut h = Harness::new();
    let tree = keyed_list(&["a", "b", "c"]);
    h.render_sync(tree.clone());
    h.clear_ops();

    // Same element again, then an equal but freshly built one
    h.render_sync(tree);
    h.render_sync(keyed_list(&["a", "b", "c"]));
    assert!(h.ops().is_empty(), "unexpected host calls: {:?}", h.ops());
    assert_eq!(h.markup(), "<list><item>a</item><item>b</item><item>c</item></list>");
}

#[test]
fn test_keyed_reorder_moves_without_recreating() {
    let mut h = Harness::new();
    h.render_sync(keyed_list(&["a", "b", "c"]));
    h.clear_ops();

    h.render_sync(keyed_list(&["c", "a", "b"]));
    assert_eq!(h.markup(), "<list><item>c</item><item>a</item><item>b</item></list>");
    assert_eq!(h.host().count(|op| !op.is_mutation()), 0);
    assert_eq!(h.host().count(|op| matches!(op, HostOp::Remove { .. })), 0);
    assert!(h.host().count(HostOp::is_move) <= 2);
}

#[test]
fn test_keyed_insert_and_delete() {
    let mut h = Harness::new();
    h.render_sync(keyed_list(&["a", "b", "c"]));
    h.clear_ops();

    h.render_sync(keyed_list(&["a", "c"]));
    assert_eq!(h.markup(), "<list><item>a</item><item>c</item></list>");
    assert_eq!(h.ops().len(), 1);
    assert!(matches!(h.ops()[0], HostOp::Remove { .. }));
    h.clear_ops();

    h.render_sync(keyed_list(&["a", "b", "c"]));
    assert_eq!(h.markup(), "<list><item>a</item><item>b</item><item>c</item></list>");
    let mutations: Vec<_> = h.ops().iter().filter(|op| op.is_mutation()).cloned().collect();
    assert_eq!(mutations.len(), 1);
    let HostOp::Insert { child, before, .. } = &mutations[0] else {
        panic!("expected an insert, got {mutations:?}");
    };
    assert_eq!(h.host().node_markup(*child), "<item>b</item>");
    assert_eq!(h.host().node_markup(*before), "<item>c</item>");
}

#[test]
fn test_type_change_replaces_node() {
    let mut h = Harness::new();
    h.render_sync(Element::host("a").child(Element::text("x")));
    h.clear_ops();

    h.render_sync(Element::host("b").child(Element::text("x")));
    assert_eq!(h.markup(), "<b>x</b>");
    assert_eq!(h.host().count(|op| matches!(op, HostOp::Remove { .. })), 1);
    assert_eq!(h.host().count(|op| matches!(op, HostOp::Create { .. })), 1);
}

#[test]
fn test_fragment_children_are_flattened() {
    let mut h = Harness::new();
    h.render_sync(Element::host("row").children([
        Element::text("a"),
        Element::fragment(vec![Element::text("b"), Element::text("c")]),
        Element::text("d"),
    ]));
    assert_eq!(h.markup(), "<row>abcd</row>");

    h.render_sync(Element::host("row").children([
        Element::text("a"),
        Element::fragment(vec![Element::text("c")]),
        Element::text("d"),
    ]));
    assert_eq!(h.markup(), "<row>acd</row>");
}

#[test]
fn test_component_state_updates() {
    let log = events();
    let probe = Rc::new(Probe::new("p", &log));
    let mut h = Harness::new();
    h.render_sync(Element::component(probe.clone(), Props::new()));
    assert_eq!(h.markup(), "p:0");

    let updater = probe.updater.borrow().clone().unwrap();
    updater.set_state(json!(5));
    h.settle();
    assert_eq!(h.markup(), "p:5");

    updater.update(|prev, _| json!(prev.as_i64().unwrap_or(0) * 2));
    updater.update(|prev, _| json!(prev.as_i64().unwrap_or(0) + 1));
    h.settle();
    assert_eq!(h.markup(), "p:11");
    assert_eq!(*log.borrow(), vec!["p mount 0", "p update 5", "p update 11"]);
}

#[test]
fn test_merge_state() {
    let log = events();
    let probe = Rc::new(Probe::new("p", &log));
    let mut h = Harness::new();
    h.render_sync(Element::component(
        probe.clone(),
        Props::new().with("start", json!({ "a": 1, "b": 2 })),
    ));

    let updater = probe.updater.borrow().clone().unwrap();
    updater.merge_state(json!({ "b": 3, "c": 4 }));
    h.settle();
    assert_eq!(h.markup(), format!("p:{}", json!({ "a": 1, "b": 3, "c": 4 })));
}

#[test]
fn test_skipped_updates_replay_in_order() {
    let log = events();
    let probe = Rc::new(Probe::new("p", &log));
    let mut h = Harness::new();
    h.render_sync(Element::component(probe.clone(), Props::new().with("start", "")));
    assert_eq!(h.markup(), "p:");

    let updater = probe.updater.borrow().clone().unwrap();
    let append = |suffix: &'static str| {
        move |prev: &Value, _: &Props| json!(format!("{}{}", prev.as_str().unwrap_or(""), suffix))
    };
    let default_lane = updater.update(append("a"));
    let sync_lane = updater.with_priority(EventPriority::Discrete).update(append("b"));
    assert_eq!(default_lane, Lanes::DEFAULT);
    assert_eq!(sync_lane, Lanes::SYNC);

    // The urgent update renders first, on top of the base state
    h.reconciler.flush_sync(|_| ()).unwrap();
    assert_eq!(h.markup(), "p:b");

    // Then both, in the order they were issued
    h.settle();
    assert_eq!(h.markup(), "p:ab");
}

#[test]
fn test_unchanged_props_skip_child_render() {
    let log = events();
    let child = Rc::new(Probe::new("child", &log));
    let parent = Rc::new(
        Probe::new("parent", &log)
            .with_children(vec![Element::component(child.clone(), Props::new())]),
    );
    let mut h = Harness::new();
    h.render_sync(Element::component(parent.clone(), Props::new()));
    assert_eq!(h.markup(), "parent:0child:0");
    assert_eq!(*log.borrow(), vec!["child mount 0", "parent mount 0"]);

    let updater = parent.updater.borrow().clone().unwrap();
    updater.set_state(json!(1));
    h.settle();

    assert_eq!(h.markup(), "parent:1child:0");
    assert_eq!(parent.renders.get(), 2);
    assert_eq!(child.renders.get(), 1);
    assert_eq!(log.borrow().last().map(String::as_str), Some("parent update 1"));
}

#[test]
fn test_bailout_still_descends_to_updated_leaf() {
    let log = events();
    let leaf = Rc::new(Probe::new("leaf", &log));
    let mid = Rc::new(
        Probe::new("mid", &log).with_children(vec![Element::component(leaf.clone(), Props::new())]),
    );
    let top = Rc::new(
        Probe::new("top", &log).with_children(vec![Element::component(mid.clone(), Props::new())]),
    );
    let mut h = Harness::new();
    h.render_sync(Element::component(top.clone(), Props::new()));
    assert_eq!(h.markup(), "top:0mid:0leaf:0");
    h.clear_ops();

    let updater = leaf.updater.borrow().clone().unwrap();
    updater.set_state(json!(9));
    h.settle();

    // Only the leaf renders; its ancestors are cloned on the way down
    assert_eq!(h.markup(), "top:0mid:0leaf:9");
    assert_eq!(top.renders.get(), 1);
    assert_eq!(mid.renders.get(), 1);
    assert_eq!(leaf.renders.get(), 2);
    assert_eq!(h.host().count(|op| matches!(op, HostOp::TextUpdate { .. })), 1);

    // Same state again changes nothing on the host
    h.clear_ops();
    updater.set_state(json!(9));
    h.settle();
    assert_eq!(h.markup(), "top:0mid:0leaf:9");
    assert_eq!(mid.renders.get(), 1);
    assert_eq!(h.host().count(HostOp::is_mutation), 0);
}

#[test]
fn test_should_update_can_decline() {
    struct Frozen;

    impl Component for Frozen {
        fn render(&self, props: &Props, _state: &Value) -> Vec<Element> {
            let label = props.get("label").and_then(Value::as_str).unwrap_or("");
            vec![Element::text(label)]
        }

        fn should_update(&self, _: &Props, _: &Props, _: &Value, _: &Value) -> bool {
            false
        }
    }

    let frozen: Rc<dyn Component> = Rc::new(Frozen);
    let mut h = Harness::new();
    h.render_sync(Element::component(frozen.clone(), Props::new().with("label", "one")));
    h.render_sync(Element::component(frozen, Props::new().with("label", "two")));
    assert_eq!(h.markup(), "one");
}

#[test]
fn test_lifecycle_order() {
    let log = events();
    let child = Rc::new(Probe::new("child", &log));
    let parent = Rc::new(
        Probe::new("parent", &log)
            .with_children(vec![Element::component(child.clone(), Props::new())]),
    );
    let mut h = Harness::new();
    h.render_sync(Element::component(parent, Props::new()));
    h.render_sync(Element::host("empty"));

    assert_eq!(
        *log.borrow(),
        vec![
            "child mount 0",
            "parent mount 0",
            "parent unmount 0",
            "child unmount 0",
        ]
    );
    assert_eq!(h.markup(), "<empty></empty>");
}

#[test]
fn test_passive_effects_deferred() {
    let log = events();
    let probe = Rc::new(Probe::new("p", &log).with_passive_effect());
    let mut h = Harness::new();
    h.render_sync(Element::component(probe.clone(), Props::new()));

    assert_eq!(*log.borrow(), vec!["p mount 0"]);
    assert!(h.reconciler.has_pending_passive_effects());
    h.settle();
    assert_eq!(*log.borrow(), vec!["p mount 0", "p effect 0"]);
    assert!(!h.reconciler.has_pending_passive_effects());

    log.borrow_mut().clear();
    probe.updater.borrow().as_ref().unwrap().set_state(json!(1));
    h.settle();
    assert_eq!(*log.borrow(), vec!["p update 1", "p cleanup 0", "p effect 1"]);

    log.borrow_mut().clear();
    h.reconciler.unmount(h.root).unwrap();
    assert_eq!(*log.borrow(), vec!["p unmount 1", "p cleanup 1"]);
}

#[test]
fn test_passive_effects_synchronous() {
    let log = events();
    let probe = Rc::new(Probe::new("p", &log).with_passive_effect());
    let mut h = Harness::with_config(ReconcilerConfig {
        passive_effects: PassiveEffectMode::Synchronous,
        ..ReconcilerConfig::default()
    });
    h.render_sync(Element::component(probe, Props::new()));

    assert_eq!(*log.borrow(), vec!["p mount 0", "p effect 0"]);
    assert!(!h.reconciler.has_pending_passive_effects());
    assert_eq!(h.reconciler.stats().passive_flushes, 1);
}

#[test]
fn test_refs_attach_and_detach() {
    let mut h = Harness::new();
    let first = NodeRef::new();
    h.render_sync(Element::host("list").child(Element::host("item").with_ref(first.clone())));

    let node = first.get::<NodeId>().unwrap();
    assert_eq!(h.host().nodes[node].tag, "item");

    // Swapping refs detaches the old one and attaches the new one
    let second = NodeRef::new();
    h.render_sync(Element::host("list").child(Element::host("item").with_ref(second.clone())));
    assert!(!first.is_attached());
    assert_eq!(second.get::<NodeId>(), Some(node));

    h.render_sync(Element::host("list"));
    assert!(!second.is_attached());
}

#[test]
fn test_render_callback_runs_after_commit() {
    let mut h = Harness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let root = h.root;
    h.reconciler
        .render_with_callback(
            root,
            Some(Element::text("hi")),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    h.settle();
    assert_eq!(h.markup(), "hi");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    h.render_sync(Element::text("again"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_error_boundary_renders_fallback() {
    let caught = events();
    let boundary = Rc::new(Boundary {
        children: vec![Element::text("before"), Element::component(Rc::new(Bomb), Props::new())],
        caught: caught.clone(),
    });
    let mut h = Harness::new();
    h.render_sync(Element::host("app").child(Element::component(boundary, Props::new())));

    assert_eq!(h.markup(), "<app>fallback</app>");
    assert_eq!(*caught.borrow(), vec!["Bomb failed to render: boom"]);
    assert_eq!(h.reconciler.stats().recovered_errors, 1);
}

#[test]
fn test_error_boundary_catches_update_failure() {
    /// Renders "fine" until its state turns true, then panics
    struct Toggle {
        updater: Rc<RefCell<Option<Updater>>>,
    }

    impl Component for Toggle {
        fn name(&self) -> &str {
            "Toggle"
        }

        fn initial_state(&self, _props: &Props) -> Value {
            json!(false)
        }

        fn render(&self, _props: &Props, state: &Value) -> Vec<Element> {
            if state.as_bool().unwrap_or(false) {
                panic!("toggle boom");
            }
            vec![Element::text("fine")]
        }

        fn on_mount(&self, ctx: &LifecycleContext<'_>) {
            *self.updater.borrow_mut() = Some(ctx.updater().clone());
        }
    }

    let caught = events();
    let toggle = Rc::new(Toggle {
        updater: Rc::new(RefCell::new(None)),
    });
    let boundary = Rc::new(Boundary {
        children: vec![Element::component(toggle.clone(), Props::new())],
        caught: caught.clone(),
    });
    let mut h = Harness::new();
    h.render_sync(Element::host("app").children([
        Element::component(boundary, Props::new()),
        Element::text("tail"),
    ]));
    assert_eq!(h.markup(), "<app>finetail</app>");
    assert!(caught.borrow().is_empty());

    let updater = toggle.updater.borrow().clone().unwrap();
    updater.set_state(json!(true));
    h.settle();

    assert_eq!(h.markup(), "<app>fallbacktail</app>");
    assert_eq!(*caught.borrow(), vec!["Toggle failed to render: toggle boom"]);
    assert_eq!(h.reconciler.stats().recovered_errors, 1);
    assert_eq!(h.host().stray_mutations, 0);
}

#[test]
fn test_unhandled_render_error() {
    let mut h = Harness::new();
    h.render_sync(Element::text("stable"));

    let err = h
        .try_render_sync(Element::host("app").child(Element::component(Rc::new(Bomb), Props::new())))
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RenderFailed { ref component, ref message } if component == "Bomb" && message == "boom"
    ));

    // The failed render left the committed tree alone
    assert_eq!(h.markup(), "stable");
    assert_eq!(h.reconciler.root_pending_lanes(h.root).unwrap(), Lanes::NONE);
    assert!(!h.reconciler.is_rendering());

    h.render_sync(Element::text("recovered"));
    assert_eq!(h.markup(), "recovered");
}

#[test]
fn test_lifecycle_panic_is_contained() {
    struct Fragile;

    impl Component for Fragile {
        fn render(&self, _props: &Props, _state: &Value) -> Vec<Element> {
            vec![Element::text("fragile")]
        }

        fn on_mount(&self, _ctx: &LifecycleContext<'_>) {
            panic!("mount failed");
        }
    }

    let mut h = Harness::new();
    h.render_sync(Element::component(Rc::new(Fragile), Props::new()));
    assert_eq!(h.markup(), "fragile");
    assert_eq!(h.reconciler.stats().callback_errors, 1);
}

#[test]
fn test_nested_update_limit() {
    struct Looper;

    impl Component for Looper {
        fn render(&self, _props: &Props, state: &Value) -> Vec<Element> {
            vec![Element::text(state.to_string())]
        }

        fn on_mount(&self, ctx: &LifecycleContext<'_>) {
            ctx.updater().update(|prev, _| json!(prev.as_i64().unwrap_or(0) + 1));
        }

        fn on_update(&self, ctx: &LifecycleContext<'_>, _: &Props, _: &Value) {
            ctx.updater().update(|prev, _| json!(prev.as_i64().unwrap_or(0) + 1));
        }
    }

    let mut h = Harness::with_config(ReconcilerConfig {
        nested_update_limit: 10,
        ..ReconcilerConfig::default()
    });
    let err = h
        .try_render_sync(Element::component(Rc::new(Looper), Props::new()))
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NestedUpdateLimit(11)));

    // The root is usable again
    h.render_sync(Element::text("ok"));
    assert_eq!(h.markup(), "ok");
}

#[test]
fn test_deep_tree_commits_and_unmounts() {
    /// Renders a copy of itself `depth` times, then a text leaf
    struct Chain {
        this: Weak<Chain>,
        unmounts: Cell<usize>,
    }

    impl Component for Chain {
        fn name(&self) -> &str {
            "Chain"
        }

        fn render(&self, props: &Props, _state: &Value) -> Vec<Element> {
            let depth = props.get("depth").and_then(Value::as_u64).unwrap_or(0);
            match (depth, self.this.upgrade()) {
                (0, _) | (_, None) => vec![Element::text("bottom")],
                (_, Some(this)) => vec![Element::component(this, Props::new().with("depth", depth - 1))],
            }
        }

        fn on_will_unmount(&self, _ctx: &LifecycleContext<'_>) {
            self.unmounts.set(self.unmounts.get() + 1);
        }
    }

    const DEPTH: u64 = 10_000;
    let chain = Rc::new_cyclic(|this| Chain {
        this: this.clone(),
        unmounts: Cell::new(0),
    });
    let mut h = Harness::new();
    h.render_sync(Element::component(chain.clone(), Props::new().with("depth", DEPTH)));

    // The only host node sits at the bottom of the chain
    assert_eq!(h.markup(), "bottom");
    assert_eq!(h.host().count(|op| matches!(op, HostOp::CreateText { .. })), 1);

    let container = h.reconciler.unmount(h.root).unwrap();
    assert_eq!(container, h.container);
    assert_eq!(h.markup(), "");
    assert_eq!(chain.unmounts.get(), DEPTH as usize + 1);
    assert_eq!(h.host().stray_mutations, 0);
}

#[test]
fn test_transitions() {
    let mut h = Harness::new();
    h.render_sync(Element::text("start"));
    let root = h.root;
    let commits = h.reconciler.stats().commits;

    let first = h
        .reconciler
        .start_transition(|r| r.render(root, Some(Element::text("first"))))
        .unwrap();
    let second = h
        .reconciler
        .start_transition(|r| r.render(root, Some(Element::text("second"))))
        .unwrap();
    assert!(first.is_transition());
    assert!(second.is_transition());
    assert_ne!(first, second);
    assert_eq!(h.markup(), "start");

    h.settle();
    assert_eq!(h.markup(), "second");
    assert_eq!(h.reconciler.stats().commits, commits + 1);
}

#[test]
fn test_transitions_queued_during_render_are_entangled() {
    let mut h = Harness::with_config(ReconcilerConfig {
        time_slice_default_lane: true,
        ..ReconcilerConfig::default()
    });
    let slow: Rc<dyn Component> = Rc::new(Slow {
        clock: h.clock.clone(),
        cost: 3,
    });
    let root = h.root;
    h.render(Element::host("row").children(
        (0..4).map(|i| Element::component(slow.clone(), Props::new().with("label", "x")).key(i.to_string())),
    ));
    h.reconciler.run_next_task().unwrap();
    assert!(h.reconciler.is_rendering());

    // Both transitions wait behind the yielded render
    let first = h
        .reconciler
        .start_transition(|r| r.render(root, Some(Element::text("first"))))
        .unwrap();
    let second = h
        .reconciler
        .start_transition(|r| r.render(root, Some(Element::text("second"))))
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(h.reconciler.root_entangled_lanes(root).unwrap(), first | second);

    h.settle();
    assert_eq!(h.markup(), "second");
    assert_eq!(h.reconciler.root_entangled_lanes(root).unwrap(), Lanes::NONE);
    assert_eq!(h.reconciler.root_pending_lanes(root).unwrap(), Lanes::NONE);
}

#[test]
fn test_updates_from_another_thread() {
    let log = events();
    let probe = Rc::new(Probe::new("p", &log));
    let mut h = Harness::new();
    h.render_sync(Element::component(probe.clone(), Props::new()));

    let updater = probe.updater.borrow().clone().unwrap();
    std::thread::spawn(move || {
        updater.set_state(json!(42));
    })
    .join()
    .unwrap();

    assert!(h.reconciler.has_pending_work());
    h.settle();
    assert_eq!(h.markup(), "p:42");
}

#[test]
fn test_updates_to_unmounted_component_are_dropped() {
    let log = events();
    let probe = Rc::new(Probe::new("p", &log));
    let mut h = Harness::new();
    h.render_sync(Element::component(probe.clone(), Props::new()));
    let updater = probe.updater.borrow().clone().unwrap();

    h.render_sync(Element::text("gone"));
    updater.set_state(json!(1));
    h.settle();
    assert_eq!(h.markup(), "gone");
}

#[test]
fn test_unmount_returns_container() {
    let mut h = Harness::new();
    h.render_sync(keyed_list(&["a", "b"]));
    let root = h.root;

    let container = h.reconciler.unmount(root).unwrap();
    assert_eq!(container, h.container);
    assert_eq!(h.markup(), "");
    assert!(matches!(
        h.reconciler.render(root, Some(Element::text("late"))),
        Err(ReconcileError::StaleRoot(_))
    ));
    assert!(h.reconciler.fibers().is_empty());
}

#[test]
fn test_multiple_roots_are_independent() {
    let mut h = Harness::new();
    let other_container = h.reconciler.host_mut().create_instance("other", &Props::new());
    let other = h.reconciler.create_root(other_container);

    h.render_sync(Element::text("one"));
    h.reconciler.render(other, Some(Element::text("two"))).unwrap();
    h.settle();

    assert_eq!(h.markup(), "one");
    assert_eq!(h.host().markup(other_container), "two");
    assert_eq!(h.reconciler.container(other).unwrap(), &other_container);
}

#[test]
fn test_element_from_description() {
    let mut h = Harness::new();
    let element = Element::from_description(&json!({
        "type": "container",
        "props": { "id": 1 },
        "children": [
            { "type": "text", "value": "A" },
            { "type": "leaf", "key": "k" }
        ]
    }))
    .unwrap();
    h.render_sync(element);
    assert_eq!(h.markup(), "<container>A<leaf></leaf></container>");
}

#[test]
fn test_config_from_toml() {
    let config = ReconcilerConfig::from_toml_str(
        r#"
        frame_yield_ms = 8
        passive_effects = "synchronous"
        nested_update_limit = 3

        [expiration]
        default_ms = 100
        "#,
    )
    .unwrap();
    assert_eq!(config.frame_yield_ms, 8);
    assert_eq!(config.passive_effects, PassiveEffectMode::Synchronous);
    assert_eq!(config.expiration.default_ms, 100);
    assert_eq!(config.expiration.sync_ms, 250);

    let h = Harness::with_config(config);
    assert_eq!(h.reconciler.config().nested_update_limit, 3);

    assert!(ReconcilerConfig::from_toml_str("frame_yield_ms = 0").is_err());
    assert!(ReconcilerConfig::from_toml_str("frame_yield_ms = \"fast\"").is_err());
}
