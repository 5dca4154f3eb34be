//! Integration tests for weft.
//!
//! These exercise the public API from outside the crate: mounting, keyed
//! diffing, bailouts, effect ordering, lane scheduling, context propagation,
//! and render-phase recovery, all through the headless [`Harness`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use weft::context::Context;
use weft::element::{Component, Element, NodeRef, View};
use weft::hooks::{Cleanup, Deps, StateSetter, TransitionStarter};
use weft::schedule::{Lanes, TaskPriority};
use weft::testing::Harness;

type Slot<T> = Rc<RefCell<Option<T>>>;

fn slot<T>() -> Slot<T> {
    Rc::new(RefCell::new(None))
}

/// A keyed `<li>` with a text label.
fn item(key: i64, label: &str) -> Element {
    Element::host("li").with_key(key).with_child(label)
}

/// A `<ul>` of keyed items.
fn list(entries: &[(i64, &str)]) -> Element {
    Element::host("ul").with_children(
        entries
            .iter()
            .map(|(key, label)| View::Element(item(*key, label)))
            .collect::<Vec<_>>(),
    )
}

/// First text instance under the container, as a string.
fn root_text(harness: &Harness) -> String {
    let host = harness.host();
    let container = host.container();
    let first = host.children_of(container)[0];
    host.text_of(first).expect("root child is text").to_string()
}

// ---------------------------------------------------------------------------
// Mounting
// ---------------------------------------------------------------------------

#[test]
fn mount_builds_host_tree() {
    let harness = Harness::new();
    harness.render_and_flush(
        Element::host("section")
            .with_attr("title", "intro")
            .with_child(Element::host("p").with_child("hello")),
    );
    insta::assert_snapshot!(harness.tree(), @r###"
    <section title="intro">
      <p>
        "hello"
      </p>
    "###);
}

#[test]
fn mount_appends_once_at_the_container() {
    let harness = Harness::new();
    harness.render_and_flush(
        Element::host("div")
            .with_child(Element::host("span").with_child("a"))
            .with_child(Element::host("span").with_child("b")),
    );
    let host = harness.host();
    let container = host.container();
    // The whole fresh subtree arrives with a single top-level insertion.
    let top_level_inserts = host
        .ops()
        .iter()
        .filter(|op| matches!(op, weft::testing::HostOp::Append { parent, .. } if *parent == container))
        .count();
    assert_eq!(top_level_inserts, 1);
    assert_eq!(host.children_of(container).len(), 1);
}

#[test]
fn rerender_updates_text_in_place() {
    let harness = Harness::new();
    harness.render_and_flush(Element::host("div").with_child("hi"));
    harness.take_ops();
    harness.render_and_flush(Element::host("div").with_child("bye"));
    let host = harness.host();
    assert_eq!(host.placement_count(), 0);
    assert_eq!(host.removal_count(), 0);
    assert_eq!(host.text_update_count(), 1);
}

#[test]
fn fragments_are_transparent() {
    let harness = Harness::new();
    harness.render_and_flush(
        Element::host("div").with_child(
            Element::fragment()
                .with_child(Element::host("em").with_child("x"))
                .with_child("tail"),
        ),
    );
    insta::assert_snapshot!(harness.tree(), @r###"
    <div>
      <em>
        "x"
      </em>
      "tail"
    "###);
}

// ---------------------------------------------------------------------------
// State batching
// ---------------------------------------------------------------------------

#[test]
fn three_synchronous_dispatches_produce_one_render_and_one_commit() {
    let renders = Rc::new(Cell::new(0u32));
    let setter: Slot<StateSetter<i32>> = slot();

    let counter = {
        let renders = renders.clone();
        let setter = setter.clone();
        Component::new("Counter", move |hooks, _| {
            renders.set(renders.get() + 1);
            let (count, set_count) = hooks.use_state(|| 0);
            *setter.borrow_mut() = Some(set_count);
            View::from(count.to_string())
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(counter.el());
    assert_eq!(renders.get(), 1);
    assert_eq!(root_text(&harness), "0");
    harness.take_ops();

    let set = setter.borrow().clone().expect("setter captured");
    set.update(|n| n + 1);
    set.update(|n| n + 1);
    set.update(|n| n + 1);
    harness.flush();

    // One render pass, one commit, one host text write.
    assert_eq!(renders.get(), 2);
    assert_eq!(harness.host().text_update_count(), 1);
    assert_eq!(root_text(&harness), "3");
}

// ---------------------------------------------------------------------------
// Keyed diffing
// ---------------------------------------------------------------------------

#[test]
fn keyed_rerender_with_same_order_preserves_identity() {
    let harness = Harness::new();
    harness.render_and_flush(list(&[(1, "a"), (2, "b"), (3, "c")]));
    let (ul, before) = {
        let host = harness.host();
        let ul = host.children_of(host.container())[0];
        (ul, host.children_of(ul))
    };
    harness.take_ops();

    harness.render_and_flush(list(&[(1, "a2"), (2, "b2"), (3, "c2")]));
    let host = harness.host();
    // Same instances in the same order: zero placements, zero deletions,
    // content updates only.
    assert_eq!(host.children_of(ul), before);
    assert_eq!(host.placement_count(), 0);
    assert_eq!(host.removal_count(), 0);
    assert_eq!(host.text_update_count(), 3);
}

#[test]
fn keyed_rotation_moves_exactly_one_node() {
    let harness = Harness::new();
    harness.render_and_flush(list(&[(1, "a"), (2, "b"), (3, "c")]));
    let (ul, before) = {
        let host = harness.host();
        let ul = host.children_of(host.container())[0];
        (ul, host.children_of(ul))
    };
    harness.take_ops();

    harness.render_and_flush(list(&[(3, "c"), (1, "a"), (2, "b")]));
    let host = harness.host();
    let after = host.children_of(ul);
    // Keys 1 and 2 keep their instances; key 3 is reinserted at the front.
    assert_eq!(after, vec![before[2], before[0], before[1]]);
    assert_eq!(host.placement_count(), 1);
    assert_eq!(host.removal_count(), 0);
}

#[test]
fn keyed_swap_moves_one_of_two() {
    let harness = Harness::new();
    harness.render_and_flush(list(&[(1, "a"), (2, "b")]));
    let ul = {
        let host = harness.host();
        host.children_of(host.container())[0]
    };
    harness.take_ops();

    harness.render_and_flush(list(&[(2, "b"), (1, "a")]));
    let host = harness.host();
    assert_eq!(host.placement_count(), 1);
    let after = host.children_of(ul);
    assert_eq!(after.len(), 2);
}

#[test]
fn removed_keys_are_deleted() {
    let harness = Harness::new();
    harness.render_and_flush(list(&[(1, "a"), (2, "b"), (3, "c")]));
    let ul = {
        let host = harness.host();
        host.children_of(host.container())[0]
    };
    harness.take_ops();

    harness.render_and_flush(list(&[(2, "b")]));
    let host = harness.host();
    assert_eq!(host.children_of(ul).len(), 1);
    assert_eq!(host.removal_count(), 2);
}

#[test]
fn type_change_replaces_node() {
    let harness = Harness::new();
    harness.render_and_flush(Element::host("div").with_child(Element::host("span").with_child("x")));
    harness.take_ops();
    harness.render_and_flush(Element::host("div").with_child(Element::host("em").with_child("x")));
    let host = harness.host();
    assert_eq!(host.removal_count(), 1);
    assert_eq!(
        host.ops()
            .iter()
            .filter(|op| matches!(op, weft::testing::HostOp::CreateElement { tag, .. } if tag == "em"))
            .count(),
        1
    );
}

// ---------------------------------------------------------------------------
// Bailout
// ---------------------------------------------------------------------------

#[test]
fn unrelated_update_skips_sibling_subtree() {
    let a_setter: Slot<StateSetter<i32>> = slot();
    let b_renders = Rc::new(Cell::new(0u32));

    let comp_a = {
        let a_setter = a_setter.clone();
        Component::new("A", move |hooks, _| {
            let (n, set) = hooks.use_state(|| 0);
            *a_setter.borrow_mut() = Some(set);
            View::from(n.to_string())
        })
    };
    let comp_b = {
        let b_renders = b_renders.clone();
        Component::new("B", move |_, _| {
            b_renders.set(b_renders.get() + 1);
            View::from("b")
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(
        Element::host("div")
            .with_child(comp_a.el())
            .with_child(comp_b.el()),
    );
    assert_eq!(b_renders.get(), 1);

    let set = a_setter.borrow().clone().expect("setter captured");
    set.set(5);
    harness.flush();

    // B's props and state are untouched; its render function must not run,
    // yet its committed children stay attached.
    assert_eq!(b_renders.get(), 1);
    assert!(harness.tree().contains("\"5\""));
    assert!(harness.tree().contains("\"b\""));
}

#[test]
fn memo_component_skips_on_shallow_equal_props() {
    let renders = Rc::new(Cell::new(0u32));
    let inner = {
        let renders = renders.clone();
        Component::new("Label", move |_, props| {
            renders.set(renders.get() + 1);
            let value = match props.attr("v") {
                Some(weft::element::PropValue::Int(n)) => *n,
                _ => -1,
            };
            View::from(value.to_string())
        })
    };
    let app = |v: i64| Element::host("div").with_child(Element::memo(inner.clone()).with_attr("v", v));

    let harness = Harness::new();
    harness.render_and_flush(app(1));
    assert_eq!(renders.get(), 1);

    // Fresh props value, shallowly equal: no re-render.
    harness.render_and_flush(app(1));
    assert_eq!(renders.get(), 1);

    harness.render_and_flush(app(2));
    assert_eq!(renders.get(), 2);
    assert!(harness.tree().contains("\"2\""));
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

#[test]
fn effect_runs_after_mount_and_cleanup_on_deps_change() {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let tracked = {
        let log = log.clone();
        Component::new("Tracked", move |hooks, props| {
            let version = match props.attr("v") {
                Some(weft::element::PropValue::Int(n)) => *n,
                _ => 0,
            };
            let log = log.clone();
            hooks.use_effect(Deps::from([version]), move || {
                log.borrow_mut().push(format!("setup {version}"));
                let log = log.clone();
                Cleanup::new(move || log.borrow_mut().push(format!("teardown {version}")))
            });
            View::from("t")
        })
    };
    let app = |v: i64| tracked.el().with_attr("v", v);

    let harness = Harness::new();
    harness.render_and_flush(app(1));
    assert_eq!(*log.borrow(), vec!["setup 1"]);

    harness.render_and_flush(app(2));
    assert_eq!(*log.borrow(), vec!["setup 1", "teardown 1", "setup 2"]);

    // Unchanged deps: nothing fires.
    harness.render_and_flush(app(2));
    assert_eq!(log.borrow().len(), 3);
}

#[test]
fn all_teardowns_run_before_any_setup_across_a_batch() {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let effectful = |name: &'static str, log: &Rc<RefCell<Vec<String>>>| {
        let log = log.clone();
        Component::new("Effectful", move |hooks, props| {
            let version = match props.attr("v") {
                Some(weft::element::PropValue::Int(n)) => *n,
                _ => 0,
            };
            let log = log.clone();
            hooks.use_effect(Deps::from([version]), move || {
                log.borrow_mut().push(format!("setup {name}"));
                let log = log.clone();
                Cleanup::new(move || log.borrow_mut().push(format!("teardown {name}")))
            });
            View::from(name)
        })
    };
    let first = effectful("one", &log);
    let second = effectful("two", &log);
    let app = move |v: i64| {
        Element::host("div")
            .with_child(first.el().with_attr("v", v))
            .with_child(second.el().with_attr("v", v))
    };

    let harness = Harness::new();
    harness.render_and_flush(app(1));
    assert_eq!(*log.borrow(), vec!["setup one", "setup two"]);
    log.borrow_mut().clear();

    harness.render_and_flush(app(2));
    // Both teardowns strictly precede both setups.
    assert_eq!(
        *log.borrow(),
        vec!["teardown one", "teardown two", "setup one", "setup two"]
    );
}

#[test]
fn unmount_runs_cleanup_before_removing_host_nodes() {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let doomed = {
        let log = log.clone();
        Component::new("Doomed", move |hooks, _| {
            let log = log.clone();
            hooks.use_effect(Deps::none(), move || {
                let log = log.clone();
                Cleanup::new(move || log.borrow_mut().push("cleanup".to_string()))
            });
            View::Many(vec![
                View::Element(Element::host("span").with_child("a")),
                View::Element(Element::host("span").with_child("b")),
            ])
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(Element::host("div").with_child(doomed.el()));
    assert!(harness.tree().contains("span"));
    harness.take_ops();

    harness.render_and_flush(Element::host("div"));
    assert_eq!(*log.borrow(), vec!["cleanup"]);
    let host = harness.host();
    // One batched removal per top-level host node of the deleted subtree.
    assert_eq!(host.removal_count(), 2);
    assert!(!harness.tree().contains("span"));
}

#[test]
fn effect_dispatch_schedules_a_followup_render() {
    let ran = Rc::new(Cell::new(false));
    let bumping = {
        let ran = ran.clone();
        Component::new("Bumping", move |hooks, _| {
            let (n, set) = hooks.use_state(|| 0);
            let ran = ran.clone();
            hooks.use_effect(Deps::none(), move || {
                if !ran.get() {
                    ran.set(true);
                    set.set(7);
                }
            });
            View::from(n.to_string())
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(bumping.el());
    assert_eq!(root_text(&harness), "7");
}

// ---------------------------------------------------------------------------
// Lanes and scheduling
// ---------------------------------------------------------------------------

#[test]
fn sync_update_preempts_idle_update() {
    let renders: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let setter: Slot<StateSetter<i32>> = slot();

    let counter = {
        let renders = renders.clone();
        let setter = setter.clone();
        Component::new("Counter", move |hooks, _| {
            let (n, set) = hooks.use_state(|| 0);
            renders.borrow_mut().push(n);
            *setter.borrow_mut() = Some(set);
            View::from(n.to_string())
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(counter.el());
    let set = setter.borrow().clone().expect("setter captured");

    harness.run_with_priority(TaskPriority::Idle, || set.update(|n| n + 1));
    harness.run_with_priority(TaskPriority::Immediate, || set.update(|n| n + 10));

    // One scheduler step runs the synchronous work only.
    assert!(harness.step());
    assert_eq!(root_text(&harness), "10");
    assert!(harness.pending_lanes().contains(Lanes::IDLE));

    // The idle update is still pending and replays the full sequence.
    harness.flush();
    assert_eq!(root_text(&harness), "11");
    assert!(harness.pending_lanes().is_empty());
}

#[test]
fn time_sliced_render_commits_atomically_after_resume() {
    let harness = Harness::new();
    harness.render(list(&[
        (1, "a"),
        (2, "b"),
        (3, "c"),
        (4, "d"),
        (5, "e"),
    ]));
    // Allow only a few units of work before the loop must yield.
    harness.scheduler().set_yield_budget(3);
    assert!(harness.step());
    // Nothing is observable mid-render.
    assert_eq!(harness.tree(), "");

    harness.scheduler().clear_yield_budget();
    harness.flush();
    let host = harness.host();
    let ul = host.children_of(host.container())[0];
    assert_eq!(host.children_of(ul).len(), 5);
}

#[test]
fn higher_priority_update_discards_in_progress_work() {
    let setter: Slot<StateSetter<i32>> = slot();
    let renders = Rc::new(Cell::new(0u32));
    let counter = {
        let setter = setter.clone();
        let renders = renders.clone();
        Component::new("Counter", move |hooks, _| {
            renders.set(renders.get() + 1);
            let (n, set) = hooks.use_state(|| 0);
            *setter.borrow_mut() = Some(set);
            View::from(n.to_string())
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(counter.el());
    let set = setter.borrow().clone().expect("setter captured");

    // Start a default-priority render and interrupt it mid-walk.
    set.update(|n| n + 1);
    harness.scheduler().set_yield_budget(0);
    assert!(harness.step());
    harness.scheduler().clear_yield_budget();

    // A synchronous update arrives before the continuation runs.
    harness.run_with_priority(TaskPriority::Immediate, || set.update(|n| n + 100));
    harness.flush();

    // Both updates land; the preempted pass was discarded, not committed.
    assert_eq!(root_text(&harness), "101");
}

#[test]
fn transition_updates_render_after_urgent_state() {
    let observed: Rc<RefCell<Vec<(bool, i32)>>> = Rc::new(RefCell::new(Vec::new()));
    let starter: Slot<TransitionStarter> = slot();
    let setter: Slot<StateSetter<i32>> = slot();

    let tabbed = {
        let observed = observed.clone();
        let starter = starter.clone();
        let setter = setter.clone();
        Component::new("Tabbed", move |hooks, _| {
            let (pending, start) = hooks.use_transition();
            let (tab, set_tab) = hooks.use_state(|| 0);
            observed.borrow_mut().push((pending, tab));
            *starter.borrow_mut() = Some(start);
            *setter.borrow_mut() = Some(set_tab);
            View::from(format!("tab {tab}"))
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(tabbed.el());
    let start = starter.borrow().clone().expect("starter captured");
    let set_tab = setter.borrow().clone().expect("setter captured");

    start.start(|| set_tab.set(3));
    harness.flush();

    // The urgent pass shows the pending flag with the old tab; the
    // transition pass lands the new tab with the flag cleared.
    assert_eq!(*observed.borrow(), vec![(false, 0), (true, 0), (false, 3)]);
    assert_eq!(root_text(&harness), "tab 3");
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[test]
fn provider_change_reaches_reader_through_bailed_out_ancestors() {
    let theme: Context<String> = Context::new("theme");
    let reads = Rc::new(Cell::new(0u32));

    let reader = {
        let reads = reads.clone();
        Component::new("Reader", move |hooks, _| {
            reads.set(reads.get() + 1);
            let value = hooks.use_context(&theme);
            View::from(value.as_str())
        })
    };

    // Built once: the reader element (and its props) keep their identity
    // across renders, so only context invalidation can re-render it.
    let reader_el = Element::host("div").with_child(reader.el());
    let app = move |value: &str| theme.provide(value.to_string()).with_child(reader_el.clone());

    let harness = Harness::new();
    harness.render_and_flush(app("light"));
    assert_eq!(reads.get(), 1);
    assert!(harness.tree().contains("\"light\""));

    harness.render_and_flush(app("dark"));
    assert_eq!(reads.get(), 2);
    assert!(harness.tree().contains("\"dark\""));
}

#[test]
fn nested_provider_shadows_outer_value() {
    let level: Context<i32> = Context::new("level");
    let reader = Component::new("Level", move |hooks, _| {
        let value = hooks.use_context(&level);
        View::from(value.to_string())
    });

    let harness = Harness::new();
    harness.render_and_flush(
        level.provide(1).with_child(
            Element::host("div")
                .with_child(reader.el())
                .with_child(level.provide(2).with_child(reader.el())),
        ),
    );
    let tree = harness.tree();
    assert!(tree.contains("\"1\""));
    assert!(tree.contains("\"2\""));
}

#[test]
#[should_panic]
fn context_read_without_provider_fails() {
    let lonely: Context<i32> = Context::new("lonely");
    let reader = Component::new("Reader", move |hooks, _| {
        let value = hooks.use_context(&lonely);
        View::from(value.to_string())
    });
    let harness = Harness::new();
    harness.render_and_flush(reader.el());
}

// ---------------------------------------------------------------------------
// Hooks: memo, callback, ref
// ---------------------------------------------------------------------------

#[test]
fn memo_hook_caches_until_deps_change() {
    let computes = Rc::new(Cell::new(0u32));
    let comp = {
        let computes = computes.clone();
        Component::new("Memoized", move |hooks, props| {
            let version = match props.attr("v") {
                Some(weft::element::PropValue::Int(n)) => *n,
                _ => 0,
            };
            let computes = computes.clone();
            let doubled = hooks.use_memo(Deps::from([version]), move || {
                computes.set(computes.get() + 1);
                version * 2
            });
            View::from(doubled.to_string())
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(comp.el().with_attr("v", 4).with_attr("tick", 0));
    assert_eq!(computes.get(), 1);
    assert!(harness.tree().contains("\"8\""));

    // Unrelated prop change re-renders but reuses the cached value.
    harness.render_and_flush(comp.el().with_attr("v", 4).with_attr("tick", 1));
    assert_eq!(computes.get(), 1);

    harness.render_and_flush(comp.el().with_attr("v", 5).with_attr("tick", 1));
    assert_eq!(computes.get(), 2);
    assert!(harness.tree().contains("\"10\""));
}

#[test]
fn ref_hook_identity_is_stable_across_renders() {
    let pointers: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let comp = {
        let pointers = pointers.clone();
        Component::new("WithRef", move |hooks, props| {
            let cell = hooks.use_ref(|| 0u32);
            pointers.borrow_mut().push(Rc::as_ptr(&cell) as usize);
            *cell.borrow_mut() += 1;
            let tick = props.attr("tick").cloned();
            let _ = tick;
            View::from("r")
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(comp.el().with_attr("tick", 0));
    harness.render_and_flush(comp.el().with_attr("tick", 1));
    let pointers = pointers.borrow();
    assert_eq!(pointers.len(), 2);
    assert_eq!(pointers[0], pointers[1]);
}

#[test]
fn node_ref_attaches_on_commit_and_clears_on_removal() {
    let node_ref = NodeRef::new();
    let harness = Harness::new();
    harness.render_and_flush(Element::host("input").with_ref(node_ref.clone()));
    let attached = node_ref.get().expect("ref attached at commit");
    assert_eq!(
        harness.host().children_of(harness.host().container())[0],
        attached
    );

    harness.render_and_flush(View::Nothing);
    assert_eq!(node_ref.get(), None);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[test]
fn component_panic_leaves_committed_tree_intact() {
    let faulty = Component::new("Faulty", |_, props| {
        if props.attr("explode").is_some() {
            panic!("render failure");
        }
        View::from("fine")
    });

    let harness = Harness::new();
    harness.render_and_flush(faulty.el());
    assert_eq!(root_text(&harness), "fine");

    harness.render_and_flush(faulty.el().with_attr("explode", true));
    // The failed pass is abandoned; the previous commit survives.
    assert_eq!(root_text(&harness), "fine");
    let error = harness.root().take_render_error().expect("recorded error");
    assert!(error.to_string().contains("render failure"));
}

#[test]
#[should_panic]
fn inconsistent_hook_count_fails_fast() {
    let setter: Slot<StateSetter<i32>> = slot();
    let shifty = {
        let setter = setter.clone();
        Component::new("Shifty", move |hooks, _| {
            let (n, set) = hooks.use_state(|| 0);
            if n == 0 {
                let _ = hooks.use_ref(|| 0u8);
            }
            *setter.borrow_mut() = Some(set);
            View::from(n.to_string())
        })
    };

    let harness = Harness::new();
    harness.render_and_flush(shifty.el());
    let set = setter.borrow().clone().expect("setter captured");
    set.set(1);
    harness.flush();
}
