//! Per-component hooks: state, effects, memos, refs, transitions, and
//! context reads.
//!
//! Hook cells are identified purely by call order: the chain built during a
//! node's first render must be walked in the identical order on every later
//! render, or the engine fails fast with a typed [`HookError`]. A fresh chain
//! is constructed on every render pass — the previous chain is read in
//! lock-step, never mutated in place.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::context::{Context, ContextDep, ContextDeps};
use crate::element::{Component, Props, PropValue, View};
use crate::engine::Engine;
use crate::error::{fail_usage, HookError};
use crate::fiber::flags::NodeFlags;
use crate::fiber::node::{NodeId, NodeState};
use crate::schedule::Lanes;
use crate::update_queue::{process_updates, SharedQueue, StateCell, Update, UpdateAction};
use crate::work_loop;

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Teardown returned by an effect's creation closure.
#[derive(Clone)]
pub struct Cleanup(Rc<dyn Fn()>);

impl Cleanup {
    pub fn new(f: impl Fn() + 'static) -> Self {
        Cleanup(Rc::new(f))
    }

    pub(crate) fn run(&self) {
        (*self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cleanup")
    }
}

/// Conversion for effect return values: `()` means "no teardown".
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

// ---------------------------------------------------------------------------
// Deps
// ---------------------------------------------------------------------------

/// Dependency list for effects, memos and callbacks.
///
/// `always()` (no list) re-runs on every render; `none()` (empty list) runs
/// once on mount and never again. Elements compare shallowly: primitives by
/// value, shared payloads by identity.
#[derive(Clone, Debug)]
pub struct Deps(Option<Vec<PropValue>>);

impl Deps {
    /// No dependency list: the effect or memo re-runs every render.
    pub fn always() -> Self {
        Deps(None)
    }

    /// Empty dependency list: runs on mount only.
    pub fn none() -> Self {
        Deps(Some(Vec::new()))
    }

    /// An explicit dependency list.
    pub fn of(values: impl IntoIterator<Item = PropValue>) -> Self {
        Deps(Some(values.into_iter().collect()))
    }

    pub(crate) fn changed(&self, prev: &Deps) -> bool {
        match (&self.0, &prev.0) {
            (None, _) | (_, None) => true,
            (Some(next), Some(prev)) => {
                if next.len() != prev.len() {
                    tracing::warn!(
                        prev = prev.len(),
                        next = next.len(),
                        "dependency list changed length between renders"
                    );
                    return true;
                }
                next.iter().zip(prev).any(|(a, b)| a != b)
            }
        }
    }
}

impl<V: Into<PropValue>, const N: usize> From<[V; N]> for Deps {
    fn from(values: [V; N]) -> Self {
        Deps(Some(values.into_iter().map(Into::into).collect()))
    }
}

impl From<Vec<PropValue>> for Deps {
    fn from(values: Vec<PropValue>) -> Self {
        Deps(Some(values))
    }
}

// ---------------------------------------------------------------------------
// Hook cells
// ---------------------------------------------------------------------------

/// One deferred (passive) effect slot.
#[derive(Clone)]
pub(crate) struct EffectCell {
    pub create: Rc<dyn Fn() -> Option<Cleanup>>,
    pub cleanup: Option<Cleanup>,
    pub deps: Deps,
    /// Set when this commit must tear down and re-run the effect.
    pub pending: bool,
}

/// One hook invocation's cell, linked in call order.
#[derive(Clone)]
pub struct Hook {
    pub(crate) state: HookState,
}

#[derive(Clone)]
pub(crate) enum HookState {
    State(StateCell),
    Effect(EffectCell),
    Memo { value: Rc<dyn Any>, deps: Deps },
    Ref(Rc<dyn Any>),
    Transition(StateCell),
}

impl HookState {
    fn kind_name(&self) -> &'static str {
        match self {
            HookState::State(_) => "state",
            HookState::Effect(_) => "effect",
            HookState::Memo { .. } => "memo",
            HookState::Ref(_) => "ref",
            HookState::Transition(_) => "transition",
        }
    }
}

// ---------------------------------------------------------------------------
// Hook environment (per render of one node)
// ---------------------------------------------------------------------------

/// Which hook table is active for this render: the mount table builds the
/// chain from empty, the update table walks the previous chain in lock-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookPhase {
    Mount,
    Update,
}

/// Hook-chain cursor for the component currently rendering.
pub struct HookEnv {
    pub(crate) fiber: NodeId,
    pub(crate) phase: HookPhase,
    pub(crate) index: usize,
    /// Snapshot of the committed chain (update phase).
    pub(crate) prev_hooks: Vec<Hook>,
    pub(crate) render_lanes: Lanes,
}

// ---------------------------------------------------------------------------
// render_with_hooks
// ---------------------------------------------------------------------------

/// Invoke a component's render function with a fresh hook chain.
///
/// Installs the hook environment, runs the component with the engine borrow
/// released, then verifies the chain length against the previous render.
pub(crate) fn render_with_hooks(
    engine: &Rc<RefCell<Engine>>,
    fiber: NodeId,
    component: &Component,
    props: Rc<Props>,
    render_lanes: Lanes,
) -> View {
    {
        let mut eng = engine.borrow_mut();
        let current = eng.arena.node(fiber).alternate;
        let (phase, prev_hooks) = match current {
            Some(cur) => (
                HookPhase::Update,
                eng.arena.node(cur).hooks().cloned().unwrap_or_default(),
            ),
            None => (HookPhase::Mount, Vec::new()),
        };
        let node = eng.arena.node_mut(fiber);
        node.state = NodeState::Hooks(Vec::new());
        node.deps = None;
        eng.hook_env = Some(HookEnv {
            fiber,
            phase,
            index: 0,
            prev_hooks,
            render_lanes,
        });
    }

    let render = component.render_fn();
    let mut hooks = Hooks {
        engine: engine.clone(),
        fiber,
    };
    let view = (*render)(&mut hooks, &props);

    {
        let mut eng = engine.borrow_mut();
        let env = eng.hook_env.take().expect("hook environment survives render");
        if env.phase == HookPhase::Update && env.index != env.prev_hooks.len() {
            fail_usage(HookError::InconsistentHookCount {
                rendered: env.index,
                previous: env.prev_hooks.len(),
            });
        }
    }
    view
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Hook context handed to component render functions.
///
/// All methods follow the call-order contract; they panic with a typed
/// [`HookError`] on misuse (wrong order, wrong kind, no active render).
pub struct Hooks {
    pub(crate) engine: Rc<RefCell<Engine>>,
    pub(crate) fiber: NodeId,
}

impl Hooks {
    /// Component-local state. Returns the current value and a cloneable
    /// setter usable from effects and host callbacks.
    ///
    /// # Panics
    ///
    /// Panics with [`HookError`] on hook-order violations or when the stored
    /// state is not a `T`.
    pub fn use_state<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> (T, StateSetter<T>) {
        let cell = self.state_cell(HookSlot::State, || Rc::new(init()));
        let index = self.last_index();
        let value = cell
            .memoized
            .downcast_ref::<T>()
            .unwrap_or_else(|| fail_usage(HookError::StateTypeMismatch { index }))
            .clone();
        let setter = StateSetter {
            engine: Rc::downgrade(&self.engine),
            fiber: self.fiber,
            queue: cell.queue.clone(),
            _marker: PhantomData,
        };
        (value, setter)
    }

    /// A deferred side effect. `create` runs after commit whenever `deps`
    /// changed (always on mount); its returned [`Cleanup`] runs before the
    /// next re-run and on unmount.
    pub fn use_effect<C: IntoCleanup>(&mut self, deps: impl Into<Deps>, create: impl Fn() -> C + 'static) {
        let deps = deps.into();
        let create: Rc<dyn Fn() -> Option<Cleanup>> = Rc::new(move || create().into_cleanup());

        let mut eng = self.engine.borrow_mut();
        let eng = &mut *eng;
        let (phase, index, _) = advance(eng, self.fiber);
        let cell = match phase {
            HookPhase::Mount => EffectCell {
                create,
                cleanup: None,
                deps,
                pending: true,
            },
            HookPhase::Update => {
                let prev = prev_hook(eng, index, "effect");
                let HookState::Effect(prev_cell) = prev.state else {
                    unreachable!("prev_hook verified the hook kind");
                };
                let pending = deps.changed(&prev_cell.deps);
                EffectCell {
                    create,
                    cleanup: prev_cell.cleanup,
                    deps,
                    pending,
                }
            }
        };
        if cell.pending {
            eng.arena.node_mut(self.fiber).flags.insert(NodeFlags::PASSIVE);
        }
        push_hook(eng, self.fiber, HookState::Effect(cell));
    }

    /// A cached computation, recomputed only when `deps` changed.
    ///
    /// The computation must not invoke hooks or setters.
    pub fn use_memo<T: 'static>(&mut self, deps: impl Into<Deps>, compute: impl FnOnce() -> T) -> Rc<T> {
        let deps = deps.into();
        let mut eng = self.engine.borrow_mut();
        let eng = &mut *eng;
        let (phase, index, _) = advance(eng, self.fiber);
        let value: Rc<dyn Any> = match phase {
            HookPhase::Mount => Rc::new(compute()),
            HookPhase::Update => {
                let prev = prev_hook(eng, index, "memo");
                let HookState::Memo { value, deps: prev_deps } = prev.state else {
                    unreachable!("prev_hook verified the hook kind");
                };
                if deps.changed(&prev_deps) {
                    Rc::new(compute())
                } else {
                    value
                }
            }
        };
        push_hook(
            eng,
            self.fiber,
            HookState::Memo {
                value: value.clone(),
                deps,
            },
        );
        value
            .downcast::<T>()
            .unwrap_or_else(|_| fail_usage(HookError::StateTypeMismatch { index }))
    }

    /// A cached function value; same dependency semantics as [`use_memo`].
    ///
    /// [`use_memo`]: Hooks::use_memo
    pub fn use_callback<F: 'static>(&mut self, deps: impl Into<Deps>, f: F) -> Rc<F> {
        self.use_memo(deps, move || f)
    }

    /// A mutable cell whose identity is stable across renders.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
        let mut eng = self.engine.borrow_mut();
        let eng = &mut *eng;
        let (phase, index, _) = advance(eng, self.fiber);
        let cell: Rc<dyn Any> = match phase {
            HookPhase::Mount => Rc::new(RefCell::new(init())),
            HookPhase::Update => {
                let prev = prev_hook(eng, index, "ref");
                let HookState::Ref(cell) = prev.state else {
                    unreachable!("prev_hook verified the hook kind");
                };
                cell
            }
        };
        push_hook(eng, self.fiber, HookState::Ref(cell.clone()));
        cell.downcast::<RefCell<T>>()
            .unwrap_or_else(|_| fail_usage(HookError::StateTypeMismatch { index }))
    }

    /// Read the innermost provided value for `context`, recording this node
    /// as a dependent so provider changes re-render it.
    ///
    /// # Panics
    ///
    /// Panics with [`HookError::MissingProvider`] when no provider for the
    /// context is active above this node, and with
    /// [`HookError::OutsideRender`] when called outside a render.
    pub fn use_context<T: 'static>(&mut self, context: &Context<T>) -> Rc<T> {
        let mut eng = self.engine.borrow_mut();
        let eng = &mut *eng;
        if eng.hook_env.as_ref().map(|env| env.fiber) != Some(self.fiber) {
            fail_usage(HookError::OutsideRender);
        }
        let value = eng
            .context_stack
            .read(context.id())
            .unwrap_or_else(|| fail_usage(HookError::MissingProvider { name: context.name() }));

        let node = eng.arena.node_mut(self.fiber);
        let deps = node.deps.get_or_insert_with(ContextDeps::default);
        if !deps.depends_on(context.id()) {
            deps.entries.push(ContextDep {
                context: context.id(),
                last_value: value.clone(),
            });
        }

        value
            .downcast::<T>()
            .unwrap_or_else(|_| fail_usage(HookError::ContextTypeMismatch { name: context.name() }))
    }

    /// Transition state: a pending flag plus a starter that runs a scope in
    /// which every scheduled update is taken at transition priority.
    pub fn use_transition(&mut self) -> (bool, TransitionStarter) {
        let cell = self.state_cell(HookSlot::Transition, || Rc::new(false));
        let index = self.last_index();
        let pending = *cell
            .memoized
            .downcast_ref::<bool>()
            .unwrap_or_else(|| fail_usage(HookError::StateTypeMismatch { index }));
        let setter = StateSetter {
            engine: Rc::downgrade(&self.engine),
            fiber: self.fiber,
            queue: cell.queue.clone(),
            _marker: PhantomData,
        };
        (
            pending,
            TransitionStarter {
                engine: Rc::downgrade(&self.engine),
                pending: setter,
            },
        )
    }

    // -- internals ----------------------------------------------------------

    /// Shared mount/update path for the state-backed hooks.
    fn state_cell(&mut self, slot: HookSlot, init: impl FnOnce() -> Rc<dyn Any>) -> StateCell {
        let mut eng = self.engine.borrow_mut();
        let eng = &mut *eng;
        let (phase, index, render_lanes) = advance(eng, self.fiber);
        let cell = match phase {
            HookPhase::Mount => StateCell::new(init()),
            HookPhase::Update => {
                let prev = prev_hook(eng, index, slot.name());
                let prev_cell = match (prev.state, slot) {
                    (HookState::State(c), HookSlot::State) => c,
                    (HookState::Transition(c), HookSlot::Transition) => c,
                    _ => unreachable!("prev_hook verified the hook kind"),
                };
                let processed = process_updates(&prev_cell, render_lanes);
                if !Rc::ptr_eq(&processed.memoized, &prev_cell.memoized) {
                    eng.did_receive_update = true;
                }
                if !processed.skipped.is_empty() {
                    eng.arena.node_mut(self.fiber).lanes |= processed.skipped;
                }
                StateCell {
                    memoized: processed.memoized,
                    base_state: processed.base_state,
                    base_queue: processed.base_queue,
                    queue: prev_cell.queue,
                }
            }
        };
        let state = match slot {
            HookSlot::State => HookState::State(cell.clone()),
            HookSlot::Transition => HookState::Transition(cell.clone()),
        };
        push_hook(eng, self.fiber, state);
        cell
    }

    /// The index of the hook cell most recently pushed.
    fn last_index(&self) -> usize {
        self.engine
            .borrow()
            .hook_env
            .as_ref()
            .map(|env| env.index.saturating_sub(1))
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy)]
enum HookSlot {
    State,
    Transition,
}

impl HookSlot {
    fn name(self) -> &'static str {
        match self {
            HookSlot::State => "state",
            HookSlot::Transition => "transition",
        }
    }
}

/// Claim the next chain index, returning the active phase and render lanes.
fn advance(eng: &mut Engine, fiber: NodeId) -> (HookPhase, usize, Lanes) {
    let env = eng
        .hook_env
        .as_mut()
        .unwrap_or_else(|| fail_usage(HookError::OutsideRender));
    if env.fiber != fiber {
        fail_usage(HookError::OutsideRender);
    }
    let index = env.index;
    env.index += 1;
    (env.phase, index, env.render_lanes)
}

/// The previous chain's cell at `index`, verified against the expected kind.
fn prev_hook(eng: &Engine, index: usize, expected: &'static str) -> Hook {
    let env = eng.hook_env.as_ref().expect("active hook environment");
    let Some(prev) = env.prev_hooks.get(index) else {
        fail_usage(HookError::InconsistentHookCount {
            rendered: index + 1,
            previous: env.prev_hooks.len(),
        });
    };
    if prev.state.kind_name() != expected {
        fail_usage(HookError::HookKindMismatch {
            index,
            expected,
            got: prev.state.kind_name(),
        });
    }
    prev.clone()
}

fn push_hook(eng: &mut Engine, fiber: NodeId, state: HookState) {
    eng.arena
        .node_mut(fiber)
        .hooks_mut()
        .expect("component node has hook state")
        .push(Hook { state });
}

// ---------------------------------------------------------------------------
// StateSetter
// ---------------------------------------------------------------------------

/// Dispatch handle for one state slot. Cloneable; holding one does not keep
/// the engine alive.
pub struct StateSetter<T> {
    engine: Weak<RefCell<Engine>>,
    fiber: NodeId,
    queue: Rc<SharedQueue>,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            fiber: self.fiber,
            queue: self.queue.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> StateSetter<T> {
    /// Replace the state with `value` at the current ambient priority.
    pub fn set(&self, value: T) {
        self.dispatch(UpdateAction::Replace(Rc::new(value)));
    }

    /// Queue a pure transform of the previous state.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.dispatch(UpdateAction::Transform(Rc::new(move |prev: &dyn Any| {
            let prev = prev
                .downcast_ref::<T>()
                .expect("state transform received a different state type");
            Rc::new(f(prev)) as Rc<dyn Any>
        })));
    }

    fn dispatch(&self, action: UpdateAction) {
        let Some(engine) = self.engine.upgrade() else {
            tracing::debug!("state dispatched after engine drop; ignoring");
            return;
        };
        let lane = work_loop::request_update_lane(&engine);
        self.queue.push(Update { action, lane });
        work_loop::schedule_update_on_fiber(&engine, self.fiber, lane);
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter").field("fiber", &self.fiber).finish()
    }
}

// ---------------------------------------------------------------------------
// TransitionStarter
// ---------------------------------------------------------------------------

/// Brackets a scope in which scheduled updates take transition priority.
#[derive(Clone)]
pub struct TransitionStarter {
    engine: Weak<RefCell<Engine>>,
    pending: StateSetter<bool>,
}

impl TransitionStarter {
    /// Mark the transition pending, run `scope` with updates downgraded to
    /// transition priority, and clear the pending flag at that same lowered
    /// priority.
    pub fn start(&self, scope: impl FnOnce()) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        self.pending.set(true);
        engine.borrow_mut().transition_depth += 1;
        scope();
        self.pending.set(false);
        engine.borrow_mut().transition_depth -= 1;
    }
}

impl fmt::Debug for TransitionStarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransitionStarter")
    }
}
