//! Shared context values: typed handles, the provider value stack, and
//! per-node dependency tracking.
//!
//! A [`Context`] identifies a shared value slot. Providers push a value for
//! the slot while their subtree renders and pop it on the way back up; reads
//! inside that subtree observe the innermost value and record a dependency on
//! the reading node so a later provider change can invalidate it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::element::Element;
use crate::schedule::Lanes;

/// Reserved attr carrying a provider element's value.
pub(crate) const VALUE_ATTR: &str = "value";

/// Process-unique identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Typed handle to a shared context value.
///
/// Copyable: the handle is just an id plus a diagnostic name. Reading a
/// context with no active provider is a programmer error and fails fast.
pub struct Context<T> {
    id: ContextId,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Context<T> {}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl<T: 'static> Context<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build a provider element carrying `value` for this context. Children
    /// added with the element builders render inside the provider's scope.
    pub fn provide(&self, value: T) -> Element {
        Element::provider(self.id, Rc::new(value))
    }
}

// ---------------------------------------------------------------------------
// ContextStack
// ---------------------------------------------------------------------------

/// Stack of active provider values, owned by the render session.
///
/// Providers push on entry and pop on exit; an interrupted or discarded walk
/// resets the whole stack, so a fresh render never observes stale frames.
#[derive(Default)]
pub struct ContextStack {
    frames: Vec<(ContextId, Option<Rc<dyn Any>>)>,
    current: HashMap<ContextId, Rc<dyn Any>>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `value` for `context`, saving the previously active value.
    pub fn push(&mut self, context: ContextId, value: Rc<dyn Any>) {
        let previous = self.current.insert(context, value);
        self.frames.push((context, previous));
    }

    /// Restore the previously active value for `context`.
    ///
    /// # Panics
    ///
    /// Panics if pops are unbalanced with pushes — that indicates a walk that
    /// did not unwind the frames it created.
    pub fn pop(&mut self, context: ContextId) {
        let (pushed, previous) = self.frames.pop().expect("context stack underflow");
        debug_assert_eq!(pushed, context, "context stack pop out of order");
        match previous {
            Some(value) => self.current.insert(context, value),
            None => self.current.remove(&context),
        };
    }

    /// The innermost active value for `context`, if any provider is active.
    pub fn read(&self, context: ContextId) -> Option<Rc<dyn Any>> {
        self.current.get(&context).cloned()
    }

    /// Drop every frame. Used when in-progress work is discarded.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.current.clear();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// A recorded context read: which context, and the value observed.
#[derive(Clone)]
pub struct ContextDep {
    pub context: ContextId,
    pub last_value: Rc<dyn Any>,
}

/// Per-node list of context dependencies plus the lanes a provider change
/// marked on them.
#[derive(Clone, Default)]
pub struct ContextDeps {
    pub entries: Vec<ContextDep>,
    pub lanes: Lanes,
}

impl ContextDeps {
    pub fn depends_on(&self, context: ContextId) -> bool {
        self.entries.iter().any(|d| d.context == context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(stack: &ContextStack, id: ContextId) -> Option<i32> {
        stack
            .read(id)
            .map(|v| *v.downcast_ref::<i32>().expect("i32 value"))
    }

    #[test]
    fn context_ids_are_unique() {
        let a = Context::<i32>::new("a");
        let b = Context::<i32>::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn push_read_pop() {
        let ctx = Context::<i32>::new("n");
        let mut stack = ContextStack::new();
        assert!(stack.read(ctx.id()).is_none());
        stack.push(ctx.id(), Rc::new(1i32));
        assert_eq!(value(&stack, ctx.id()), Some(1));
        stack.pop(ctx.id());
        assert!(stack.read(ctx.id()).is_none());
    }

    #[test]
    fn nested_providers_shadow_and_restore() {
        let ctx = Context::<i32>::new("n");
        let mut stack = ContextStack::new();
        stack.push(ctx.id(), Rc::new(1i32));
        stack.push(ctx.id(), Rc::new(2i32));
        assert_eq!(value(&stack, ctx.id()), Some(2));
        stack.pop(ctx.id());
        assert_eq!(value(&stack, ctx.id()), Some(1));
        stack.pop(ctx.id());
        assert!(stack.read(ctx.id()).is_none());
    }

    #[test]
    fn independent_contexts_do_not_interfere() {
        let a = Context::<i32>::new("a");
        let b = Context::<i32>::new("b");
        let mut stack = ContextStack::new();
        stack.push(a.id(), Rc::new(10i32));
        stack.push(b.id(), Rc::new(20i32));
        assert_eq!(value(&stack, a.id()), Some(10));
        assert_eq!(value(&stack, b.id()), Some(20));
        stack.pop(b.id());
        assert_eq!(value(&stack, a.id()), Some(10));
        assert!(stack.read(b.id()).is_none());
        stack.pop(a.id());
    }

    #[test]
    fn reset_clears_everything() {
        let ctx = Context::<i32>::new("n");
        let mut stack = ContextStack::new();
        stack.push(ctx.id(), Rc::new(1i32));
        stack.push(ctx.id(), Rc::new(2i32));
        stack.reset();
        assert_eq!(stack.depth(), 0);
        assert!(stack.read(ctx.id()).is_none());
    }

    #[test]
    fn deps_membership() {
        let ctx = Context::<i32>::new("n");
        let other = Context::<i32>::new("m");
        let deps = ContextDeps {
            entries: vec![ContextDep {
                context: ctx.id(),
                last_value: Rc::new(1i32),
            }],
            lanes: Lanes::NONE,
        };
        assert!(deps.depends_on(ctx.id()));
        assert!(!deps.depends_on(other.id()));
    }
}
