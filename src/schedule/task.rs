//! External cooperative scheduler bridge.
//!
//! The engine never owns an event loop. It registers callbacks with a
//! [`TaskScheduler`] at mapped priorities and cooperates with its
//! `should_yield` signal while rendering. Two reference schedulers are
//! provided: [`ManualScheduler`] (deterministic, pumped explicitly — the one
//! tests and headless embedders use) and [`FrameScheduler`] (wall-clock
//! deadline slicing for real frame loops).

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

/// Urgency classes understood by the scheduler, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

/// Opaque handle identifying a scheduled callback, for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

/// What a callback reports back when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Done; the scheduler drops the callback.
    Finished,
    /// Yielded mid-work; the scheduler keeps the callback (same handle) and
    /// re-invokes it later at the same priority.
    Yielded,
}

/// A schedulable unit of work.
pub type TaskCallback = Box<dyn FnMut() -> TaskOutcome>;

/// The capability set an external cooperative scheduler provides.
pub trait TaskScheduler {
    /// Register `callback` at `priority`; returns a handle for cancellation.
    fn schedule_callback(&self, priority: TaskPriority, callback: TaskCallback) -> TaskHandle;

    /// Prevent a previously scheduled callback from running (or re-running,
    /// if it is currently mid-invocation and about to yield).
    fn cancel_callback(&self, handle: TaskHandle);

    /// `true` when time-sliced work should suspend and return control.
    fn should_yield(&self) -> bool;

    /// The ambient priority: the priority of the callback currently being
    /// invoked, or `Normal` outside any invocation.
    fn current_priority(&self) -> TaskPriority;

    /// Run `f` with the ambient priority temporarily set to `priority`.
    fn run_with_priority<'a>(&self, priority: TaskPriority, f: Box<dyn FnOnce() + 'a>);
}

// ---------------------------------------------------------------------------
// Shared queue internals
// ---------------------------------------------------------------------------

struct Slot {
    handle: TaskHandle,
    priority: TaskPriority,
    seq: u64,
    callback: Option<TaskCallback>,
}

/// Priority queue shared by the reference schedulers. Interior-mutable so the
/// scheduler can be held behind a plain `Rc`; callbacks always run with the
/// queue borrow released, so they may freely schedule and cancel.
#[derive(Default)]
struct TaskQueue {
    slots: RefCell<Vec<Slot>>,
    cancelled: RefCell<Vec<TaskHandle>>,
    next_handle: Cell<u64>,
    next_seq: Cell<u64>,
}

impl TaskQueue {
    fn schedule(&self, priority: TaskPriority, callback: TaskCallback) -> TaskHandle {
        let handle = TaskHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.slots.borrow_mut().push(Slot {
            handle,
            priority,
            seq,
            callback: Some(callback),
        });
        handle
    }

    fn cancel(&self, handle: TaskHandle) {
        self.slots.borrow_mut().retain(|s| s.handle != handle);
        // The callback may currently be mid-invocation; remember the handle
        // so a Yielded outcome does not resurrect it.
        self.cancelled.borrow_mut().push(handle);
    }

    fn pop_next(&self) -> Option<Slot> {
        let mut slots = self.slots.borrow_mut();
        let best = slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| (s.priority, s.seq))
            .map(|(i, _)| i)?;
        Some(slots.remove(best))
    }

    fn reinsert(&self, slot: Slot) {
        let was_cancelled = {
            let mut cancelled = self.cancelled.borrow_mut();
            let found = cancelled.iter().any(|h| *h == slot.handle);
            cancelled.retain(|h| *h != slot.handle);
            found
        };
        if !was_cancelled {
            self.slots.borrow_mut().push(slot);
        }
    }

    fn forget_cancellation(&self, handle: TaskHandle) {
        self.cancelled.borrow_mut().retain(|h| *h != handle);
    }

    fn len(&self) -> usize {
        self.slots.borrow().len()
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

/// A deterministic scheduler pumped explicitly by the embedder.
///
/// `should_yield` is driven by an optional unit budget: with a budget of `n`,
/// the next `n` checks report "keep going" and every later check reports
/// "yield" until the budget is rearmed. Without a budget the scheduler never
/// requests a yield.
pub struct ManualScheduler {
    queue: TaskQueue,
    current: Cell<TaskPriority>,
    yield_budget: Cell<Option<u32>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            queue: TaskQueue::default(),
            current: Cell::new(TaskPriority::Normal),
            yield_budget: Cell::new(None),
        }
    }

    /// Allow `units` should-yield checks to pass before yielding is demanded.
    pub fn set_yield_budget(&self, units: u32) {
        self.yield_budget.set(Some(units));
    }

    /// Never request a yield (the default).
    pub fn clear_yield_budget(&self) {
        self.yield_budget.set(None);
    }

    /// Run the single highest-priority task. Returns `false` when idle.
    pub fn step(&self) -> bool {
        let Some(mut slot) = self.queue.pop_next() else {
            return false;
        };
        let mut callback = slot.callback.take().expect("queued task has a callback");
        let prev = self.current.replace(slot.priority);
        let outcome = callback();
        self.current.set(prev);
        match outcome {
            TaskOutcome::Finished => self.queue.forget_cancellation(slot.handle),
            TaskOutcome::Yielded => {
                slot.callback = Some(callback);
                self.queue.reinsert(slot);
            }
        }
        true
    }

    /// Run tasks until the queue is empty.
    pub fn flush(&self) {
        while self.step() {}
    }

    pub fn has_tasks(&self) -> bool {
        self.queue.len() > 0
    }

    pub fn task_count(&self) -> usize {
        self.queue.len()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule_callback(&self, priority: TaskPriority, callback: TaskCallback) -> TaskHandle {
        self.queue.schedule(priority, callback)
    }

    fn cancel_callback(&self, handle: TaskHandle) {
        self.queue.cancel(handle);
    }

    fn should_yield(&self) -> bool {
        match self.yield_budget.get() {
            None => false,
            Some(0) => true,
            Some(n) => {
                self.yield_budget.set(Some(n - 1));
                false
            }
        }
    }

    fn current_priority(&self) -> TaskPriority {
        self.current.get()
    }

    fn run_with_priority<'a>(&self, priority: TaskPriority, f: Box<dyn FnOnce() + 'a>) {
        let prev = self.current.replace(priority);
        f();
        self.current.set(prev);
    }
}

// ---------------------------------------------------------------------------
// FrameScheduler
// ---------------------------------------------------------------------------

/// Default slice of a frame spent on reconciler work before yielding.
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(5);

/// A wall-clock scheduler: each [`run_frame`](FrameScheduler::run_frame)
/// starts a deadline, and `should_yield` reports `true` once the frame budget
/// is spent. Yielded work resumes on the next frame.
pub struct FrameScheduler {
    queue: TaskQueue,
    current: Cell<TaskPriority>,
    budget: Duration,
    frame_start: Cell<Instant>,
}

impl FrameScheduler {
    pub fn new(budget: Duration) -> Self {
        Self {
            queue: TaskQueue::default(),
            current: Cell::new(TaskPriority::Normal),
            budget,
            frame_start: Cell::new(Instant::now()),
        }
    }

    /// Run queued tasks until the frame budget is exhausted or the queue is
    /// empty.
    pub fn run_frame(&self) {
        self.frame_start.set(Instant::now());
        while self.frame_start.get().elapsed() < self.budget {
            let Some(mut slot) = self.queue.pop_next() else {
                return;
            };
            let mut callback = slot.callback.take().expect("queued task has a callback");
            let prev = self.current.replace(slot.priority);
            let outcome = callback();
            self.current.set(prev);
            match outcome {
                TaskOutcome::Finished => self.queue.forget_cancellation(slot.handle),
                TaskOutcome::Yielded => {
                    slot.callback = Some(callback);
                    self.queue.reinsert(slot);
                    // A yield means the budget is gone; stop the frame here.
                    return;
                }
            }
        }
    }

    pub fn has_tasks(&self) -> bool {
        self.queue.len() > 0
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_BUDGET)
    }
}

impl TaskScheduler for FrameScheduler {
    fn schedule_callback(&self, priority: TaskPriority, callback: TaskCallback) -> TaskHandle {
        self.queue.schedule(priority, callback)
    }

    fn cancel_callback(&self, handle: TaskHandle) {
        self.queue.cancel(handle);
    }

    fn should_yield(&self) -> bool {
        self.frame_start.get().elapsed() >= self.budget
    }

    fn current_priority(&self) -> TaskPriority {
        self.current.get()
    }

    fn run_with_priority<'a>(&self, priority: TaskPriority, f: Box<dyn FnOnce() + 'a>) {
        let prev = self.current.replace(priority);
        f();
        self.current.set(prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_in_priority_order() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (priority, name) in [
            (TaskPriority::Idle, "idle"),
            (TaskPriority::Immediate, "immediate"),
            (TaskPriority::Normal, "normal"),
        ] {
            let log = log.clone();
            scheduler.schedule_callback(
                priority,
                Box::new(move || {
                    log.borrow_mut().push(name);
                    TaskOutcome::Finished
                }),
            );
        }
        scheduler.flush();
        assert_eq!(*log.borrow(), vec!["immediate", "normal", "idle"]);
    }

    #[test]
    fn equal_priority_runs_in_insertion_order() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let log = log.clone();
            scheduler.schedule_callback(
                TaskPriority::Normal,
                Box::new(move || {
                    log.borrow_mut().push(name);
                    TaskOutcome::Finished
                }),
            );
        }
        scheduler.flush();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cancel_removes_task() {
        let scheduler = ManualScheduler::new();
        let ran = Rc::new(Cell::new(false));
        let ran_c = ran.clone();
        let handle = scheduler.schedule_callback(
            TaskPriority::Normal,
            Box::new(move || {
                ran_c.set(true);
                TaskOutcome::Finished
            }),
        );
        scheduler.cancel_callback(handle);
        scheduler.flush();
        assert!(!ran.get());
    }

    #[test]
    fn yielded_task_resumes_with_same_handle() {
        let scheduler = ManualScheduler::new();
        let runs = Rc::new(Cell::new(0));
        let runs_c = runs.clone();
        scheduler.schedule_callback(
            TaskPriority::Normal,
            Box::new(move || {
                runs_c.set(runs_c.get() + 1);
                if runs_c.get() < 3 {
                    TaskOutcome::Yielded
                } else {
                    TaskOutcome::Finished
                }
            }),
        );
        scheduler.flush();
        assert_eq!(runs.get(), 3);
        assert!(!scheduler.has_tasks());
    }

    #[test]
    fn cancel_during_run_stops_continuation() {
        let scheduler = Rc::new(ManualScheduler::new());
        let runs = Rc::new(Cell::new(0));
        let handle_cell: Rc<Cell<Option<TaskHandle>>> = Rc::new(Cell::new(None));
        let runs_c = runs.clone();
        let sched_c = scheduler.clone();
        let handle_c = handle_cell.clone();
        let handle = scheduler.schedule_callback(
            TaskPriority::Normal,
            Box::new(move || {
                runs_c.set(runs_c.get() + 1);
                // Cancel ourselves mid-run; the yield must not resurrect us.
                sched_c.cancel_callback(handle_c.get().expect("handle recorded"));
                TaskOutcome::Yielded
            }),
        );
        handle_cell.set(Some(handle));
        scheduler.flush();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn yield_budget_counts_down() {
        let scheduler = ManualScheduler::new();
        assert!(!scheduler.should_yield());
        scheduler.set_yield_budget(2);
        assert!(!scheduler.should_yield());
        assert!(!scheduler.should_yield());
        assert!(scheduler.should_yield());
        assert!(scheduler.should_yield());
        scheduler.clear_yield_budget();
        assert!(!scheduler.should_yield());
    }

    #[test]
    fn run_with_priority_sets_ambient_priority() {
        let scheduler = ManualScheduler::new();
        assert_eq!(scheduler.current_priority(), TaskPriority::Normal);
        let observed = Rc::new(Cell::new(TaskPriority::Normal));
        let observed_c = observed.clone();
        let scheduler_ref = &scheduler;
        scheduler.run_with_priority(
            TaskPriority::UserBlocking,
            Box::new(move || observed_c.set(scheduler_ref.current_priority())),
        );
        assert_eq!(observed.get(), TaskPriority::UserBlocking);
        assert_eq!(scheduler.current_priority(), TaskPriority::Normal);
    }

    #[test]
    fn callback_priority_is_ambient_while_running() {
        let scheduler = Rc::new(ManualScheduler::new());
        let observed = Rc::new(Cell::new(TaskPriority::Normal));
        let observed_c = observed.clone();
        let sched_c = scheduler.clone();
        scheduler.schedule_callback(
            TaskPriority::Idle,
            Box::new(move || {
                observed_c.set(sched_c.current_priority());
                TaskOutcome::Finished
            }),
        );
        scheduler.flush();
        assert_eq!(observed.get(), TaskPriority::Idle);
    }

    #[test]
    fn frame_scheduler_drains_queue() {
        let scheduler = FrameScheduler::new(Duration::from_millis(50));
        let runs = Rc::new(Cell::new(0));
        for _ in 0..4 {
            let runs_c = runs.clone();
            scheduler.schedule_callback(
                TaskPriority::Normal,
                Box::new(move || {
                    runs_c.set(runs_c.get() + 1);
                    TaskOutcome::Finished
                }),
            );
        }
        scheduler.run_frame();
        assert_eq!(runs.get(), 4);
        assert!(!scheduler.has_tasks());
    }
}
