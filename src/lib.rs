//! # weft
//!
//! An interruptible, priority-scheduled UI tree reconciler with hooks and
//! pluggable host backends.
//!
//! weft takes declarative element descriptions and produces — and
//! incrementally updates — a tree of host-platform nodes, with
//! component-local state, deferred effects, shared context values, and
//! lane-based interruptible scheduling. The host platform and the event loop
//! both stay outside: concrete node mutation goes through a small
//! [`host::HostAdapter`] capability set, and work is driven by an external
//! cooperative [`schedule::TaskScheduler`].
//!
//! ## Core Systems
//!
//! - **[`element`]** — Immutable element descriptors: kinds, keys, props,
//!   views, refs
//! - **[`fiber`]** — The double-buffered work tree in a slotmap arena
//! - **[`schedule`]** — Priority lanes and the external scheduler bridge
//! - **[`update_queue`]** — Lane-tagged state update queues with
//!   priority-correct replay
//! - **[`hooks`]** — Call-order hook chains: state, effects, memos, refs,
//!   transitions
//! - **[`context`]** — Shared values with provider stacking and dependency
//!   invalidation
//! - **[`host`]** — The host adapter capability set, called only at commit
//! - **[`root`]** — Mounting and driving a tree
//! - **[`error`]** — Typed hook-contract and render failures
//! - **[`testing`]** — Recording host adapter and headless harness
//! - **[`driver`]** — Tokio frame pump for the deadline scheduler

// Descriptors and errors
pub mod element;
pub mod error;

// The work tree
pub mod fiber;

// State machinery
pub mod context;
pub mod hooks;
pub mod update_queue;

// Scheduling
pub mod schedule;

// Engine internals: diffing, the work loop, and the commit pass
mod commit;
mod engine;
mod reconcile;
mod work_loop;

// External seams
pub mod host;
pub mod root;

// Embedding and testing
pub mod driver;
pub mod testing;
