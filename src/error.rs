//! Error types for the reconciler.

use thiserror::Error;

/// Programmer-usage failures in the hook API.
///
/// These are not recoverable conditions: they indicate a component that
/// violates the hook contract (call order, active render, provider scope).
/// The engine fails fast by panicking with the typed error as payload, and
/// the work loop re-raises such panics instead of recovering from them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("hook called outside of an active render")]
    OutsideRender,
    #[error("inconsistent hook count: this render used {rendered} hooks, previous render used {previous}")]
    InconsistentHookCount { rendered: usize, previous: usize },
    #[error("hook {index} changed kind between renders (expected {expected}, got {got})")]
    HookKindMismatch {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },
    #[error("state type mismatch in hook {index}")]
    StateTypeMismatch { index: usize },
    #[error("no active provider for context `{name}`")]
    MissingProvider { name: &'static str },
    #[error("value type mismatch for context `{name}`")]
    ContextTypeMismatch { name: &'static str },
}

/// A render-phase failure the work loop recovered from.
///
/// The in-progress tree is discarded and the previously committed tree stays
/// intact; the error is retained on the root for inspection.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("component panicked during render: {0}")]
    ComponentPanic(String),
}

/// Panic with a typed [`HookError`] payload.
///
/// The work loop distinguishes these payloads from arbitrary component
/// panics: hook-contract violations propagate to the caller, everything else
/// is recovered.
pub(crate) fn fail_usage(err: HookError) -> ! {
    std::panic::panic_any(err)
}
