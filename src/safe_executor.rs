//! Safe agent executor (spec.md §4.7).
//!
//! Wraps an arbitrary agent invocation and absorbs any fault — a panic
//! caught via `catch_unwind`, or an invocation returning a non-finite delta —
//! into a fallback [`AgentAction`] with actor `"fallback"`. Grounded in
//! `original_source/framework/agents.py`'s `SafeAgentExecutor.execute`,
//! which catches any exception and logs a warning rather than propagating.

use crate::types::AgentAction;
use std::panic::{self, AssertUnwindSafe};

pub struct SafeAgentExecutor {
    fallback_delta: f64,
}

impl Default for SafeAgentExecutor {
    fn default() -> Self {
        Self { fallback_delta: 0.0 }
    }
}

impl SafeAgentExecutor {
    pub fn new(fallback_delta: f64) -> Self {
        Self { fallback_delta }
    }

    /// Runs `call`, catching any panic and rejecting any non-finite delta.
    /// Either fault produces the fallback action instead of propagating.
    ///
    /// Does not touch the process-global panic hook: that hook is shared
    /// across threads, and the scenario fan and backtester run many engines
    /// concurrently, each calling `execute` repeatedly. Swapping a global per
    /// call would race across those threads.
    pub fn execute<F>(&self, label: &str, call: F) -> AgentAction
    where
        F: FnOnce() -> AgentAction,
    {
        let result = panic::catch_unwind(AssertUnwindSafe(call));

        match result {
            Ok(action) if action.delta().is_finite() => action,
            Ok(_) => {
                tracing::warn!(agent = label, "agent produced non-finite delta, using fallback");
                AgentAction::new("fallback", self.fallback_delta)
            }
            Err(_) => {
                tracing::warn!(agent = label, "agent call panicked, using fallback");
                AgentAction::new("fallback", self.fallback_delta)
            }
        }
    }
}
