//! Strategy runtime registry (spec.md §4.3).
//!
//! Deterministic functions over state returning a base forecast delta.
//! Named variants resolve through [`runtime_from_name`]; unknown names fall
//! back to the default runtime with a warning, the same registry-miss
//! policy the disturbance and defense registries use.

use crate::types::ForecastState;
use std::sync::Arc;

/// A client capable of completing a text prompt, standing in for an LLM
/// backend. Implementations that can fail should return `None` rather than
/// panicking; the prompt runtime treats `None` the same as a parse failure.
pub trait PromptCompletionClient: Send + Sync {
    fn complete(&self, prompt: &str) -> Option<String>;
}

/// A deterministic stub completion client, useful for tests and for any
/// caller that has not wired in a real LLM backend.
pub struct DeterministicPromptClient {
    response: String,
}

impl DeterministicPromptClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Default for DeterministicPromptClient {
    fn default() -> Self {
        Self::new("0.0")
    }
}

impl PromptCompletionClient for DeterministicPromptClient {
    fn complete(&self, _prompt: &str) -> Option<String> {
        Some(self.response.clone())
    }
}

pub trait StrategyRuntime: Send + Sync {
    fn forecast_delta(&self, state: &ForecastState) -> f64;
}

/// `python` / `default`: `0.55 + 0.35 * exogenous`.
pub struct PythonRuntime;

impl StrategyRuntime for PythonRuntime {
    fn forecast_delta(&self, state: &ForecastState) -> f64 {
        0.55 + 0.35 * state.exogenous()
    }
}

/// `haskell` / `haskellrlm`: identical fallback behavior to `python`.
pub struct HaskellRuntime;

impl StrategyRuntime for HaskellRuntime {
    fn forecast_delta(&self, state: &ForecastState) -> f64 {
        0.55 + 0.35 * state.exogenous()
    }
}

/// `prompt` / `llm`: delegates to an external completion client; on parse
/// failure falls back to the default runtime.
pub struct PromptRuntime {
    client: Arc<dyn PromptCompletionClient>,
}

impl PromptRuntime {
    pub fn new(client: Arc<dyn PromptCompletionClient>) -> Self {
        Self { client }
    }
}

impl Default for PromptRuntime {
    fn default() -> Self {
        Self::new(Arc::new(DeterministicPromptClient::default()))
    }
}

impl StrategyRuntime for PromptRuntime {
    fn forecast_delta(&self, state: &ForecastState) -> f64 {
        let prompt = format!(
            "state(t={}, value={:.4}, exogenous={:.4}) -> delta",
            state.t(),
            state.value(),
            state.exogenous()
        );
        self.client
            .complete(&prompt)
            .and_then(|text| text.trim().parse::<f64>().ok())
            .unwrap_or_else(|| PythonRuntime.forecast_delta(state))
    }
}

/// Resolve a named strategy runtime. Unknown names resolve to the default
/// (`python`) runtime with a warning.
pub fn runtime_from_name(name: &str) -> Box<dyn StrategyRuntime> {
    match name.trim().to_lowercase().as_str() {
        "python" | "default" => Box::new(PythonRuntime),
        "haskell" | "haskellrlm" => Box::new(HaskellRuntime),
        "prompt" | "llm" => Box::new(PromptRuntime::default()),
        other => {
            tracing::warn!(name = other, "unknown strategy runtime, defaulting to python");
            Box::new(PythonRuntime)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runtime_matches_formula() {
        let state = ForecastState::new(0, 1.0, 2.0, 0.0);
        let delta = PythonRuntime.forecast_delta(&state);
        assert!((delta - (0.55 + 0.35 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn unknown_name_resolves_to_default() {
        let rt = runtime_from_name("nonsense");
        let state = ForecastState::new(0, 1.0, 0.0, 0.0);
        assert!((rt.forecast_delta(&state) - 0.55).abs() < 1e-12);
    }

    #[test]
    fn prompt_runtime_falls_back_on_parse_failure() {
        struct Garbage;
        impl PromptCompletionClient for Garbage {
            fn complete(&self, _prompt: &str) -> Option<String> {
                Some("not-a-number".to_string())
            }
        }
        let rt = PromptRuntime::new(Arc::new(Garbage));
        let state = ForecastState::new(0, 1.0, 2.0, 0.0);
        let delta = rt.forecast_delta(&state);
        assert!((delta - (0.55 + 0.35 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn prompt_runtime_uses_parsed_value() {
        let rt = PromptRuntime::new(Arc::new(DeterministicPromptClient::new("0.75")));
        let state = ForecastState::new(0, 1.0, 0.0, 0.0);
        assert!((rt.forecast_delta(&state) - 0.75).abs() < 1e-12);
    }
}
