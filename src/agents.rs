//! Game-playing agents (spec.md §4.6).
//!
//! Grounded in `original_source/framework/agents.py`: each agent is a thin,
//! stateless (or near-stateless) policy over [`ForecastState`] that emits an
//! [`AgentAction`]. Hierarchical and ensemble variants were added per spec.md
//! alongside the core forecaster/adversary/defender/refactor quartet.

use crate::defense::defense_from_name;
use crate::strategy::StrategyRuntime;
use crate::types::{AgentAction, FrozenMap, ForecastState};

/// Calls the strategy runtime for a base delta; if a prompt completion
/// client is attached, blends 80% base / 20% parsed LLM suggestion, falling
/// back to the pure base delta on any parse failure.
pub struct ForecastingAgent {
    pub name: String,
    pub llm_client: Option<Box<dyn crate::strategy::PromptCompletionClient>>,
}

impl ForecastingAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            llm_client: None,
        }
    }

    pub fn with_llm_client(mut self, client: Box<dyn crate::strategy::PromptCompletionClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    pub fn act(&self, state: &ForecastState, runtime: &dyn StrategyRuntime) -> AgentAction {
        let base_delta = runtime.forecast_delta(state);
        let Some(client) = &self.llm_client else {
            return AgentAction::new(&self.name, base_delta);
        };

        let prompt = format!(
            "value={:.4}, exogenous={:.4}, suggest scalar delta",
            state.value(),
            state.exogenous()
        );
        let blended = client
            .complete(&prompt)
            .and_then(|text| text.split_whitespace().next().map(str::to_string))
            .and_then(|token| token.parse::<f64>().ok())
            .map(|llm_delta| 0.8 * base_delta + 0.2 * llm_delta)
            .unwrap_or(base_delta);
        AgentAction::new(&self.name, blended)
    }
}

/// Directional attack opposing the agent's own model of the expected trend
/// (`0.4 + 0.4 * exogenous`), shrunk by `attack_cost`. Open question (a):
/// the cost penalty is clamped so it can never flip the attack's sign.
pub struct AdversaryAgent {
    pub name: String,
    pub aggressiveness: f64,
    pub attack_cost: f64,
}

impl AdversaryAgent {
    pub fn new(name: impl Into<String>, aggressiveness: f64, attack_cost: f64) -> Self {
        Self {
            name: name.into(),
            aggressiveness,
            attack_cost,
        }
    }

    pub fn act(&self, state: &ForecastState) -> AgentAction {
        let expected_trend = 0.4 + 0.4 * state.exogenous();
        let direction = if expected_trend >= 0.0 { -1.0 } else { 1.0 };
        let base = direction * 0.4 * self.aggressiveness;
        let penalty = base.abs().min(self.attack_cost * 0.2);
        let delta = if base > 0.0 { base - penalty } else { base + penalty };
        AgentAction::new(&self.name, delta)
    }
}

pub struct DefenderAgent {
    pub name: String,
}

impl DefenderAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn act(&self, forecast_action: &AgentAction, adversary_action: &AgentAction, defense_model: &str) -> AgentAction {
        let defense = defense_from_name(defense_model);
        let correction = defense.defend(forecast_action.delta(), adversary_action.delta());
        AgentAction::new(&self.name, correction)
    }
}

/// Emits `+/- step_size` from the sign of the last round's error, or
/// delegates to an external suggester when LLM refactor mode is enabled.
pub struct RefactoringAgent {
    pub name: String,
    pub step_size: f64,
    pub llm_suggester: Option<Box<dyn Fn(f64) -> f64>>,
}

impl RefactoringAgent {
    pub fn new(name: impl Into<String>, step_size: f64) -> Self {
        Self {
            name: name.into(),
            step_size,
            llm_suggester: None,
        }
    }

    pub fn with_llm_suggester(mut self, suggester: Box<dyn Fn(f64) -> f64>) -> Self {
        self.llm_suggester = Some(suggester);
        self
    }

    pub fn revise(&self, latest_error: f64, use_llm: bool) -> f64 {
        if use_llm {
            if let Some(suggester) = &self.llm_suggester {
                return suggester(latest_error);
            }
        }
        if latest_error > 0.0 {
            -self.step_size
        } else {
            self.step_size
        }
    }
}

/// Segment-level forecaster: blends the strategy runtime's delta with the
/// mean of the state's `segment_values` at weight `segment_weight`.
pub struct BottomUpAgent {
    pub name: String,
    pub segment_weight: f64,
}

impl BottomUpAgent {
    pub fn new(name: impl Into<String>, segment_weight: f64) -> Self {
        Self {
            name: name.into(),
            segment_weight,
        }
    }

    pub fn act(&self, state: &ForecastState, runtime: &dyn StrategyRuntime) -> AgentAction {
        let segment_values = state.segment_values();
        let seg_contribution = if segment_values.is_empty() {
            0.0
        } else {
            segment_values.values().sum::<f64>() / segment_values.len() as f64
        };
        let base_delta = runtime.forecast_delta(state);
        let delta = (1.0 - self.segment_weight) * base_delta + self.segment_weight * seg_contribution;
        AgentAction::new(&self.name, delta)
    }
}

/// Macro-level adjuster: emits `macro_sensitivity * mean(macro_context)`.
pub struct TopDownAgent {
    pub name: String,
    pub macro_sensitivity: f64,
}

impl TopDownAgent {
    pub fn new(name: impl Into<String>, macro_sensitivity: f64) -> Self {
        Self {
            name: name.into(),
            macro_sensitivity,
        }
    }

    pub fn act(&self, state: &ForecastState) -> AgentAction {
        let macro_context = state.macro_context();
        let macro_signal = if macro_context.is_empty() {
            0.0
        } else {
            macro_context.values().sum::<f64>() / macro_context.len() as f64
        };
        AgentAction::new(&self.name, self.macro_sensitivity * macro_signal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    Equal,
    RewardProportional,
}

/// Combines a non-empty list of actions into one. `Equal` takes the
/// arithmetic mean; `RewardProportional` weights by `max(0, reward+1)` from
/// `reward_history`, renormalized. Empty input returns delta 0.
pub struct EnsembleAggregatorAgent {
    pub name: String,
    pub mode: AggregationMode,
}

impl EnsembleAggregatorAgent {
    pub fn new(name: impl Into<String>, mode: AggregationMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }

    pub fn aggregate(&self, actions: &[AgentAction], reward_history: Option<&FrozenMap<f64>>) -> AgentAction {
        if actions.is_empty() {
            return AgentAction::new(&self.name, 0.0);
        }

        if self.mode == AggregationMode::RewardProportional {
            if let Some(history) = reward_history {
                let weights: Vec<f64> = actions
                    .iter()
                    .map(|a| (history.get(a.actor()).copied().unwrap_or(0.0) + 1.0).max(0.0))
                    .collect();
                let total: f64 = weights.iter().sum();
                let total = if total == 0.0 { 1.0 } else { total };
                let weighted: f64 = weights
                    .iter()
                    .zip(actions.iter())
                    .map(|(w, a)| w * a.delta())
                    .sum::<f64>()
                    / total;
                return AgentAction::new(&self.name, weighted);
            }
        }

        let total: f64 = actions.iter().map(|a| a.delta()).sum();
        AgentAction::new(&self.name, total / actions.len() as f64)
    }
}

impl Default for EnsembleAggregatorAgent {
    fn default() -> Self {
        Self::new("aggregator", AggregationMode::Equal)
    }
}

/// Flexible container for a variable number of agents of each kind.
#[derive(Default)]
pub struct AgentRegistry {
    pub forecasters: Vec<ForecastingAgent>,
    pub bottom_up: Vec<BottomUpAgent>,
    pub top_down: Vec<TopDownAgent>,
    pub adversaries: Vec<AdversaryAgent>,
    pub defenders: Vec<DefenderAgent>,
    pub refactorer: Option<RefactoringAgent>,
    pub aggregator: EnsembleAggregatorAgent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::PythonRuntime;

    #[test]
    fn forecasting_agent_uses_runtime_without_llm() {
        let agent = ForecastingAgent::new("forecaster");
        let state = ForecastState::new(0, 1.0, 2.0, 0.0);
        let action = agent.act(&state, &PythonRuntime);
        assert!((action.delta() - (0.55 + 0.35 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn adversary_opposes_positive_trend() {
        let adversary = AdversaryAgent::new("adversary", 1.0, 0.0);
        let state = ForecastState::new(0, 0.0, 1.0, 0.0);
        let action = adversary.act(&state);
        assert!(action.delta() < 0.0);
    }

    #[test]
    fn adversary_cost_penalty_never_flips_sign() {
        let adversary = AdversaryAgent::new("adversary", 1.0, 1000.0);
        let state = ForecastState::new(0, 0.0, 1.0, 0.0);
        let action = adversary.act(&state);
        assert!(action.delta() <= 0.0);
    }

    #[test]
    fn refactoring_agent_steps_opposite_error_sign() {
        let agent = RefactoringAgent::new("refactor", 0.02);
        assert_eq!(agent.revise(1.0, false), -0.02);
        assert_eq!(agent.revise(-1.0, false), 0.02);
    }

    #[test]
    fn ensemble_equal_mode_averages() {
        let agg = EnsembleAggregatorAgent::new("aggregator", AggregationMode::Equal);
        let actions = vec![AgentAction::new("a", 1.0), AgentAction::new("b", 3.0)];
        assert_eq!(agg.aggregate(&actions, None).delta(), 2.0);
    }

    #[test]
    fn ensemble_empty_input_returns_zero() {
        let agg = EnsembleAggregatorAgent::default();
        assert_eq!(agg.aggregate(&[], None).delta(), 0.0);
    }

    #[test]
    fn ensemble_reward_proportional_weights_by_history() {
        let agg = EnsembleAggregatorAgent::new("aggregator", AggregationMode::RewardProportional);
        let actions = vec![AgentAction::new("a", 1.0), AgentAction::new("b", 3.0)];
        let history: FrozenMap<f64> = [("a".to_string(), 0.0), ("b".to_string(), 4.0)]
            .into_iter()
            .collect();
        let result = agg.aggregate(&actions, Some(&history)).delta();
        assert!(result > 2.0);
    }
}
