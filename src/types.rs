//! Value objects for the forecasting Markov game.
//!
//! Every type here is a value object: once constructed, none of its fields
//! can be reassigned. Following the teacher's pattern for derived state
//! (`Signal::with_market` in the teacher's `models.rs`, a consuming builder
//! that returns a new value), state transitions produce a *new* value
//! rather than mutating in place. There are no `&mut self` methods on any
//! of these types beyond what a builder needs before first use.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A read-only keyed mapping. Wraps a `BTreeMap` (stable iteration order,
/// needed for reproducible hashing/serialization) and exposes only
/// non-mutating accessors, so a caller holding a `FrozenMap` has no API
/// surface capable of mutating it — the read-only view spec.md §9 asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FrozenMap<V> {
    inner: BTreeMap<String, V>,
}

impl<V> FrozenMap<V> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn from_map(inner: BTreeMap<String, V>) -> Self {
        Self { inner }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }
}

impl<V> FromIterator<(String, V)> for FrozenMap<V> {
    fn from_iter<T: IntoIterator<Item = (String, V)>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

/// Immutable scalar state for the forecasting Markov game.
///
/// `t` monotonically increases across transitions; `segment_values` and
/// `macro_context`, once attached, are never mutated (see [`FrozenMap`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastState {
    t: i64,
    value: f64,
    exogenous: f64,
    hidden_shift: f64,
    segment_id: Option<String>,
    segment_values: FrozenMap<f64>,
    macro_context: FrozenMap<f64>,
}

impl ForecastState {
    pub fn new(t: i64, value: f64, exogenous: f64, hidden_shift: f64) -> Self {
        Self {
            t,
            value,
            exogenous,
            hidden_shift,
            segment_id: None,
            segment_values: FrozenMap::new(),
            macro_context: FrozenMap::new(),
        }
    }

    pub fn with_segment_id(mut self, segment_id: impl Into<String>) -> Self {
        self.segment_id = Some(segment_id.into());
        self
    }

    pub fn with_segment_values(mut self, segment_values: FrozenMap<f64>) -> Self {
        self.segment_values = segment_values;
        self
    }

    pub fn with_macro_context(mut self, macro_context: FrozenMap<f64>) -> Self {
        self.macro_context = macro_context;
        self
    }

    pub fn t(&self) -> i64 {
        self.t
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn exogenous(&self) -> f64 {
        self.exogenous
    }

    pub fn hidden_shift(&self) -> f64 {
        self.hidden_shift
    }

    pub fn segment_id(&self) -> Option<&str> {
        self.segment_id.as_deref()
    }

    pub fn segment_values(&self) -> &FrozenMap<f64> {
        &self.segment_values
    }

    pub fn macro_context(&self) -> &FrozenMap<f64> {
        &self.macro_context
    }

    fn with_transition(&self, t: i64, value: f64, exogenous: f64, hidden_shift: f64) -> Self {
        Self {
            t,
            value,
            exogenous,
            hidden_shift,
            segment_id: self.segment_id.clone(),
            segment_values: self.segment_values.clone(),
            macro_context: self.macro_context.clone(),
        }
    }
}

/// Pure transition function. Referentially transparent: equal inputs yield
/// byte-equal outputs irrespective of call count or ordering.
///
/// `new_value = value + base_trend + 0.4*exogenous + noise + disturbance
///              + sum(coeff * macro_context[key])`
/// `new_exogenous = 0.6*exogenous + 0.2*disturbance`
/// `new_hidden_shift = disturbance`
pub fn evolve_state(
    state: &ForecastState,
    base_trend: f64,
    noise: f64,
    disturbance: f64,
    macro_coeffs: Option<&FrozenMap<f64>>,
) -> ForecastState {
    let mut macro_term = 0.0;
    if let Some(coeffs) = macro_coeffs {
        for (key, coeff) in coeffs.iter() {
            if let Some(v) = state.macro_context.get(key) {
                macro_term += coeff * v;
            }
        }
    }

    let new_value = state.value + base_trend + 0.4 * state.exogenous + noise + disturbance + macro_term;
    let new_exogenous = 0.6 * state.exogenous + 0.2 * disturbance;
    state.with_transition(state.t + 1, new_value, new_exogenous, disturbance)
}

/// An agent's proposed scalar adjustment for the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    actor: String,
    delta: f64,
}

impl AgentAction {
    pub fn new(actor: impl Into<String>, delta: f64) -> Self {
        debug_assert!(delta.is_finite(), "AgentAction delta must be finite");
        Self {
            actor: actor.into(),
            delta,
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }
}

/// An inter-agent message, used only for the engine's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    sender: String,
    receiver: String,
    payload: String,
}

impl AgentMessage {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            payload: payload.into(),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Forecast confidence band. `lower <= forecast <= upper` for every
/// emitted step (enforced by the engine's construction of the band, not by
/// this type itself, which is just the carrier).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    lower: f64,
    upper: f64,
}

impl ConfidenceInterval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Bayesian-aggregated probabilistic forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticForecast {
    mean: f64,
    variance: f64,
    /// Quantiles at z in {-1.2816, -0.6745, 0, 0.6745, 1.2816}, ascending.
    quantiles: [f64; 5],
}

impl ProbabilisticForecast {
    pub fn new(mean: f64, variance: f64, quantiles: [f64; 5]) -> Self {
        debug_assert!(variance >= 0.0, "ProbabilisticForecast variance must be >= 0");
        Self {
            mean,
            variance,
            quantiles,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn quantiles(&self) -> &[f64; 5] {
        &self.quantiles
    }
}

/// The outcome of a single round of the game engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    next_state: ForecastState,
    actions: Vec<AgentAction>,
    reward_breakdown: FrozenMap<f64>,
    forecast: f64,
    target: f64,
    confidence: ConfidenceInterval,
    messages: Vec<AgentMessage>,
    probabilistic: Option<ProbabilisticForecast>,
}

impl StepResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        next_state: ForecastState,
        actions: Vec<AgentAction>,
        reward_breakdown: FrozenMap<f64>,
        forecast: f64,
        target: f64,
        confidence: ConfidenceInterval,
        messages: Vec<AgentMessage>,
        probabilistic: Option<ProbabilisticForecast>,
    ) -> Self {
        Self {
            next_state,
            actions,
            reward_breakdown,
            forecast,
            target,
            confidence,
            messages,
            probabilistic,
        }
    }

    pub fn next_state(&self) -> &ForecastState {
        &self.next_state
    }

    pub fn actions(&self) -> &[AgentAction] {
        &self.actions
    }

    /// Unmodifiable view of the reward attributed to each actor.
    pub fn reward_breakdown(&self) -> &FrozenMap<f64> {
        &self.reward_breakdown
    }

    pub fn forecast(&self) -> f64 {
        self.forecast
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn confidence(&self) -> ConfidenceInterval {
        self.confidence
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn probabilistic(&self) -> Option<&ProbabilisticForecast> {
        self.probabilistic.as_ref()
    }
}

/// One entry in a run's recorded trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    round_idx: usize,
    state: ForecastState,
    actions: Vec<AgentAction>,
    messages: Vec<AgentMessage>,
    reward_breakdown: FrozenMap<f64>,
    forecast: f64,
    target: f64,
}

impl TrajectoryEntry {
    pub fn new(
        round_idx: usize,
        state: ForecastState,
        actions: Vec<AgentAction>,
        messages: Vec<AgentMessage>,
        reward_breakdown: FrozenMap<f64>,
        forecast: f64,
        target: f64,
    ) -> Self {
        Self {
            round_idx,
            state,
            actions,
            messages,
            reward_breakdown,
            forecast,
            target,
        }
    }

    pub fn round_idx(&self) -> usize {
        self.round_idx
    }

    pub fn state(&self) -> &ForecastState {
        &self.state
    }

    pub fn actions(&self) -> &[AgentAction] {
        &self.actions
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn reward_breakdown(&self) -> &FrozenMap<f64> {
        &self.reward_breakdown
    }

    pub fn forecast(&self) -> f64 {
        self.forecast
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

/// The JSON-shaped log record for one round (spec.md §6): round index,
/// the pre-transition state's primitives, the round's actions, forecast,
/// target, reward, disturbance, and messages. Unlike [`StepResult`] and
/// [`TrajectoryEntry`], this is a flat bag of primitives meant for direct
/// serialization to an external log sink, not for downstream computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundLog {
    round_idx: usize,
    t: i64,
    value: f64,
    exogenous: f64,
    hidden_shift: f64,
    actions: Vec<AgentAction>,
    forecast: f64,
    target: f64,
    reward: f64,
    disturbance: f64,
    messages: Vec<AgentMessage>,
}

impl RoundLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        round_idx: usize,
        state: &ForecastState,
        actions: Vec<AgentAction>,
        forecast: f64,
        target: f64,
        reward: f64,
        disturbance: f64,
        messages: Vec<AgentMessage>,
    ) -> Self {
        Self {
            round_idx,
            t: state.t(),
            value: state.value(),
            exogenous: state.exogenous(),
            hidden_shift: state.hidden_shift(),
            actions,
            forecast,
            target,
            reward,
            disturbance,
            messages,
        }
    }

    pub fn round_idx(&self) -> usize {
        self.round_idx
    }

    pub fn t(&self) -> i64 {
        self.t
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn actions(&self) -> &[AgentAction] {
        &self.actions
    }

    pub fn forecast(&self) -> f64 {
        self.forecast
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn reward(&self) -> f64 {
        self.reward
    }

    pub fn disturbance(&self) -> f64 {
        self.disturbance
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }
}

/// Validated, immutable engine configuration. Construct via
/// [`SimulationConfigBuilder`]; there is no way to obtain a partially
/// valid `SimulationConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    horizon: usize,
    max_rounds: usize,
    max_round_timeout_s: f64,
    base_noise_std: f64,
    disturbance_prob: f64,
    disturbance_scale: f64,
    adversarial_intensity: f64,
    attack_cost: f64,
    runtime_backend: String,
    disturbance_model: String,
    defense_model: String,
    enable_refactor: bool,
    enable_llm_refactor: bool,
}

impl SimulationConfig {
    pub fn horizon(&self) -> usize {
        self.horizon
    }
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }
    pub fn max_round_timeout_s(&self) -> f64 {
        self.max_round_timeout_s
    }
    pub fn base_noise_std(&self) -> f64 {
        self.base_noise_std
    }
    pub fn disturbance_prob(&self) -> f64 {
        self.disturbance_prob
    }
    pub fn disturbance_scale(&self) -> f64 {
        self.disturbance_scale
    }
    pub fn adversarial_intensity(&self) -> f64 {
        self.adversarial_intensity
    }
    pub fn attack_cost(&self) -> f64 {
        self.attack_cost
    }
    pub fn runtime_backend(&self) -> &str {
        &self.runtime_backend
    }
    pub fn disturbance_model(&self) -> &str {
        &self.disturbance_model
    }
    pub fn defense_model(&self) -> &str {
        &self.defense_model
    }
    pub fn enable_refactor(&self) -> bool {
        self.enable_refactor
    }
    pub fn enable_llm_refactor(&self) -> bool {
        self.enable_llm_refactor
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfigBuilder::default()
            .build()
            .expect("default SimulationConfig must validate")
    }
}

/// Consuming builder that validates on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SimulationConfigBuilder {
    horizon: usize,
    max_rounds: usize,
    max_round_timeout_s: f64,
    base_noise_std: f64,
    disturbance_prob: f64,
    disturbance_scale: f64,
    adversarial_intensity: f64,
    attack_cost: f64,
    runtime_backend: String,
    disturbance_model: String,
    defense_model: String,
    enable_refactor: bool,
    enable_llm_refactor: bool,
}

impl Default for SimulationConfigBuilder {
    fn default() -> Self {
        Self {
            horizon: 100,
            max_rounds: 200,
            max_round_timeout_s: 1.0,
            base_noise_std: 0.15,
            disturbance_prob: 0.1,
            disturbance_scale: 1.0,
            adversarial_intensity: 1.0,
            attack_cost: 0.0,
            runtime_backend: "python".to_string(),
            disturbance_model: "gaussian".to_string(),
            defense_model: "dampening".to_string(),
            enable_refactor: true,
            enable_llm_refactor: false,
        }
    }
}

impl SimulationConfigBuilder {
    pub fn horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }
    pub fn max_round_timeout_s(mut self, timeout: f64) -> Self {
        self.max_round_timeout_s = timeout;
        self
    }
    pub fn base_noise_std(mut self, std: f64) -> Self {
        self.base_noise_std = std;
        self
    }
    pub fn disturbance_prob(mut self, prob: f64) -> Self {
        self.disturbance_prob = prob;
        self
    }
    pub fn disturbance_scale(mut self, scale: f64) -> Self {
        self.disturbance_scale = scale;
        self
    }
    pub fn adversarial_intensity(mut self, intensity: f64) -> Self {
        self.adversarial_intensity = intensity;
        self
    }
    pub fn attack_cost(mut self, cost: f64) -> Self {
        self.attack_cost = cost;
        self
    }
    pub fn runtime_backend(mut self, name: impl Into<String>) -> Self {
        self.runtime_backend = name.into();
        self
    }
    pub fn disturbance_model(mut self, name: impl Into<String>) -> Self {
        self.disturbance_model = name.into();
        self
    }
    pub fn defense_model(mut self, name: impl Into<String>) -> Self {
        self.defense_model = name.into();
        self
    }
    pub fn enable_refactor(mut self, enable: bool) -> Self {
        self.enable_refactor = enable;
        self
    }
    pub fn enable_llm_refactor(mut self, enable: bool) -> Self {
        self.enable_llm_refactor = enable;
        self
    }

    pub fn build(self) -> EngineResult<SimulationConfig> {
        if self.max_round_timeout_s <= 0.0 {
            return Err(EngineError::InvalidConfig {
                field: "max_round_timeout_s".into(),
                reason: "must be > 0".into(),
            });
        }
        if self.base_noise_std < 0.0 {
            return Err(EngineError::InvalidConfig {
                field: "base_noise_std".into(),
                reason: "must be >= 0".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.disturbance_prob) {
            return Err(EngineError::InvalidConfig {
                field: "disturbance_prob".into(),
                reason: "must be in [0, 1]".into(),
            });
        }
        if self.disturbance_scale < 0.0 {
            return Err(EngineError::InvalidConfig {
                field: "disturbance_scale".into(),
                reason: "must be >= 0".into(),
            });
        }
        if self.adversarial_intensity < 0.0 {
            return Err(EngineError::InvalidConfig {
                field: "adversarial_intensity".into(),
                reason: "must be >= 0".into(),
            });
        }
        if self.attack_cost < 0.0 {
            return Err(EngineError::InvalidConfig {
                field: "attack_cost".into(),
                reason: "must be >= 0".into(),
            });
        }

        Ok(SimulationConfig {
            horizon: self.horizon,
            max_rounds: self.max_rounds,
            max_round_timeout_s: self.max_round_timeout_s,
            base_noise_std: self.base_noise_std,
            disturbance_prob: self.disturbance_prob,
            disturbance_scale: self.disturbance_scale,
            adversarial_intensity: self.adversarial_intensity,
            attack_cost: self.attack_cost,
            runtime_backend: self.runtime_backend,
            disturbance_model: self.disturbance_model,
            defense_model: self.defense_model,
            enable_refactor: self.enable_refactor,
            enable_llm_refactor: self.enable_llm_refactor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_is_pure() {
        let s0 = ForecastState::new(0, 10.0, 1.2, 0.0);
        let s1 = evolve_state(&s0, 0.4, 0.0, 0.1, None);
        let s2 = evolve_state(&s0, 0.4, 0.0, 0.1, None);
        assert_eq!(s1, s2);
        assert_eq!(s1.t(), s0.t() + 1);
    }

    #[test]
    fn transition_formula_matches_spec() {
        let s0 = ForecastState::new(0, 10.0, 2.0, 0.0);
        let s1 = evolve_state(&s0, 0.4, 0.5, 0.3, None);
        assert!((s1.value() - (10.0 + 0.4 + 0.8 + 0.5 + 0.3)).abs() < 1e-12);
        assert!((s1.exogenous() - (0.6 * 2.0 + 0.2 * 0.3)).abs() < 1e-12);
        assert_eq!(s1.hidden_shift(), 0.3);
    }

    #[test]
    fn macro_context_contributes_weighted_sum() {
        let macro_ctx: FrozenMap<f64> = [("gdp".to_string(), 2.0), ("pmi".to_string(), 1.0)]
            .into_iter()
            .collect();
        let s0 = ForecastState::new(0, 0.0, 0.0, 0.0).with_macro_context(macro_ctx);
        let coeffs: FrozenMap<f64> = [("gdp".to_string(), 0.5), ("pmi".to_string(), 0.1)]
            .into_iter()
            .collect();
        let s1 = evolve_state(&s0, 0.0, 0.0, 0.0, Some(&coeffs));
        assert!((s1.value() - (0.5 * 2.0 + 0.1 * 1.0)).abs() < 1e-12);
    }

    #[test]
    fn config_rejects_invalid_fields() {
        let err = SimulationConfigBuilder::default()
            .disturbance_prob(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { .. }));
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.horizon(), 100);
        assert_eq!(cfg.max_rounds(), 200);
    }
}
