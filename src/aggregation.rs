//! Bayesian model averaging across agent forecasts (spec.md §4.9).
//!
//! Grounded in `original_source/framework/aggregation.py`'s
//! `BayesianAggregator`: per-agent posterior weights updated via Gaussian
//! log-likelihood, softmax-normalized, used to take a weighted mean/variance
//! of the round's agent deltas and build a [`ProbabilisticForecast`].

use crate::types::{AgentAction, FrozenMap, ForecastState, ProbabilisticForecast};

const Z_SCORES: [f64; 5] = [-1.2816, -0.6745, 0.0, 0.6745, 1.2816];

pub struct BayesianAggregator {
    agent_names: Vec<String>,
    log_weights: Vec<f64>,
    observation_variance: f64,
    initialized: bool,
}

impl BayesianAggregator {
    pub fn new(observation_variance: f64) -> Self {
        Self {
            agent_names: Vec::new(),
            log_weights: Vec::new(),
            observation_variance,
            initialized: false,
        }
    }

    fn ensure_init(&mut self, names: &[String]) {
        if self.initialized {
            return;
        }
        self.agent_names = names.to_vec();
        self.log_weights = vec![0.0; names.len()];
        self.initialized = true;
    }

    /// Softmax of log-weights, stabilized by subtracting the max.
    pub fn weights(&self) -> Vec<f64> {
        if self.log_weights.is_empty() {
            return Vec::new();
        }
        let max_lw = self.log_weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp_weights: Vec<f64> = self.log_weights.iter().map(|lw| (lw - max_lw).exp()).collect();
        let total: f64 = exp_weights.iter().sum();
        let total = if total == 0.0 { 1.0 } else { total };
        exp_weights.into_iter().map(|w| w / total).collect()
    }

    /// Updates posterior log-weights given per-agent forecast errors.
    pub fn update(&mut self, agent_errors: &FrozenMap<f64>) {
        for (i, name) in self.agent_names.iter().enumerate() {
            if let Some(err) = agent_errors.get(name) {
                let ll = -0.5 * err.powi(2) / self.observation_variance;
                self.log_weights[i] += ll;
            }
        }
    }

    /// Weighted mean and weighted variance of the round's agent deltas. On
    /// first call, initializes agent names from the action list.
    pub fn aggregate(&mut self, actions: &[AgentAction], _state: &ForecastState) -> (f64, f64) {
        let names: Vec<String> = actions.iter().map(|a| a.actor().to_string()).collect();
        self.ensure_init(&names);

        let weights = self.weights();
        let name_to_weight: std::collections::HashMap<&str, f64> = self
            .agent_names
            .iter()
            .map(String::as_str)
            .zip(weights)
            .collect();

        let default_weight = 1.0 / actions.len().max(1) as f64;
        let weighted: Vec<f64> = actions
            .iter()
            .map(|a| name_to_weight.get(a.actor()).copied().unwrap_or(default_weight))
            .collect();

        let weight_sum: f64 = weighted.iter().sum();
        let weight_sum_safe = weight_sum.max(1e-12);

        let mean_delta: f64 = weighted
            .iter()
            .zip(actions.iter())
            .map(|(w, a)| w * a.delta())
            .sum::<f64>()
            / weight_sum_safe;

        let variance: f64 = weighted
            .iter()
            .zip(actions.iter())
            .map(|(w, a)| w * (a.delta() - mean_delta).powi(2))
            .sum::<f64>()
            / weight_sum_safe;

        (mean_delta, variance)
    }

    pub fn make_probabilistic(&self, forecast_mean: f64, variance: f64, base_noise_std: f64) -> ProbabilisticForecast {
        let total_var = variance + base_noise_std.powi(2);
        let std = total_var.max(0.0).sqrt();
        let mut quantiles = [0.0; 5];
        for (i, z) in Z_SCORES.iter().enumerate() {
            quantiles[i] = forecast_mean + z * std;
        }
        ProbabilisticForecast::new(forecast_mean, total_var, quantiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_weights_are_uniform() {
        let mut agg = BayesianAggregator::new(1.0);
        let state = ForecastState::new(0, 0.0, 0.0, 0.0);
        let actions = vec![AgentAction::new("a", 1.0), AgentAction::new("b", 3.0)];
        let (mean, variance) = agg.aggregate(&actions, &state);
        assert!((mean - 2.0).abs() < 1e-9);
        assert!(variance >= 0.0);
    }

    #[test]
    fn update_shifts_weight_toward_accurate_agent() {
        let mut agg = BayesianAggregator::new(1.0);
        let state = ForecastState::new(0, 0.0, 0.0, 0.0);
        let actions = vec![AgentAction::new("a", 1.0), AgentAction::new("b", 3.0)];
        agg.aggregate(&actions, &state);

        let errors: FrozenMap<f64> = [("a".to_string(), 0.1), ("b".to_string(), 5.0)]
            .into_iter()
            .collect();
        agg.update(&errors);
        let weights = agg.weights();
        assert!(weights[0] > weights[1]);
    }

    #[test]
    fn probabilistic_quantiles_are_symmetric_around_mean() {
        let agg = BayesianAggregator::new(1.0);
        let forecast = agg.make_probabilistic(5.0, 1.0, 0.1);
        let q = forecast.quantiles();
        assert!((q[2] - 5.0).abs() < 1e-12);
        assert!((q[0] - 5.0) + (q[4] - 5.0) < 1e-9);
    }

    #[test]
    fn unknown_actor_defaults_to_uniform_weight() {
        let mut agg = BayesianAggregator::new(1.0);
        let state = ForecastState::new(0, 0.0, 0.0, 0.0);
        let first = vec![AgentAction::new("a", 1.0)];
        agg.aggregate(&first, &state);
        let second = vec![AgentAction::new("a", 1.0), AgentAction::new("newcomer", 9.0)];
        let (mean, _) = agg.aggregate(&second, &state);
        assert!(mean.is_finite());
    }
}
