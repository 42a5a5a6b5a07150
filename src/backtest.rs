//! Walk-forward backtesting and factor sensitivity analysis (spec.md §4.10,
//! supplemented §3).
//!
//! Grounded in `original_source/framework/backtesting.py`'s
//! `WalkForwardBacktester` and `SensitivityAnalyzer`.

use crate::agents::AgentRegistry;
use crate::engine::ForecastGame;
use crate::metrics::{mae, rmse};
use crate::types::{FrozenMap, ForecastState, SimulationConfig};

/// A row of historical data: a target value for a single time step. The
/// caller is responsible for providing already-validated, chronologically
/// ordered rows (see [`crate::data`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalRow {
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult {
    pub window_idx: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
    pub mae: f64,
    pub rmse: f64,
    pub n_forecasts: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub n_windows: usize,
    pub window_results: Vec<WindowResult>,
    pub aggregate_mae: f64,
    pub aggregate_rmse: f64,
}

pub struct WalkForwardBacktester {
    config: SimulationConfig,
    window_size: usize,
    step_size: usize,
    seed: u64,
}

impl WalkForwardBacktester {
    pub fn new(config: SimulationConfig, window_size: usize, step_size: usize, seed: u64) -> Self {
        Self {
            config,
            window_size,
            step_size,
            seed,
        }
    }

    /// Builds a fresh agent registry for each window. The closure lets
    /// callers supply whatever forecaster/adversary/defender mix they need
    /// without this backtester hard-coding one.
    pub fn run<F>(&self, rows: &[HistoricalRow], max_windows: usize, make_registry: F) -> BacktestResult
    where
        F: Fn() -> AgentRegistry,
    {
        let n = rows.len();
        if n < self.window_size + self.step_size {
            return BacktestResult {
                n_windows: 0,
                window_results: Vec::new(),
                aggregate_mae: 0.0,
                aggregate_rmse: 0.0,
            };
        }

        let mut window_results = Vec::new();
        let mut all_forecasts = Vec::new();
        let mut all_targets = Vec::new();

        let mut start = 0usize;
        let mut window_idx = 0usize;

        while start + self.window_size + self.step_size <= n && window_idx < max_windows {
            let train_end = start + self.window_size;
            let test_end = (train_end + self.step_size).min(n);
            let test_len = test_end - train_end;

            let init_value = rows[train_end - 1].target;
            let init = ForecastState::new(0, init_value, 0.0, 0.0);

            let mut game = ForecastGame::new(self.config.clone(), self.seed + window_idx as u64, make_registry());
            let out = game.run(init, Some(test_len as i64), true);

            let (w_mae, w_rmse) = if !out.forecasts.is_empty() && !out.targets.is_empty() {
                all_forecasts.extend(out.forecasts.iter());
                all_targets.extend(out.targets.iter());
                (mae(&out.targets, &out.forecasts), rmse(&out.targets, &out.forecasts))
            } else {
                (0.0, 0.0)
            };

            window_results.push(WindowResult {
                window_idx,
                train_start: start,
                train_end,
                test_start: train_end,
                test_end,
                mae: w_mae,
                rmse: w_rmse,
                n_forecasts: out.forecasts.len(),
            });

            start += self.step_size;
            window_idx += 1;
        }

        let aggregate_mae = if all_forecasts.is_empty() { 0.0 } else { mae(&all_targets, &all_forecasts) };
        let aggregate_rmse = if all_forecasts.is_empty() { 0.0 } else { rmse(&all_targets, &all_forecasts) };

        BacktestResult {
            n_windows: window_results.len(),
            window_results,
            aggregate_mae,
            aggregate_rmse,
        }
    }
}

/// Per-factor perturbation analysis over a state's `macro_context` fields:
/// how much does nudging each factor change backtest MAE, relative to the
/// others.
pub struct SensitivityAnalyzer {
    config: SimulationConfig,
    perturbation_std: f64,
    seed: u64,
}

impl SensitivityAnalyzer {
    pub fn new(config: SimulationConfig, perturbation_std: f64, seed: u64) -> Self {
        Self {
            config,
            perturbation_std,
            seed,
        }
    }

    pub fn analyze<F>(
        &self,
        init_state: &ForecastState,
        factors: Option<&[String]>,
        make_registry: F,
    ) -> FrozenMap<f64>
    where
        F: Fn() -> AgentRegistry,
    {
        let owned_factors: Vec<String> = match factors {
            Some(f) => f.to_vec(),
            None => init_state.macro_context().keys().cloned().collect(),
        };

        if owned_factors.is_empty() {
            return FrozenMap::new();
        }

        let mut baseline_game = ForecastGame::new(self.config.clone(), self.seed, make_registry());
        let baseline_out = baseline_game.run(init_state.clone(), None, true);
        let baseline_mae = if baseline_out.forecasts.is_empty() {
            0.0
        } else {
            mae(&baseline_out.targets, &baseline_out.forecasts)
        };

        let mut importance: Vec<(String, f64)> = Vec::new();
        for factor in &owned_factors {
            let current_val = init_state.macro_context().get(factor).copied().unwrap_or(0.0);
            let perturbed_ctx: FrozenMap<f64> = init_state
                .macro_context()
                .iter()
                .map(|(k, v)| {
                    if k == factor {
                        (k.clone(), current_val + self.perturbation_std)
                    } else {
                        (k.clone(), *v)
                    }
                })
                .chain(if init_state.macro_context().get(factor).is_none() {
                    vec![(factor.clone(), current_val + self.perturbation_std)]
                } else {
                    vec![]
                })
                .collect();
            let perturbed_state = init_state.clone().with_macro_context(perturbed_ctx);

            let mut game = ForecastGame::new(self.config.clone(), self.seed, make_registry());
            let out = game.run(perturbed_state, None, true);
            let perturbed_mae = if out.forecasts.is_empty() { 0.0 } else { mae(&out.targets, &out.forecasts) };

            importance.push((factor.clone(), (perturbed_mae - baseline_mae).abs()));
        }

        let total: f64 = importance.iter().map(|(_, v)| v).sum();
        let total = if total == 0.0 { 1.0 } else { total };
        importance.into_iter().map(|(k, v)| (k, v / total)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AdversaryAgent, DefenderAgent, ForecastingAgent, RefactoringAgent};
    use crate::types::SimulationConfigBuilder;

    fn registry() -> AgentRegistry {
        AgentRegistry {
            forecasters: vec![ForecastingAgent::new("forecaster")],
            adversaries: vec![AdversaryAgent::new("adversary", 1.0, 0.0)],
            defenders: vec![DefenderAgent::new("defender")],
            refactorer: Some(RefactoringAgent::new("refactor", 0.02)),
            ..Default::default()
        }
    }

    #[test]
    fn too_few_rows_yields_zero_windows() {
        let config = SimulationConfig::default();
        let backtester = WalkForwardBacktester::new(config, 60, 20, 1);
        let rows = vec![HistoricalRow { target: 1.0 }; 10];
        let result = backtester.run(&rows, 50, registry);
        assert_eq!(result.n_windows, 0);
    }

    #[test]
    fn enough_rows_yields_at_least_one_window() {
        let config = SimulationConfigBuilder::default().horizon(20).build().unwrap();
        let backtester = WalkForwardBacktester::new(config, 20, 10, 1);
        let rows: Vec<HistoricalRow> = (0..40).map(|i| HistoricalRow { target: i as f64 }).collect();
        let result = backtester.run(&rows, 50, registry);
        assert!(result.n_windows >= 1);
        assert!(result.aggregate_mae >= 0.0);
    }

    #[test]
    fn sensitivity_with_no_factors_returns_empty() {
        let config = SimulationConfig::default();
        let analyzer = SensitivityAnalyzer::new(config, 1.0, 1);
        let state = ForecastState::new(0, 0.0, 0.0, 0.0);
        let result = analyzer.analyze(&state, None, registry);
        assert!(result.is_empty());
    }

    #[test]
    fn sensitivity_importances_sum_to_one_when_nonzero() {
        let config = SimulationConfigBuilder::default().horizon(5).build().unwrap();
        let analyzer = SensitivityAnalyzer::new(config, 1.0, 1);
        let macro_ctx: FrozenMap<f64> = [("gdp".to_string(), 1.0), ("pmi".to_string(), 0.0)]
            .into_iter()
            .collect();
        let state = ForecastState::new(0, 0.0, 0.0, 0.0).with_macro_context(macro_ctx);
        let result = analyzer.analyze(&state, None, registry);
        let total: f64 = result.values().sum();
        assert!(total == 0.0 || (total - 1.0).abs() < 1e-9);
    }
}
