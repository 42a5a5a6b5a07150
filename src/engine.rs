//! The Markov game round loop (spec.md §4.8).
//!
//! Grounded in `original_source/framework/game.py`'s `ForecastGame.run`,
//! extended per spec.md to support a variable number of agents per role
//! (via [`AgentRegistry`]), a safe executor around every agent call, wall-
//! clock per-round timeout truncation, and cumulative reward bookkeeping
//! for the reward-proportional aggregator.

use crate::agents::AgentRegistry;
use crate::disturbance::{disturbance_from_name, Disturbance};
use crate::random::RandomStream;
use crate::safe_executor::SafeAgentExecutor;
use crate::strategy::{runtime_from_name, StrategyRuntime};
use crate::types::{
    evolve_state, AgentAction, AgentMessage, ConfidenceInterval, ForecastState, FrozenMap, RoundLog, SimulationConfig,
    StepResult, TrajectoryEntry,
};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceSummary {
    pub rounds_executed: usize,
    pub max_rounds: usize,
    pub round_cap_hit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameOutputs {
    pub steps: Vec<StepResult>,
    pub trajectories: Vec<TrajectoryEntry>,
    pub logs: Vec<RoundLog>,
    pub forecasts: Vec<f64>,
    pub targets: Vec<f64>,
    pub confidence: Vec<ConfidenceInterval>,
    pub convergence: ConvergenceSummary,
}

pub struct ForecastGame {
    config: SimulationConfig,
    rng: RandomStream,
    runtime: Box<dyn StrategyRuntime>,
    disturbance: Box<dyn Disturbance>,
    executor: SafeAgentExecutor,
    registry: AgentRegistry,
    refactor_bias: f64,
    cumulative_reward: BTreeMap<String, f64>,
}

fn average_action(actions: &[AgentAction], zero_actor: &str) -> AgentAction {
    if actions.is_empty() {
        return AgentAction::new(zero_actor, 0.0);
    }
    let mean = actions.iter().map(|a| a.delta()).sum::<f64>() / actions.len() as f64;
    AgentAction::new(actions[0].actor(), mean)
}

impl ForecastGame {
    pub fn new(config: SimulationConfig, seed: u64, registry: AgentRegistry) -> Self {
        let runtime = runtime_from_name(config.runtime_backend());
        let disturbance = disturbance_from_name(config.disturbance_model());
        Self {
            rng: RandomStream::new(seed),
            runtime,
            disturbance,
            executor: SafeAgentExecutor::default(),
            registry,
            refactor_bias: 0.0,
            cumulative_reward: BTreeMap::new(),
            config,
        }
    }

    /// `rounds_opt` mirrors spec.md's signed input: a negative value yields
    /// zero rounds rather than erroring.
    pub fn run(&mut self, initial: ForecastState, rounds_opt: Option<i64>, disturbed: bool) -> GameOutputs {
        let requested = rounds_opt.unwrap_or(self.config.horizon() as i64);
        let effective_rounds = requested.max(0).min(self.config.max_rounds() as i64) as usize;

        let mut state = initial;
        let mut steps = Vec::with_capacity(effective_rounds);
        let mut trajectories = Vec::with_capacity(effective_rounds);
        let mut logs = Vec::with_capacity(effective_rounds);
        let mut forecasts = Vec::with_capacity(effective_rounds);
        let mut targets = Vec::with_capacity(effective_rounds);
        let mut confidence = Vec::with_capacity(effective_rounds);

        for idx in 0..effective_rounds {
            let round_start = Instant::now();

            let (f_action, f_contributors) = self.forecaster_action(&state);
            let a_action = self.adversary_action(&state, disturbed);
            let d_action = self.defender_action(&f_action, &a_action);
            let disturbance_value = if disturbed {
                self.disturbance.sample(&state, &mut self.rng, &self.config)
            } else {
                0.0
            };

            let forecast = state.value() + f_action.delta() + a_action.delta() + d_action.delta() + self.refactor_bias;
            let noise = self.rng.next_gauss(0.0, self.config.base_noise_std());
            let next_state = evolve_state(&state, 0.4, noise, disturbance_value, None);
            let target = next_state.value();
            let error = target - forecast;
            let reward = -error.abs();

            if self.config.enable_refactor() {
                if let Some(refactorer) = &self.registry.refactorer {
                    self.refactor_bias += refactorer.revise(error, self.config.enable_llm_refactor());
                }
            }

            // Keyed by each contributing forecaster's own actor name, not the
            // aggregator's, so `RewardProportional` sees distinct per-agent
            // history on the next round instead of everyone sharing the
            // aggregator's single bucket.
            if f_contributors.is_empty() {
                *self.cumulative_reward.entry(f_action.actor().to_string()).or_insert(0.0) += reward;
            } else {
                for contributor in &f_contributors {
                    *self.cumulative_reward.entry(contributor.actor().to_string()).or_insert(0.0) += reward;
                }
            }

            let band = disturbance_value.abs() + self.config.base_noise_std() + 0.05;
            let ci = ConfidenceInterval::new(forecast - band, forecast + band);

            let messages = vec![
                AgentMessage::new("forecaster", "adversary", format!("proposal={:.4}", f_action.delta())),
                AgentMessage::new("adversary", "defender", format!("attack={:.4}", a_action.delta())),
                AgentMessage::new("defender", "refactor", format!("defense={:.4}", d_action.delta())),
            ];

            let reward_breakdown: FrozenMap<f64> = [
                ("forecaster".to_string(), reward),
                ("adversary".to_string(), -reward),
                ("defender".to_string(), reward),
            ]
            .into_iter()
            .collect();

            let actions = vec![f_action.clone(), a_action.clone(), d_action.clone()];

            let step = StepResult::new(
                next_state.clone(),
                actions.clone(),
                reward_breakdown.clone(),
                forecast,
                target,
                ci,
                messages.clone(),
                None,
            );
            let traj = TrajectoryEntry::new(
                idx,
                state.clone(),
                actions.clone(),
                messages.clone(),
                reward_breakdown,
                forecast,
                target,
            );
            let log = RoundLog::new(idx, &state, actions, forecast, target, reward, disturbance_value, messages);

            tracing::debug!(
                round = idx,
                forecast,
                target,
                error,
                reward,
                disturbance = disturbance_value,
                "round completed"
            );

            steps.push(step);
            trajectories.push(traj);
            logs.push(log);
            forecasts.push(forecast);
            targets.push(target);
            confidence.push(ci);
            state = next_state;

            let elapsed = round_start.elapsed().as_secs_f64();
            if elapsed > self.config.max_round_timeout_s() {
                tracing::warn!(round = idx, elapsed, "round exceeded max_round_timeout_s, halting run early");
                break;
            }
        }

        let rounds_executed = steps.len();
        GameOutputs {
            steps,
            trajectories,
            logs,
            forecasts,
            targets,
            confidence,
            convergence: ConvergenceSummary {
                rounds_executed,
                max_rounds: self.config.max_rounds(),
                round_cap_hit: rounds_executed == self.config.max_rounds(),
            },
        }
    }

    /// Returns the forecaster action the rest of the round should use,
    /// along with the individual pre-aggregation actions that produced it —
    /// the caller needs those to attribute reward per-contributor rather
    /// than to the aggregator's own name.
    fn forecaster_action(&self, state: &ForecastState) -> (AgentAction, Vec<AgentAction>) {
        let mut actions = Vec::new();
        for agent in &self.registry.forecasters {
            actions.push(self.executor.execute(&agent.name, || agent.act(state, self.runtime.as_ref())));
        }
        for agent in &self.registry.bottom_up {
            actions.push(self.executor.execute(&agent.name, || agent.act(state, self.runtime.as_ref())));
        }
        for agent in &self.registry.top_down {
            actions.push(self.executor.execute(&agent.name, || agent.act(state)));
        }

        if actions.len() > 1 {
            let reward_history: FrozenMap<f64> = self
                .cumulative_reward
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            let aggregated = self.registry.aggregator.aggregate(&actions, Some(&reward_history));
            (aggregated, actions)
        } else if let Some(single) = actions.into_iter().next() {
            (single.clone(), vec![single])
        } else {
            (AgentAction::new("forecaster", 0.0), Vec::new())
        }
    }

    fn adversary_action(&self, state: &ForecastState, disturbed: bool) -> AgentAction {
        if !disturbed {
            return AgentAction::new("adversary", 0.0);
        }
        let actions: Vec<AgentAction> = self
            .registry
            .adversaries
            .iter()
            .map(|agent| self.executor.execute(&agent.name, || agent.act(state)))
            .collect();
        average_action(&actions, "adversary")
    }

    fn defender_action(&self, f_action: &AgentAction, a_action: &AgentAction) -> AgentAction {
        let actions: Vec<AgentAction> = self
            .registry
            .defenders
            .iter()
            .map(|agent| {
                self.executor
                    .execute(&agent.name, || agent.act(f_action, a_action, self.config.defense_model()))
            })
            .collect();
        average_action(&actions, "defender")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{
        AdversaryAgent, AggregationMode, BottomUpAgent, DefenderAgent, EnsembleAggregatorAgent, ForecastingAgent,
        RefactoringAgent,
    };
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
    fn negative_rounds_yields_zero_rounds() {
        let config = SimulationConfigBuilder::default().build().unwrap();
        let mut game = ForecastGame::new(config, 1, registry());
        let outputs = game.run(ForecastState::new(0, 0.0, 0.0, 0.0), Some(-5), true);
        assert_eq!(outputs.steps.len(), 0);
        assert!(!outputs.convergence.round_cap_hit);
    }

    #[test]
    fn same_seed_reproduces_same_trajectory() {
        let config = SimulationConfigBuilder::default().horizon(10).build().unwrap();
        let mut a = ForecastGame::new(config.clone(), 42, registry());
        let mut b = ForecastGame::new(config, 42, registry());
        let out_a = a.run(ForecastState::new(0, 1.0, 0.0, 0.0), None, true);
        let out_b = b.run(ForecastState::new(0, 1.0, 0.0, 0.0), None, true);
        assert_eq!(out_a.forecasts, out_b.forecasts);
        assert_eq!(out_a.targets, out_b.targets);
    }

    #[test]
    fn round_cap_hit_when_horizon_reaches_max_rounds() {
        let config = SimulationConfigBuilder::default().horizon(5).max_rounds(5).build().unwrap();
        let mut game = ForecastGame::new(config, 3, registry());
        let outputs = game.run(ForecastState::new(0, 0.0, 0.0, 0.0), None, true);
        assert_eq!(outputs.steps.len(), 5);
        assert!(outputs.convergence.round_cap_hit);
    }

    #[test]
    fn undisturbed_run_uses_zero_disturbance() {
        let config = SimulationConfigBuilder::default()
            .horizon(3)
            .disturbance_prob(1.0)
            .build()
            .unwrap();
        let mut game = ForecastGame::new(config, 9, registry());
        let outputs = game.run(ForecastState::new(0, 0.0, 0.0, 0.0), None, false);
        for ci in &outputs.confidence {
            assert!((ci.upper() - ci.lower() - 0.4).abs() < 1e-9);
        }
    }

    #[test]
    fn logs_mirror_trajectory_primitives() {
        let config = SimulationConfigBuilder::default().horizon(3).build().unwrap();
        let mut game = ForecastGame::new(config, 5, registry());
        let outputs = game.run(ForecastState::new(0, 10.0, 0.0, 0.0), None, true);

        assert_eq!(outputs.logs.len(), outputs.steps.len());
        for ((log, traj), ci) in outputs.logs.iter().zip(outputs.trajectories.iter()).zip(outputs.confidence.iter()) {
            assert_eq!(log.round_idx(), traj.round_idx());
            assert_eq!(log.t(), traj.state().t());
            assert_eq!(log.forecast(), traj.forecast());
            assert_eq!(log.target(), traj.target());
            assert_eq!(log.messages().len(), 3);
            assert_eq!(log.actions().len(), traj.actions().len());
            assert!((log.reward() - -(log.target() - log.forecast()).abs()).abs() < 1e-12);
            assert!(log.disturbance().abs() <= ci.upper() - ci.lower());
        }
    }

    #[test]
    fn reward_proportional_history_is_keyed_by_individual_forecaster_actor() {
        let config = SimulationConfigBuilder::default().horizon(6).build().unwrap();
        let mut registry = registry();
        registry.forecasters = vec![ForecastingAgent::new("forecaster-a")];
        registry.bottom_up = vec![BottomUpAgent::new("forecaster-b", 0.5)];
        registry.aggregator = EnsembleAggregatorAgent::new("aggregator", AggregationMode::RewardProportional);

        let mut game = ForecastGame::new(config, 7, registry);
        let outputs = game.run(ForecastState::new(0, 10.0, 0.0, 0.0), None, true);

        assert_eq!(outputs.steps.len(), 6);
        assert!(game.cumulative_reward.contains_key("forecaster-a"));
        assert!(game.cumulative_reward.contains_key("forecaster-b"));
        assert!(!game.cumulative_reward.contains_key("aggregator"));
    }
}
