//! Episodic, robust-adversarial, and iterative-feedback training loops
//! (spec.md §4.13).
//!
//! Grounded in `original_source/framework/training.py`'s `TrainingLoop`,
//! `RADversarialTrainer`, and `IterativeFeedbackLoop`.

use super::q_table::QTableAgent;
use super::wolf_phc::WoLFPHCAgent;
use crate::agents::AgentRegistry;
use crate::engine::ForecastGame;
use crate::types::{ForecastState, SimulationConfig};

/// Common interface over [`QTableAgent`] and [`WoLFPHCAgent`] so the
/// training loops below don't need to know which tabular policy they drive.
pub trait TabularPolicy {
    fn act(&mut self, state: &ForecastState) -> usize;
    fn update(&mut self, state: &ForecastState, action: usize, reward: f64, next_state: &ForecastState) -> f64;
    fn epsilon(&self) -> f64;
}

impl TabularPolicy for QTableAgent {
    fn act(&mut self, state: &ForecastState) -> usize {
        QTableAgent::act(self, state)
    }
    fn update(&mut self, state: &ForecastState, action: usize, reward: f64, next_state: &ForecastState) -> f64 {
        QTableAgent::update(self, state, action, reward, next_state)
    }
    fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl TabularPolicy for WoLFPHCAgent {
    fn act(&mut self, state: &ForecastState) -> usize {
        WoLFPHCAgent::act(self, state)
    }
    fn update(&mut self, state: &ForecastState, action: usize, reward: f64, next_state: &ForecastState) -> f64 {
        WoLFPHCAgent::update(self, state, action, reward, next_state)
    }
    fn epsilon(&self) -> f64 {
        self.q_agent.epsilon
    }
}

fn next_from_trajectory(state: &ForecastState, target: f64) -> ForecastState {
    ForecastState::new(state.t() + 1, target, state.exogenous(), state.hidden_shift())
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub n_episodes: usize,
    pub final_epsilon: f64,
    pub mean_reward_last_50: f64,
    pub mean_td_error_last_100: f64,
    pub rewards_history: Vec<f64>,
}

pub struct TrainingLoop {
    config: SimulationConfig,
    n_episodes: usize,
    seed: u64,
}

impl TrainingLoop {
    pub fn new(config: SimulationConfig, n_episodes: usize, seed: u64) -> Self {
        Self {
            config,
            n_episodes,
            seed,
        }
    }

    pub fn train<F, A, R>(
        &self,
        forecaster: &mut F,
        mut adversary: Option<&mut A>,
        init_state: ForecastState,
        make_registry: R,
    ) -> TrainingSummary
    where
        F: TabularPolicy,
        A: TabularPolicy,
        R: Fn() -> AgentRegistry,
    {
        let mut rewards_history = Vec::with_capacity(self.n_episodes);
        let mut td_errors = Vec::new();

        for ep in 0..self.n_episodes {
            let mut game = ForecastGame::new(self.config.clone(), self.seed + ep as u64, make_registry());
            let out = game.run(init_state.clone(), None, true);

            let mut episode_reward = 0.0;
            for traj in &out.trajectories {
                let s = traj.state().clone();
                let reward = traj.reward_breakdown().get("forecaster").copied().unwrap_or(0.0);
                let ns = next_from_trajectory(&s, traj.target());

                let action_idx = forecaster.act(&s);
                let td = forecaster.update(&s, action_idx, reward, &ns);
                td_errors.push(td.abs());

                if let Some(adv) = adversary.as_deref_mut() {
                    let adv_reward = traj.reward_breakdown().get("adversary").copied().unwrap_or(-reward);
                    let a_idx = adv.act(&s);
                    adv.update(&s, a_idx, adv_reward, &ns);
                }

                episode_reward += reward;
            }

            rewards_history.push(episode_reward / out.trajectories.len().max(1) as f64);
        }

        let window = rewards_history.len().min(50);
        let mean_reward_last_50 = if window == 0 {
            0.0
        } else {
            rewards_history[rewards_history.len() - window..].iter().sum::<f64>() / window as f64
        };

        let td_window = td_errors.len().min(100);
        let mean_td_error_last_100 = if td_window == 0 {
            0.0
        } else {
            td_errors[td_errors.len() - td_window..].iter().sum::<f64>() / td_window as f64
        };

        TrainingSummary {
            n_episodes: self.n_episodes,
            final_epsilon: forecaster.epsilon(),
            mean_reward_last_50,
            mean_td_error_last_100,
            rewards_history,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochResult {
    pub epoch: usize,
    pub training: String,
    pub mean_reward: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobustTrainingSummary {
    pub total_epochs: usize,
    pub alternation_schedule: usize,
    pub epoch_results: Vec<EpochResult>,
}

/// Alternating adversary/forecaster training for minimax robustness.
pub struct RADversarialTrainer {
    config: SimulationConfig,
    alternation_schedule: usize,
    total_epochs: usize,
    seed: u64,
}

impl RADversarialTrainer {
    pub fn new(config: SimulationConfig, alternation_schedule: usize, total_epochs: usize, seed: u64) -> Self {
        Self {
            config,
            alternation_schedule,
            total_epochs,
            seed,
        }
    }

    pub fn train<F, A, R>(
        &self,
        forecaster: &mut F,
        adversary: &mut A,
        init_state: ForecastState,
        make_registry: R,
    ) -> RobustTrainingSummary
    where
        F: TabularPolicy,
        A: TabularPolicy,
        R: Fn() -> AgentRegistry,
    {
        let mut epoch_results = Vec::with_capacity(self.total_epochs);
        let schedule = self.alternation_schedule.max(1);

        for epoch in 0..self.total_epochs {
            let train_forecaster = (epoch / schedule).is_multiple_of(2);
            let mut game = ForecastGame::new(self.config.clone(), self.seed + epoch as u64, make_registry());
            let out = game.run(init_state.clone(), None, true);

            let mut reward_sum = 0.0;
            for traj in &out.trajectories {
                let s = traj.state().clone();
                let reward = traj.reward_breakdown().get("forecaster").copied().unwrap_or(0.0);
                let ns = next_from_trajectory(&s, traj.target());

                if train_forecaster {
                    let idx = forecaster.act(&s);
                    forecaster.update(&s, idx, reward, &ns);
                } else {
                    let idx = adversary.act(&s);
                    adversary.update(&s, idx, -reward, &ns);
                }
                reward_sum += reward;
            }

            epoch_results.push(EpochResult {
                epoch,
                training: if train_forecaster { "forecaster".to_string() } else { "adversary".to_string() },
                mean_reward: reward_sum / out.trajectories.len().max(1) as f64,
            });
        }

        RobustTrainingSummary {
            total_epochs: self.total_epochs,
            alternation_schedule: self.alternation_schedule,
            epoch_results,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSummary {
    pub n_updates: usize,
    pub total_td_magnitude: f64,
}

/// Updates an agent's Q-table directly from realized `(state, forecast,
/// realized)` triples, outside of a live game run — e.g. from backtest
/// windows.
#[derive(Default)]
pub struct IterativeFeedbackLoop;

impl IterativeFeedbackLoop {
    pub fn update_from_realized<P: TabularPolicy>(
        &self,
        agent: &mut P,
        realized_pairs: &[(ForecastState, f64, f64)],
    ) -> FeedbackSummary {
        let mut total_update = 0.0;
        for (state, forecast, realized) in realized_pairs {
            let reward = -(realized - forecast).abs();
            let action_idx = agent.act(state);
            let ns = ForecastState::new(state.t() + 1, *realized, state.exogenous(), state.hidden_shift());
            let td = agent.update(state, action_idx, reward, &ns);
            total_update += td.abs();
        }
        FeedbackSummary {
            n_updates: realized_pairs.len(),
            total_td_magnitude: total_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AdversaryAgent, DefenderAgent, ForecastingAgent, RefactoringAgent};
    use crate::rl::action_space::DiscreteActionSpace;
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
    fn training_loop_produces_one_reward_per_episode() {
        let config = SimulationConfigBuilder::default().horizon(5).build().unwrap();
        let loop_ = TrainingLoop::new(config, 3, 1);
        let mut forecaster = QTableAgent::new(DiscreteActionSpace::default(), 1);
        let summary = loop_.train::<_, QTableAgent, _>(
            &mut forecaster,
            None,
            ForecastState::new(0, 10.0, 0.0, 0.0),
            registry,
        );
        assert_eq!(summary.rewards_history.len(), 3);
        assert_eq!(summary.n_episodes, 3);
    }

    #[test]
    fn adversarial_trainer_alternates_who_updates() {
        let config = SimulationConfigBuilder::default().horizon(4).build().unwrap();
        let trainer = RADversarialTrainer::new(config, 1, 4, 1);
        let mut forecaster = QTableAgent::new(DiscreteActionSpace::default(), 1);
        let mut adversary = QTableAgent::new(DiscreteActionSpace::default(), 2);
        let summary = trainer.train(&mut forecaster, &mut adversary, ForecastState::new(0, 10.0, 0.0, 0.0), registry);
        assert_eq!(summary.epoch_results.len(), 4);
        assert_eq!(summary.epoch_results[0].training, "forecaster");
        assert_eq!(summary.epoch_results[1].training, "adversary");
    }

    #[test]
    fn iterative_feedback_updates_from_realized_triples() {
        let mut agent = QTableAgent::new(DiscreteActionSpace::default(), 1);
        let loop_ = IterativeFeedbackLoop;
        let pairs = vec![
            (ForecastState::new(0, 1.0, 0.0, 0.0), 1.2, 1.5),
            (ForecastState::new(1, 1.5, 0.0, 0.0), 1.6, 1.4),
        ];
        let summary = loop_.update_from_realized(&mut agent, &pairs);
        assert_eq!(summary.n_updates, 2);
        assert!(summary.total_td_magnitude >= 0.0);
    }
}
