//! Adversarial multi-agent forecasting simulator.
//!
//! A Markov game engine where forecasting, adversary, defender, and
//! refactor agents interact round by round over a latent demand process,
//! plus the surrounding ambient stack: walk-forward backtesting, Monte
//! Carlo scenario fans, tabular multi-agent RL training, Bayesian
//! aggregation, and data-contract validation.

pub mod aggregation;
pub mod agents;
pub mod backtest;
pub mod data;
pub mod defense;
pub mod disturbance;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod random;
pub mod rl;
pub mod safe_executor;
pub mod scenario;
pub mod strategy;
pub mod types;

pub use agents::{AgentRegistry, EnsembleAggregatorAgent};
pub use engine::{ForecastGame, GameOutputs};
pub use error::{EngineError, EngineResult};
pub use random::RandomStream;
pub use types::{AgentAction, ForecastState, RoundLog, SimulationConfig, SimulationConfigBuilder};
