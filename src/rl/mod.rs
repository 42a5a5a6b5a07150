//! Tabular multi-agent reinforcement learning substrate (spec.md §4.12-4.13).

pub mod action_space;
pub mod q_table;
pub mod training;
pub mod wolf_phc;

pub use action_space::DiscreteActionSpace;
pub use q_table::{state_hash, QTableAgent, QTableSnapshot, STATE_BUCKETS};
pub use training::{IterativeFeedbackLoop, RADversarialTrainer, TrainingSummary};
pub use wolf_phc::WoLFPHCAgent;
