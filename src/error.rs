//! Crate-level error taxonomy.
//!
//! Follows the teacher's plain-enum error style (see
//! `MarketRegistryError` in the teacher's `backtest_v2/market_registry.rs`):
//! a `#[derive(Debug, Clone)]` enum with a hand-written `Display` impl and
//! an empty `impl std::error::Error`. No `thiserror` dependency.
//!
//! `InternalAgentFault` and `RoundTimeout` are intentionally not variants
//! here: per the round-loop contract they are absorbed (agent faults become
//! a fallback action) or cause a clean early truncation, never a run-level
//! error.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A `SimulationConfig` field was out of its valid range.
    InvalidConfig { field: String, reason: String },
    /// An input row was missing a required field or had an unparseable value.
    InvalidSchema { reason: String },
    /// Timestamps within a series were not in non-decreasing order.
    InvalidOrder { series_id: String, reason: String },
    /// A data-source name had no registered adapter.
    UnknownSource { source: String },
    /// Strict poisoning detection rejected the dataset.
    DataPoisoningDetected { suspect_count: usize, total: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid config field '{field}': {reason}")
            }
            Self::InvalidSchema { reason } => write!(f, "invalid row schema: {reason}"),
            Self::InvalidOrder { series_id, reason } => {
                write!(f, "out-of-order rows for series '{series_id}': {reason}")
            }
            Self::UnknownSource { source } => write!(f, "unknown data source: {source}"),
            Self::DataPoisoningDetected {
                suspect_count,
                total,
            } => write!(
                f,
                "data poisoning detected: {suspect_count}/{total} suspect rows"
            ),
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;
