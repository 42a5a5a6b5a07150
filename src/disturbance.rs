//! Disturbance registry (spec.md §4.4).
//!
//! Each disturbance produces a scalar given `(state, random stream,
//! config)`. Every variant performs its probability gate first — a single
//! `next_unit()` draw — before any further sampling, so seed compatibility
//! holds across variants that never sample further. Grounded in the
//! original `GaussianDisturbance`/`ShiftDisturbance`/`EvasionDisturbance`
//! (`original_source/framework/disturbances.py`), extended per spec.md with
//! `VolatilityScaled`, `RegimeShift`, `VolatilityBurst`, and `Drift`.

use crate::random::RandomStream;
use crate::types::{ForecastState, SimulationConfig};

pub trait Disturbance: Send + Sync {
    fn sample(&self, state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64;
}

fn gate(rng: &mut RandomStream, prob: f64) -> bool {
    rng.next_unit() <= prob
}

pub struct GaussianDisturbance;

impl Disturbance for GaussianDisturbance {
    fn sample(&self, _state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64 {
        if gate(rng, config.disturbance_prob()) {
            rng.next_gauss(0.0, config.disturbance_scale() * config.adversarial_intensity())
        } else {
            0.0
        }
    }
}

pub struct ShiftDisturbance {
    pub shift: f64,
}

impl Default for ShiftDisturbance {
    fn default() -> Self {
        Self { shift: 0.35 }
    }
}

impl Disturbance for ShiftDisturbance {
    fn sample(&self, _state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64 {
        if gate(rng, config.disturbance_prob()) {
            self.shift * config.adversarial_intensity()
        } else {
            0.0
        }
    }
}

pub struct EvasionDisturbance {
    pub factor: f64,
}

impl Default for EvasionDisturbance {
    fn default() -> Self {
        Self { factor: 0.2 }
    }
}

impl Disturbance for EvasionDisturbance {
    fn sample(&self, state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64 {
        if gate(rng, config.disturbance_prob()) {
            let sign = if state.value() >= 0.0 { 1.0 } else { -1.0 };
            sign * config.disturbance_scale() * self.factor * config.adversarial_intensity()
        } else {
            0.0
        }
    }
}

pub struct VolatilityScaledDisturbance {
    pub min_scale: f64,
}

impl Default for VolatilityScaledDisturbance {
    fn default() -> Self {
        Self { min_scale: 0.05 }
    }
}

impl Disturbance for VolatilityScaledDisturbance {
    fn sample(&self, state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64 {
        if gate(rng, config.disturbance_prob()) {
            let vol = (state.hidden_shift().abs() + state.exogenous().abs()).max(self.min_scale);
            rng.next_gauss(0.0, config.disturbance_scale() * config.adversarial_intensity() * vol)
        } else {
            0.0
        }
    }
}

pub struct RegimeShiftDisturbance {
    pub period: i64,
    pub jump: f64,
}

impl Default for RegimeShiftDisturbance {
    fn default() -> Self {
        Self { period: 25, jump: 0.5 }
    }
}

impl Disturbance for RegimeShiftDisturbance {
    fn sample(&self, state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64 {
        let gated = gate(rng, config.disturbance_prob());
        if gated && self.period > 0 && state.t() % self.period == 0 {
            let sign = if (state.t() / self.period) % 2 == 0 { 1.0 } else { -1.0 };
            sign * self.jump * config.adversarial_intensity()
        } else {
            0.0
        }
    }
}

pub struct VolatilityBurstDisturbance {
    pub burst_multiplier: f64,
}

impl Default for VolatilityBurstDisturbance {
    fn default() -> Self {
        Self { burst_multiplier: 3.0 }
    }
}

impl Disturbance for VolatilityBurstDisturbance {
    fn sample(&self, _state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64 {
        if gate(rng, config.disturbance_prob()) {
            rng.next_gauss(
                0.0,
                config.disturbance_scale() * config.adversarial_intensity() * self.burst_multiplier,
            )
        } else {
            0.0
        }
    }
}

pub struct DriftDisturbance {
    pub step_scale: f64,
}

impl Default for DriftDisturbance {
    fn default() -> Self {
        Self { step_scale: 0.01 }
    }
}

impl Disturbance for DriftDisturbance {
    fn sample(&self, state: &ForecastState, rng: &mut RandomStream, config: &SimulationConfig) -> f64 {
        if gate(rng, config.disturbance_prob()) {
            let sign = if state.exogenous() >= 0.0 { 1.0 } else { -1.0 };
            sign * self.step_scale * (state.t() as f64 + 1.0) * config.adversarial_intensity()
        } else {
            0.0
        }
    }
}

/// Resolve a named disturbance model. Unknown names resolve to
/// `GaussianDisturbance` with a warning.
pub fn disturbance_from_name(name: &str) -> Box<dyn Disturbance> {
    match name.trim().to_lowercase().as_str() {
        "gaussian" | "default" => Box::new(GaussianDisturbance),
        "shift" => Box::new(ShiftDisturbance::default()),
        "evasion" | "evasion_like" => Box::new(EvasionDisturbance::default()),
        "volatility_scaled" => Box::new(VolatilityScaledDisturbance::default()),
        "regime_shift" => Box::new(RegimeShiftDisturbance::default()),
        "volatility_burst" => Box::new(VolatilityBurstDisturbance::default()),
        "drift" => Box::new(DriftDisturbance::default()),
        other => {
            tracing::warn!(name = other, "unknown disturbance model, defaulting to gaussian");
            Box::new(GaussianDisturbance)
        }
    }
}
