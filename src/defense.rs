//! Defense registry (spec.md §4.5).
//!
//! A defense takes the forecaster's and adversary's raw deltas for the round
//! and returns a corrective delta. Grounded in `original_source/framework/
//! defenses.py`'s `DampeningDefense`/`ClippingDefense`/`BiasGuardDefense`/
//! `EnsembleDefense`/`StackedDefense`.

pub trait Defense: Send + Sync {
    fn defend(&self, forecast_delta: f64, adversary_delta: f64) -> f64;
}

pub struct DampeningDefense {
    pub dampening: f64,
}

impl Default for DampeningDefense {
    fn default() -> Self {
        Self { dampening: 0.6 }
    }
}

impl Defense for DampeningDefense {
    fn defend(&self, forecast_delta: f64, adversary_delta: f64) -> f64 {
        let mut correction = -(adversary_delta * self.dampening);
        correction -= 0.1 * forecast_delta.clamp(-1.0, 1.0);
        correction
    }
}

pub struct ClippingDefense {
    pub clip: f64,
}

impl Default for ClippingDefense {
    fn default() -> Self {
        Self { clip: 0.2 }
    }
}

impl Defense for ClippingDefense {
    fn defend(&self, _forecast_delta: f64, adversary_delta: f64) -> f64 {
        (-adversary_delta).clamp(-self.clip, self.clip)
    }
}

pub struct BiasGuardDefense {
    pub max_bias: f64,
}

impl Default for BiasGuardDefense {
    fn default() -> Self {
        Self { max_bias: 0.12 }
    }
}

impl Defense for BiasGuardDefense {
    fn defend(&self, _forecast_delta: f64, adversary_delta: f64) -> f64 {
        if adversary_delta.abs() < self.max_bias {
            -adversary_delta
        } else if adversary_delta > 0.0 {
            -self.max_bias
        } else {
            self.max_bias
        }
    }
}

pub struct EnsembleDefense {
    dampening: DampeningDefense,
    clipping: ClippingDefense,
    bias_guard: BiasGuardDefense,
}

impl Default for EnsembleDefense {
    fn default() -> Self {
        Self {
            dampening: DampeningDefense::default(),
            clipping: ClippingDefense { clip: 0.25 },
            bias_guard: BiasGuardDefense::default(),
        }
    }
}

impl Defense for EnsembleDefense {
    fn defend(&self, forecast_delta: f64, adversary_delta: f64) -> f64 {
        let damp = self.dampening.defend(forecast_delta, adversary_delta);
        let clip = self.clipping.defend(forecast_delta, adversary_delta);
        let bias = self.bias_guard.defend(forecast_delta, adversary_delta);
        (damp + clip + bias) / 3.0
    }
}

/// Chains two defenses: the second sees the first's correction folded into
/// both input deltas.
pub struct StackedDefense {
    first: Box<dyn Defense>,
    second: Box<dyn Defense>,
}

impl StackedDefense {
    pub fn new(first: Box<dyn Defense>, second: Box<dyn Defense>) -> Self {
        Self { first, second }
    }
}

impl Defense for StackedDefense {
    fn defend(&self, forecast_delta: f64, adversary_delta: f64) -> f64 {
        let first_out = self.first.defend(forecast_delta, adversary_delta);
        self.second
            .defend(forecast_delta + first_out, adversary_delta + first_out)
    }
}

/// Resolve a named defense model. Supports `stack:a,b` to compose two
/// defenses (extra comma-separated parts beyond the first two are ignored,
/// matching the two-stage `StackedDefense` shape). Unknown names resolve to
/// `DampeningDefense` with a warning.
pub fn defense_from_name(name: &str) -> Box<dyn Defense> {
    let normalized = name.trim().to_lowercase();
    if let Some(models) = normalized.strip_prefix("stack:") {
        let parts: Vec<&str> = models.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 {
            return Box::new(StackedDefense::new(
                defense_from_name(parts[0]),
                defense_from_name(parts[1]),
            ));
        }
    }
    match normalized.as_str() {
        "dampening" | "default" => Box::new(DampeningDefense::default()),
        "clipping" | "clip" => Box::new(ClippingDefense::default()),
        "bias_guard" | "bias" => Box::new(BiasGuardDefense::default()),
        "ensemble" | "filter_ensemble" => Box::new(EnsembleDefense::default()),
        other => {
            tracing::warn!(name = other, "unknown defense model, defaulting to dampening");
            Box::new(DampeningDefense::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dampening_opposes_adversary_and_penalizes_forecast() {
        let d = DampeningDefense::default();
        let correction = d.defend(0.5, 1.0);
        assert!((correction - (-0.6 - 0.05)).abs() < 1e-12);
    }

    #[test]
    fn clipping_respects_bound() {
        let d = ClippingDefense { clip: 0.2 };
        assert_eq!(d.defend(0.0, 10.0), -0.2);
        assert_eq!(d.defend(0.0, -10.0), 0.2);
    }

    #[test]
    fn bias_guard_caps_small_adversary_deltas() {
        let d = BiasGuardDefense::default();
        assert!((d.defend(0.0, 0.05) - (-0.05)).abs() < 1e-12);
        assert_eq!(d.defend(0.0, 5.0), -0.12);
    }

    #[test]
    fn stack_folds_first_correction_into_second_inputs() {
        let stack = defense_from_name("stack:clipping,dampening");
        let result = stack.defend(0.0, 1.0);
        let expected_first = ClippingDefense::default().defend(0.0, 1.0);
        let expected = DampeningDefense::default().defend(expected_first, 1.0 + expected_first);
        assert!((result - expected).abs() < 1e-12);
    }

    #[test]
    fn unknown_name_resolves_to_dampening() {
        let d = defense_from_name("bogus");
        let expected = DampeningDefense::default().defend(0.2, 1.0);
        assert!((d.defend(0.2, 1.0) - expected).abs() < 1e-12);
    }
}
