//! Forecast accuracy and probabilistic calibration metrics.
//!
//! Grounded in `original_source/framework/metrics.py`. `crps`/`pit_score`
//! use `statrs`'s `erf` (the crate is already a teacher dependency, here
//! repurposed for the closed-form Gaussian CRPS rather than its original
//! trading-risk use).

use statrs::function::erf::erf;
use std::f64::consts::PI;

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    actual.iter().zip(predicted).take(n).map(|(a, p)| (a - p).abs()).sum::<f64>() / n as f64
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mse = actual.iter().zip(predicted).take(n).map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n as f64;
    mse.sqrt()
}

pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| (*a, *p))
        .collect();
    if pairs.is_empty() {
        return 0.0;
    }
    100.0 * pairs.iter().map(|(a, p)| ((a - p) / a).abs()).sum::<f64>() / pairs.len() as f64
}

pub fn worst_case_abs_error(actual: &[f64], predicted: &[f64]) -> f64 {
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .fold(0.0, f64::max)
}

pub fn robustness_delta(clean_value: f64, attack_value: f64) -> f64 {
    attack_value - clean_value
}

pub fn robustness_ratio(clean_value: f64, attack_value: f64) -> f64 {
    if clean_value == 0.0 {
        0.0
    } else {
        attack_value / clean_value
    }
}

/// Probability Integral Transform: CDF(actual) under N(mean, std).
pub fn pit_score(actual: f64, forecast_mean: f64, forecast_std: f64) -> f64 {
    if forecast_std <= 0.0 {
        return 0.5;
    }
    let z = (actual - forecast_mean) / forecast_std;
    0.5 * (1.0 + erf(z / 2.0_f64.sqrt()))
}

pub fn pit_scores(actuals: &[f64], means: &[f64], stds: &[f64]) -> Vec<f64> {
    actuals
        .iter()
        .zip(means)
        .zip(stds)
        .map(|((a, m), s)| pit_score(*a, *m, *s))
        .collect()
}

/// Closed-form CRPS for a Gaussian predictive distribution.
pub fn crps(actual: f64, forecast_mean: f64, forecast_std: f64) -> f64 {
    if forecast_std <= 0.0 {
        return (actual - forecast_mean).abs();
    }
    let z = (actual - forecast_mean) / forecast_std;
    let pdf_z = (-0.5 * z * z).exp() / (2.0 * PI).sqrt();
    let cdf_z = 0.5 * (1.0 + erf(z / 2.0_f64.sqrt()));
    forecast_std * (z * (2.0 * cdf_z - 1.0) + 2.0 * pdf_z - 1.0 / PI.sqrt())
}

pub fn mean_crps(actuals: &[f64], means: &[f64], stds: &[f64]) -> f64 {
    let scores: Vec<f64> = actuals
        .iter()
        .zip(means)
        .zip(stds)
        .map(|((a, m), s)| crps(*a, *m, *s))
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Fraction of actuals falling within `[lower, upper]`.
pub fn interval_coverage(actuals: &[f64], lowers: &[f64], uppers: &[f64]) -> f64 {
    let n = actuals.len().min(lowers.len()).min(uppers.len());
    if n == 0 {
        return 0.0;
    }
    let hits = (0..n).filter(|&i| lowers[i] <= actuals[i] && actuals[i] <= uppers[i]).count();
    hits as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mae_rmse_match_hand_computation() {
        let actual = [1.0, 2.0, 3.0];
        let predicted = [1.5, 2.0, 2.0];
        assert!((mae(&actual, &predicted) - (0.5 + 0.0 + 1.0) / 3.0).abs() < 1e-12);
        let expected_rmse = ((0.25 + 0.0 + 1.0) / 3.0_f64).sqrt();
        assert!((rmse(&actual, &predicted) - expected_rmse).abs() < 1e-12);
    }

    #[test]
    fn pit_score_is_half_at_the_mean() {
        assert!((pit_score(5.0, 5.0, 1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn crps_degenerates_to_abs_error_without_spread() {
        assert!((crps(3.0, 1.0, 0.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn interval_coverage_counts_hits() {
        let actuals = [1.0, 5.0, 10.0];
        let lowers = [0.0, 0.0, 0.0];
        let uppers = [2.0, 2.0, 2.0];
        assert!((interval_coverage(&actuals, &lowers, &uppers) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn robustness_delta_and_ratio() {
        assert_eq!(robustness_delta(2.0, 5.0), 3.0);
        assert_eq!(robustness_ratio(2.0, 5.0), 2.5);
        assert_eq!(robustness_ratio(0.0, 5.0), 0.0);
    }
}
