//! Pure data-contract helpers: schema validation, normalization,
//! chronological split, and poisoning detection (spec.md §6, supplemented
//! §3). Deliberately excludes file/network I/O — that is out of scope per
//! spec.md — but the remaining logic is grounded in `original_source/
//! framework/data.py`'s `_validate_rows`/`normalize_features`/
//! `detect_poisoning_rows`/`chronological_split`.

use crate::error::{EngineError, EngineResult};
use std::collections::BTreeMap;

/// A single ingested row. `timestamp` is a monotonic ordinal (callers
/// convert wall-clock instants to this before validation) rather than this
/// crate reaching for a dedicated datetime dependency the teacher doesn't
/// already carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: i64,
    pub series_id: String,
    pub target: f64,
    pub promo: f64,
    pub macro_index: f64,
}

/// Rejects rows that are not already in non-decreasing timestamp order
/// within each series. Callers are expected to ingest pre-sorted feeds;
/// this only confirms the contract, it does not repair violations.
pub fn validate_chronological_order(rows: &[Row]) -> EngineResult<()> {
    if rows.is_empty() {
        return Err(EngineError::InvalidSchema {
            reason: "dataset is empty".to_string(),
        });
    }

    let mut last_per_series: BTreeMap<&str, i64> = BTreeMap::new();
    for row in rows {
        if let Some(&last) = last_per_series.get(row.series_id.as_str()) {
            if row.timestamp < last {
                return Err(EngineError::InvalidOrder {
                    series_id: row.series_id.clone(),
                    reason: format!("timestamp {} precedes prior {}", row.timestamp, last),
                });
            }
        }
        last_per_series.insert(&row.series_id, row.timestamp);
    }

    Ok(())
}

/// Z-scores `promo` and `macro_index` to zero mean, unit sample variance
/// (denominator n-1, clamped >= 1); a zero-variance column normalizes with
/// std=1 instead of dividing by zero.
pub fn normalize_features(rows: &[Row]) -> Vec<Row> {
    fn standardize(values: &[f64]) -> Vec<f64> {
        let n = values.len();
        if n == 0 {
            return Vec::new();
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let denom = (n - 1).max(1) as f64;
        let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / denom;
        let std = if var > 0.0 { var.sqrt() } else { 1.0 };
        values.iter().map(|x| (x - mean) / std).collect()
    }

    let promo_norm = standardize(&rows.iter().map(|r| r.promo).collect::<Vec<_>>());
    let macro_norm = standardize(&rows.iter().map(|r| r.macro_index).collect::<Vec<_>>());

    rows.iter()
        .zip(promo_norm)
        .zip(macro_norm)
        .map(|((row, promo), macro_index)| Row {
            promo,
            macro_index,
            ..row.clone()
        })
        .collect()
}

/// Flags rows whose `target` is an outlier by z-score or modified z-score
/// (median absolute deviation). Returns the indices of suspect rows.
pub fn detect_poisoning_rows(rows: &[Row], z_threshold: f64, mad_threshold: f64) -> Vec<usize> {
    let targets: Vec<f64> = rows.iter().map(|r| r.target).collect();
    if targets.len() < 3 {
        return Vec::new();
    }

    let n = targets.len();
    let mean = targets.iter().sum::<f64>() / n as f64;
    let denom = (n - 1).max(1) as f64;
    let var = targets.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / denom;
    let std = if var > 0.0 { var.sqrt() } else { 1.0 };

    let mut sorted_vals = targets.clone();
    sorted_vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = sorted_vals[sorted_vals.len() / 2];

    let mut abs_dev: Vec<f64> = targets.iter().map(|x| (x - median).abs()).collect();
    abs_dev.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mad_raw = abs_dev[abs_dev.len() / 2];
    let mad = if mad_raw != 0.0 { mad_raw } else { 1.0 };

    targets
        .iter()
        .enumerate()
        .filter_map(|(idx, &target)| {
            let z = ((target - mean) / std).abs();
            let mz = (0.6745 * (target - median) / mad).abs();
            if z >= z_threshold || mz >= mad_threshold {
                Some(idx)
            } else {
                None
            }
        })
        .collect()
}

/// Conservative poisoning-rejection policy: a single suspicious point from
/// an external feed is tolerated, but two or more suspects covering at
/// least 2% of the dataset trips strict rejection.
pub fn should_reject_poisoning(total_rows: usize, suspect_rows: usize) -> bool {
    if suspect_rows == 0 {
        return false;
    }
    suspect_rows >= 2 && (suspect_rows as f64 / total_rows.max(1) as f64) >= 0.02
}

/// Runs poisoning detection and turns a rejection-worthy result into an
/// error, carrying the counts the caller needs to log.
pub fn validate_poisoning(rows: &[Row], z_threshold: f64, mad_threshold: f64) -> EngineResult<()> {
    let suspects = detect_poisoning_rows(rows, z_threshold, mad_threshold);
    if should_reject_poisoning(rows.len(), suspects.len()) {
        return Err(EngineError::DataPoisoningDetected {
            suspect_count: suspects.len(),
            total: rows.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetBundle {
    pub train: Vec<Row>,
    pub valid: Vec<Row>,
    pub test: Vec<Row>,
}

/// Splits pre-ordered rows into train/valid/test without shuffling, so no
/// future row can leak into an earlier split.
pub fn chronological_split(rows: &[Row], train_ratio: f64, valid_ratio: f64) -> EngineResult<DatasetBundle> {
    if !(0.0 < train_ratio && train_ratio < 1.0) {
        return Err(EngineError::InvalidConfig {
            field: "train_ratio".to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }
    if !(0.0..1.0).contains(&valid_ratio) {
        return Err(EngineError::InvalidConfig {
            field: "valid_ratio".to_string(),
            reason: "must be in [0, 1)".to_string(),
        });
    }
    if train_ratio + valid_ratio >= 1.0 {
        return Err(EngineError::InvalidConfig {
            field: "train_ratio + valid_ratio".to_string(),
            reason: "must be < 1".to_string(),
        });
    }

    let n = rows.len();
    let train_end = (n as f64 * train_ratio) as usize;
    let valid_end = train_end + (n as f64 * valid_ratio) as usize;

    Ok(DatasetBundle {
        train: rows[..train_end].to_vec(),
        valid: rows[train_end..valid_end].to_vec(),
        test: rows[valid_end..].to_vec(),
    })
}

/// Takes a `real_weight` share of `real_rows` and fills the remainder up to
/// `min(len(real), len(synthetic))` from `synthetic_rows`, then re-sorts by
/// `(timestamp, series_id)` — used to stretch a thin real dataset with
/// simulator-generated trajectories without ever outnumbering the real data.
pub fn build_hybrid_rows(real_rows: &[Row], synthetic_rows: &[Row], real_weight: f64) -> EngineResult<Vec<Row>> {
    if !(0.0..=1.0).contains(&real_weight) {
        return Err(EngineError::InvalidConfig {
            field: "real_weight".to_string(),
            reason: "must be in [0, 1]".to_string(),
        });
    }

    let n = real_rows.len().min(synthetic_rows.len());
    let take_real = (n as f64 * real_weight) as usize;

    let mut mixed: Vec<Row> = real_rows[..take_real.min(real_rows.len())].to_vec();
    mixed.extend_from_slice(&synthetic_rows[take_real.min(synthetic_rows.len())..n]);
    mixed.sort_by(|a, b| (a.timestamp, a.series_id.as_str()).cmp(&(b.timestamp, b.series_id.as_str())));

    Ok(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(series: &str, ts: i64, target: f64) -> Row {
        Row {
            timestamp: ts,
            series_id: series.to_string(),
            target,
            promo: 0.0,
            macro_index: 100.0,
        }
    }

    #[test]
    fn chronological_validation_rejects_out_of_order_rows() {
        let rows = vec![row("a", 2, 1.0), row("a", 1, 2.0)];
        let err = validate_chronological_order(&rows).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder { .. }));
    }

    #[test]
    fn chronological_validation_accepts_sorted_rows() {
        let rows = vec![row("a", 1, 1.0), row("a", 2, 2.0)];
        assert!(validate_chronological_order(&rows).is_ok());
    }

    #[test]
    fn normalize_features_yields_zero_mean() {
        let rows = vec![
            Row { timestamp: 0, series_id: "a".into(), target: 1.0, promo: 1.0, macro_index: 10.0 },
            Row { timestamp: 1, series_id: "a".into(), target: 2.0, promo: 3.0, macro_index: 20.0 },
            Row { timestamp: 2, series_id: "a".into(), target: 3.0, promo: 5.0, macro_index: 30.0 },
        ];
        let normalized = normalize_features(&rows);
        let mean_promo: f64 = normalized.iter().map(|r| r.promo).sum::<f64>() / normalized.len() as f64;
        assert!(mean_promo.abs() < 1e-9);
    }

    #[test]
    fn detect_poisoning_flags_extreme_outlier() {
        let mut rows: Vec<Row> = (0..20).map(|i| row("a", i, 100.0 + i as f64 * 0.1)).collect();
        rows.push(row("a", 20, 10_000.0));
        let suspects = detect_poisoning_rows(&rows, 6.0, 8.0);
        assert!(suspects.contains(&20));
    }

    #[test]
    fn should_reject_poisoning_tolerates_single_outlier() {
        assert!(!should_reject_poisoning(100, 1));
        assert!(should_reject_poisoning(100, 3));
    }

    #[test]
    fn validate_poisoning_errors_when_threshold_tripped() {
        let mut rows: Vec<Row> = (0..20).map(|i| row("a", i, 100.0)).collect();
        rows.push(row("a", 20, 9_999.0));
        rows.push(row("a", 21, -9_999.0));
        let err = validate_poisoning(&rows, 3.0, 3.0).unwrap_err();
        assert!(matches!(err, EngineError::DataPoisoningDetected { .. }));
    }

    #[test]
    fn chronological_split_respects_ratios() {
        let rows: Vec<Row> = (0..100).map(|i| row("a", i, i as f64)).collect();
        let bundle = chronological_split(&rows, 0.7, 0.15).unwrap();
        assert_eq!(bundle.train.len(), 70);
        assert_eq!(bundle.valid.len(), 15);
        assert_eq!(bundle.test.len(), 15);
    }

    #[test]
    fn chronological_split_rejects_invalid_ratios() {
        let rows: Vec<Row> = (0..10).map(|i| row("a", i, i as f64)).collect();
        assert!(chronological_split(&rows, 0.9, 0.2).is_err());
    }

    #[test]
    fn build_hybrid_rows_caps_at_shorter_input_and_mixes_by_weight() {
        let real: Vec<Row> = (0..10).map(|i| row("real", i, 1.0)).collect();
        let synthetic: Vec<Row> = (0..6).map(|i| row("synthetic", i, 2.0)).collect();
        let mixed = build_hybrid_rows(&real, &synthetic, 0.5).unwrap();
        assert_eq!(mixed.len(), 6);
        assert_eq!(mixed.iter().filter(|r| r.series_id == "real").count(), 3);
        assert_eq!(mixed.iter().filter(|r| r.series_id == "synthetic").count(), 3);
    }

    #[test]
    fn build_hybrid_rows_rejects_out_of_range_weight() {
        let real = vec![row("real", 0, 1.0)];
        let synthetic = vec![row("synthetic", 0, 2.0)];
        assert!(build_hybrid_rows(&real, &synthetic, 1.5).is_err());
    }
}
