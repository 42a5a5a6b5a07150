//! Tabular Q-learning agent (spec.md §4.12 U.2).
//!
//! Grounded in `original_source/framework/training.py`'s `QTableAgent` and
//! its module-level `_state_hash`. The state hash buckets a continuous
//! `(value, exogenous)` pair into `B*B` discrete cells; `B=50` per spec.md.

use super::action_space::DiscreteActionSpace;
use crate::random::RandomStream;
use crate::types::ForecastState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATE_BUCKETS: i64 = 50;

/// `v_bucket = int((value mod 100)/2) mod B; e_bucket = int((exogenous+5)*5) mod B`.
pub fn state_hash(state: &ForecastState, buckets: i64) -> i64 {
    let v_raw = (state.value().rem_euclid(100.0) / 2.0).trunc() as i64;
    let v_bucket = v_raw.rem_euclid(buckets);
    let e_raw = ((state.exogenous() + 5.0) * 5.0).trunc() as i64;
    let e_bucket = e_raw.rem_euclid(buckets);
    v_bucket * buckets + e_bucket
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QTableSnapshot {
    pub q_table: BTreeMap<String, Vec<f64>>,
    pub epsilon: f64,
    pub n_bins: usize,
    pub max_delta: f64,
}

pub struct QTableAgent {
    pub action_space: DiscreteActionSpace,
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon: f64,
    pub epsilon_decay: f64,
    pub epsilon_min: f64,
    q_table: BTreeMap<i64, Vec<f64>>,
    rng: RandomStream,
}

impl QTableAgent {
    pub fn new(action_space: DiscreteActionSpace, seed: u64) -> Self {
        Self {
            action_space,
            alpha: 0.1,
            gamma: 0.95,
            epsilon: 1.0,
            epsilon_decay: 0.995,
            epsilon_min: 0.05,
            q_table: BTreeMap::new(),
            rng: RandomStream::new(seed),
        }
    }

    fn row(&mut self, key: i64) -> &mut Vec<f64> {
        self.q_table.entry(key).or_insert_with(|| vec![0.0; self.action_space.n_bins])
    }

    pub(crate) fn row_ref(&self, key: i64) -> Vec<f64> {
        self.q_table.get(&key).cloned().unwrap_or_else(|| vec![0.0; self.action_space.n_bins])
    }

    fn argmax(row: &[f64]) -> usize {
        row.iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
            .0
    }

    pub fn act(&mut self, state: &ForecastState) -> usize {
        let key = state_hash(state, STATE_BUCKETS);
        if self.rng.next_unit() < self.epsilon {
            return self.rng.next_int(0, self.action_space.n_bins as i64 - 1) as usize;
        }
        let row = self.row(key).clone();
        Self::argmax(&row)
    }

    pub fn update(&mut self, state: &ForecastState, action: usize, reward: f64, next_state: &ForecastState) -> f64 {
        let key = state_hash(state, STATE_BUCKETS);
        let next_key = state_hash(next_state, STATE_BUCKETS);
        let next_max = self.row_ref(next_key).iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let gamma = self.gamma;
        let alpha = self.alpha;
        let row = self.row(key);
        let td_error = reward + gamma * next_max - row[action];
        row[action] += alpha * td_error;

        self.epsilon = self.epsilon_min.max(self.epsilon * self.epsilon_decay);
        td_error
    }

    pub fn to_snapshot(&self) -> QTableSnapshot {
        QTableSnapshot {
            q_table: self.q_table.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            epsilon: self.epsilon,
            n_bins: self.action_space.n_bins,
            max_delta: self.action_space.max_delta,
        }
    }

    pub fn from_snapshot(snapshot: QTableSnapshot, seed: u64) -> Self {
        let mut agent = Self::new(DiscreteActionSpace::new(snapshot.n_bins, snapshot.max_delta), seed);
        agent.epsilon = snapshot.epsilon;
        for (k, v) in snapshot.q_table {
            if let Ok(key) = k.parse::<i64>() {
                agent.q_table.insert(key, v);
            }
        }
        agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_hash_is_within_bucket_range() {
        let state = ForecastState::new(0, 1234.5, -3.2, 0.0);
        let key = state_hash(&state, STATE_BUCKETS);
        assert!((0..STATE_BUCKETS * STATE_BUCKETS).contains(&key));
    }

    #[test]
    fn negative_value_hashes_without_panicking() {
        let state = ForecastState::new(0, -50.0, -10.0, 0.0);
        let key = state_hash(&state, STATE_BUCKETS);
        assert!(key >= 0);
    }

    #[test]
    fn update_moves_q_toward_target() {
        let mut agent = QTableAgent::new(DiscreteActionSpace::default(), 1);
        agent.epsilon = 0.0;
        let s = ForecastState::new(0, 1.0, 0.0, 0.0);
        let ns = ForecastState::new(1, 1.0, 0.0, 0.0);
        let td1 = agent.update(&s, 5, 1.0, &ns);
        assert!(td1.abs() > 0.0);
        let td2 = agent.update(&s, 5, 1.0, &ns);
        assert!(td2.abs() < td1.abs());
    }

    #[test]
    fn snapshot_round_trips() {
        let mut agent = QTableAgent::new(DiscreteActionSpace::default(), 1);
        let s = ForecastState::new(0, 1.0, 0.0, 0.0);
        let ns = ForecastState::new(1, 2.0, 0.0, 0.0);
        agent.update(&s, 3, 0.5, &ns);
        let snapshot = agent.to_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: QTableSnapshot = serde_json::from_str(&json).unwrap();
        let restored_agent = QTableAgent::from_snapshot(restored, 1);
        assert_eq!(restored_agent.row_ref(state_hash(&s, STATE_BUCKETS))[3], agent.row_ref(state_hash(&s, STATE_BUCKETS))[3]);
    }
}
