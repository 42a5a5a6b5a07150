//! WoLF-PHC: Win or Learn Fast, Policy Hill Climbing (spec.md §4.12 U.3).
//!
//! Grounded in `original_source/framework/training.py`'s `WoLFPHCAgent`,
//! which extends `QTableAgent` with a per-state policy, average policy, and
//! visit count. Implemented here via composition (an owned [`QTableAgent`])
//! rather than inheritance.

use super::action_space::DiscreteActionSpace;
use super::q_table::{state_hash, QTableAgent, STATE_BUCKETS};
use crate::random::RandomStream;
use crate::types::ForecastState;
use std::collections::BTreeMap;

pub struct WoLFPHCAgent {
    pub q_agent: QTableAgent,
    pub delta_win: f64,
    pub delta_lose: f64,
    policy: BTreeMap<i64, Vec<f64>>,
    avg_policy: BTreeMap<i64, Vec<f64>>,
    visit_count: BTreeMap<i64, u64>,
    rng: RandomStream,
}

impl WoLFPHCAgent {
    pub fn new(action_space: DiscreteActionSpace, seed: u64) -> Self {
        Self {
            q_agent: QTableAgent::new(action_space, seed),
            delta_win: 0.01,
            delta_lose: 0.04,
            policy: BTreeMap::new(),
            avg_policy: BTreeMap::new(),
            visit_count: BTreeMap::new(),
            rng: RandomStream::new(seed.wrapping_add(1)),
        }
    }

    fn ensure_policy(&mut self, key: i64) {
        if !self.policy.contains_key(&key) {
            let n = self.q_agent.action_space.n_bins;
            let uniform = vec![1.0 / n as f64; n];
            self.policy.insert(key, uniform.clone());
            self.avg_policy.insert(key, uniform);
            self.visit_count.insert(key, 0);
        }
    }

    pub fn act(&mut self, state: &ForecastState) -> usize {
        let key = state_hash(state, STATE_BUCKETS);
        self.ensure_policy(key);
        if self.rng.next_unit() < self.q_agent.epsilon {
            return self.rng.next_int(0, self.q_agent.action_space.n_bins as i64 - 1) as usize;
        }
        let pi = self.policy.get(&key).unwrap();
        self.rng.weighted_choice(pi)
    }

    pub fn update(&mut self, state: &ForecastState, action: usize, reward: f64, next_state: &ForecastState) -> f64 {
        let td_error = self.q_agent.update(state, action, reward, next_state);

        let key = state_hash(state, STATE_BUCKETS);
        self.ensure_policy(key);

        let visit = self.visit_count.entry(key).or_insert(0);
        *visit += 1;
        let c = *visit as f64;

        let q = self.q_agent.row_ref(key);
        let n = q.len();

        let pi = self.policy.get_mut(&key).unwrap();
        let expected_q_pi: f64 = pi.iter().zip(&q).map(|(p, qv)| p * qv).sum();

        {
            let avg_pi = self.avg_policy.get_mut(&key).unwrap();
            for i in 0..n {
                avg_pi[i] += (pi[i] - avg_pi[i]) / c;
            }
        }
        let avg_pi = self.avg_policy.get(&key).unwrap();
        let expected_q_avg: f64 = avg_pi.iter().zip(&q).map(|(p, qv)| p * qv).sum();

        let delta = if expected_q_pi >= expected_q_avg {
            self.delta_win
        } else {
            self.delta_lose
        };

        let best_action = q
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
            .0;

        let pi = self.policy.get_mut(&key).unwrap();
        for a in 0..n {
            if a == best_action {
                pi[a] = (pi[a] + delta).min(1.0);
            } else {
                pi[a] = (pi[a] - delta / (n.saturating_sub(1)).max(1) as f64).max(0.0);
            }
        }
        let total: f64 = pi.iter().sum();
        if total > 0.0 {
            for v in pi.iter_mut() {
                *v /= total;
            }
        }

        td_error
    }
}
