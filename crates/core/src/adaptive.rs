//! Adaptive perturbation probabilities.
//!
//! Tracks per-operation attempt/success/improvement statistics during the
//! annealing search and periodically rebalances the probability of picking
//! each operation. Operations that keep producing cost improvements are
//! favored; every operation retains a configurable floor probability so the
//! search never loses access to a move kind entirely.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How strongly fresh statistics pull the probabilities per update.
const LEARNING_RATE: f64 = 0.1;

/// Weight of the raw success rate in the candidate probability; the
/// remainder weights the improvement-scaled score.
const SUCCESS_RATE_WEIGHT: f64 = 0.3;

/// Counter decay applied after each update so recent behavior dominates.
const DECAY: f64 = 0.7;

/// Static description of one perturbation operation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OperatorSpec {
    /// Display label (used in diagnostics).
    pub label: &'static str,
    /// Initial selection probability.
    pub initial_probability: f64,
    /// Minimum probability this operation can decay to.
    pub min_probability: f64,
}

impl OperatorSpec {
    /// Creates a new operator description.
    pub fn new(label: &'static str, initial_probability: f64, min_probability: f64) -> Self {
        Self {
            label,
            initial_probability,
            min_probability,
        }
    }
}

/// Statistics for one operation.
#[derive(Debug, Clone, Default)]
struct OperationStats {
    attempts: f64,
    successes: f64,
    total_improvement: f64,
}

impl OperationStats {
    fn success_rate(&self) -> f64 {
        if self.attempts > 0.0 {
            self.successes / self.attempts
        } else {
            0.0
        }
    }

    fn average_improvement(&self) -> f64 {
        if self.successes > 0.0 {
            self.total_improvement / self.successes
        } else {
            0.0
        }
    }

    fn decay(&mut self) {
        self.attempts = (self.attempts * DECAY).max(1.0);
        self.successes *= DECAY;
        self.total_improvement = self.average_improvement() * self.successes;
    }
}

/// Adaptive selection probabilities over a fixed set of operations.
///
/// The probability vector always sums to 1 and every entry respects its
/// operator's floor. Updates blend the current probabilities with a
/// candidate distribution derived from observed success rates and average
/// cost improvements.
#[derive(Debug, Clone)]
pub struct AdaptivePerturbation {
    specs: Vec<OperatorSpec>,
    stats: Vec<OperationStats>,
    probabilities: Vec<f64>,
}

impl AdaptivePerturbation {
    /// Creates the tracker from an operator table.
    ///
    /// Initial probabilities are normalized to sum to 1.
    pub fn new(specs: Vec<OperatorSpec>) -> Self {
        let sum: f64 = specs.iter().map(|s| s.initial_probability).sum();
        let probabilities = if sum > 0.0 {
            specs.iter().map(|s| s.initial_probability / sum).collect()
        } else {
            vec![1.0 / specs.len().max(1) as f64; specs.len()]
        };
        let stats = vec![OperationStats::default(); specs.len()];
        Self {
            specs,
            stats,
            probabilities,
        }
    }

    /// Number of tracked operations.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if no operations are tracked.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Current selection probabilities, summing to 1.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// The probability of one operation.
    pub fn probability(&self, op: usize) -> f64 {
        self.probabilities[op]
    }

    /// Records that operation `op` was attempted.
    pub fn record_attempt(&mut self, op: usize) {
        self.stats[op].attempts += 1.0;
    }

    /// Records that operation `op` was accepted with a cost decrease.
    pub fn record_success(&mut self, op: usize, improvement: f64) {
        let stat = &mut self.stats[op];
        stat.successes += 1.0;
        stat.total_improvement += improvement.max(0.0);
    }

    /// Rebalances the probabilities from the accumulated statistics.
    ///
    /// No-op when nothing has improved yet: with no signal there is nothing
    /// to learn from, and decaying the counters would only erase the little
    /// evidence collected so far.
    pub fn update_probabilities(&mut self) {
        let n = self.specs.len();
        if n == 0 {
            return;
        }

        let scores: Vec<f64> = self
            .stats
            .iter()
            .map(|s| s.success_rate() * s.average_improvement())
            .collect();
        let rates: Vec<f64> = self.stats.iter().map(|s| s.success_rate()).collect();

        let score_sum: f64 = scores.iter().sum();
        let rate_sum: f64 = rates.iter().sum();
        if score_sum <= 0.0 {
            return;
        }

        // Candidate distribution: blend of normalized success rate and
        // normalized improvement-weighted score, floored per operation.
        let mut candidate: Vec<f64> = (0..n)
            .map(|i| {
                let rate_part = if rate_sum > 0.0 {
                    rates[i] / rate_sum
                } else {
                    0.0
                };
                let score_part = scores[i] / score_sum;
                let p = SUCCESS_RATE_WEIGHT * rate_part + (1.0 - SUCCESS_RATE_WEIGHT) * score_part;
                p.max(self.specs[i].min_probability)
            })
            .collect();
        normalize(&mut candidate);

        for i in 0..n {
            self.probabilities[i] =
                (1.0 - LEARNING_RATE) * self.probabilities[i] + LEARNING_RATE * candidate[i];
        }
        self.apply_floors();

        for stat in &mut self.stats {
            stat.decay();
        }
    }

    /// Renormalizes to sum 1 without pushing any probability below its
    /// floor: floored entries are pinned and the remaining mass is scaled
    /// over the rest, repeating until stable.
    fn apply_floors(&mut self) {
        let n = self.specs.len();
        let mut pinned = vec![false; n];

        loop {
            let fixed: f64 = (0..n)
                .filter(|&i| pinned[i])
                .map(|i| self.specs[i].min_probability)
                .sum();
            let free: f64 = (0..n)
                .filter(|&i| !pinned[i])
                .map(|i| self.probabilities[i])
                .sum();

            if free <= 0.0 {
                break;
            }
            let scale = (1.0 - fixed) / free;

            let mut changed = false;
            for i in 0..n {
                if !pinned[i] && self.probabilities[i] * scale < self.specs[i].min_probability {
                    pinned[i] = true;
                    changed = true;
                }
            }
            if !changed {
                for i in 0..n {
                    self.probabilities[i] = if pinned[i] {
                        self.specs[i].min_probability
                    } else {
                        self.probabilities[i] * scale
                    };
                }
                break;
            }
        }
    }

    /// Logs the per-operation statistics at debug level.
    pub fn log_stats(&self) {
        for (i, spec) in self.specs.iter().enumerate() {
            let stat = &self.stats[i];
            log::debug!(
                "op {}: p={:.3} attempts={:.0} success_rate={:.2} avg_improvement={:.1}",
                spec.label,
                self.probabilities[i],
                stat.attempts,
                stat.success_rate(),
                stat.average_improvement()
            );
        }
    }
}

fn normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}
