//! Simulated annealing framework.
//!
//! Generic annealing loop over a domain-provided [`AnnealState`]. The runner
//! owns the temperature schedule, Metropolis acceptance, best-solution
//! bookkeeping, stagnation-triggered extra cooling, and the adaptive
//! rebalancing of move probabilities; the state owns the actual solution
//! representation and knows how to apply and undo moves on it.
//!
//! Moves are undone in place rather than restored from a pre-move clone:
//! the state records whatever it needs to reverse one operation, and the
//! runner guarantees apply/undo calls are strictly paired.
//!
//! # Cancellation
//!
//! The runner polls a shared [`StopHandle`] at the start of every
//! temperature level and every few moves inside the inner loop. A stop
//! request is not an error: the loop finishes its current move and returns
//! with `cancelled = true`, leaving the best solution recorded in the state.

use crate::adaptive::{AdaptivePerturbation, OperatorSpec};
use crate::timeout::StopHandle;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How often the inner move loop polls the stop flag.
const STOP_CHECK_INTERVAL: u32 = 16;

/// Target acceptance probability for a typical uphill move at the
/// auto-initialized starting temperature.
const INITIAL_ACCEPTANCE: f64 = 0.8;

/// Configuration for the annealing runner.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnnealConfig {
    /// Starting temperature. `0.0` requests auto-initialization from
    /// sampled move deltas.
    pub initial_temperature: f64,
    /// Temperature at which the schedule terminates.
    pub final_temperature: f64,
    /// Geometric cooling factor applied after each temperature level.
    pub cooling_rate: f64,
    /// Moves attempted per temperature level.
    pub moves_per_temperature: u32,
    /// Consecutive non-improving temperature levels before extra cooling.
    pub no_improvement_limit: u32,
    /// Multiplier applied once when the stagnation limit is hit.
    pub extra_cooling_factor: f64,
    /// Moves between adaptive probability updates.
    pub probability_update_interval: u32,
    /// Random moves sampled for temperature auto-initialization.
    pub temperature_samples: u32,
    /// Lower clamp for the auto-initialized temperature.
    pub min_initial_temperature: f64,
    /// Upper clamp for the auto-initialized temperature.
    pub max_initial_temperature: f64,
    /// Random seed for reproducibility (None = from entropy).
    pub seed: Option<u64>,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 0.0,
            final_temperature: 0.1,
            cooling_rate: 0.90,
            moves_per_temperature: 1500,
            no_improvement_limit: 3,
            extra_cooling_factor: 0.5,
            probability_update_interval: 64,
            temperature_samples: 500,
            min_initial_temperature: 100.0,
            max_initial_temperature: 10_000.0,
            seed: None,
        }
    }
}

impl AnnealConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a fixed initial temperature, disabling auto-initialization.
    pub fn with_initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t.max(0.0);
        self
    }

    /// Sets the final temperature.
    pub fn with_final_temperature(mut self, t: f64) -> Self {
        self.final_temperature = t.max(1e-9);
        self
    }

    /// Sets the geometric cooling rate.
    pub fn with_cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate.clamp(0.5, 0.999);
        self
    }

    /// Sets the number of moves per temperature level.
    pub fn with_moves_per_temperature(mut self, moves: u32) -> Self {
        self.moves_per_temperature = moves;
        self
    }

    /// Sets the stagnation limit before extra cooling.
    pub fn with_no_improvement_limit(mut self, limit: u32) -> Self {
        self.no_improvement_limit = limit.max(1);
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A solution the annealing runner can search over.
///
/// The implementation owns both the current working solution and the best
/// solution seen; [`record_best`](AnnealState::record_best) snapshots the
/// former into the latter.
pub trait AnnealState {
    /// The perturbation operations this state offers, with their initial
    /// probabilities and floors.
    fn operators(&self) -> Vec<OperatorSpec>;

    /// Cost of the current solution. Lower is better.
    fn cost(&self) -> f64;

    /// Picks an operation according to `probabilities`, applies it to the
    /// current solution and brings coordinates up to date.
    ///
    /// Returns the index of the applied operation, or `None` when no
    /// applicable move could be generated (the runner counts and skips).
    fn try_move(&mut self, probabilities: &[f64], rng: &mut StdRng) -> Option<usize>;

    /// Reverts the move applied by the last successful `try_move`.
    fn undo_move(&mut self);

    /// Keeps the move applied by the last successful `try_move`.
    fn commit_move(&mut self);

    /// Snapshots the current solution as the best seen so far.
    fn record_best(&mut self);
}

/// Statistics of one annealing run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnnealOutcome {
    /// Best cost seen over the run.
    pub best_cost: f64,
    /// Cost of the initial solution.
    pub initial_cost: f64,
    /// Moves attempted (accepted + rejected).
    pub iterations: u64,
    /// Accepted moves.
    pub accepted: u64,
    /// Rejected moves.
    pub rejected: u64,
    /// Iterations where no applicable move could be generated.
    pub skipped: u64,
    /// Temperature levels processed.
    pub temperature_levels: u32,
    /// Final temperature when the loop exited.
    pub final_temperature: f64,
    /// Wall-clock time of the run in milliseconds.
    pub elapsed_ms: u64,
    /// True when the run exited on a stop request.
    pub cancelled: bool,
}

/// The annealing runner.
pub struct AnnealRunner {
    config: AnnealConfig,
    stop: StopHandle,
}

impl AnnealRunner {
    /// Creates a runner with the given configuration.
    pub fn new(config: AnnealConfig) -> Self {
        Self {
            config,
            stop: StopHandle::new(),
        }
    }

    /// Returns a handle that requests cooperative termination.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Replaces the stop handle, sharing one owned elsewhere.
    pub fn set_stop_handle(&mut self, stop: StopHandle) {
        self.stop = stop;
    }

    /// Runs the annealing search, mutating `state` in place.
    ///
    /// On return the state's best snapshot holds the best solution found;
    /// this is true for completed, stagnation-terminated and cancelled runs
    /// alike.
    pub fn run<S: AnnealState>(&self, state: &mut S) -> AnnealOutcome {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let start = Instant::now();
        let mut adaptive = AdaptivePerturbation::new(state.operators());

        let initial_cost = state.cost();
        let mut best_cost = initial_cost;
        state.record_best();

        let mut outcome = AnnealOutcome {
            best_cost,
            initial_cost,
            iterations: 0,
            accepted: 0,
            rejected: 0,
            skipped: 0,
            temperature_levels: 0,
            final_temperature: 0.0,
            elapsed_ms: 0,
            cancelled: false,
        };

        let mut temperature = if self.config.initial_temperature > 0.0 {
            self.config.initial_temperature
        } else {
            self.estimate_initial_temperature(state, &adaptive, &mut rng)
        };
        log::info!(
            "annealing: T0={:.1} T_final={:.3} cooling={:.2} moves/T={} initial_cost={:.0}",
            temperature,
            self.config.final_temperature,
            self.config.cooling_rate,
            self.config.moves_per_temperature,
            initial_cost
        );

        let mut stagnation = 0u32;

        while temperature > self.config.final_temperature {
            if self.stop.is_requested() {
                outcome.cancelled = true;
                break;
            }

            let mut improved_this_level = false;

            for i in 0..self.config.moves_per_temperature {
                if i % STOP_CHECK_INTERVAL == 0 && self.stop.is_requested() {
                    outcome.cancelled = true;
                    break;
                }

                let cost_before = state.cost();
                let Some(op) = state.try_move(adaptive.probabilities(), &mut rng) else {
                    outcome.skipped += 1;
                    continue;
                };
                adaptive.record_attempt(op);

                let cost_after = state.cost();
                let delta = cost_after - cost_before;

                if delta <= 0.0 || rng.gen::<f64>() < (-delta / temperature).exp() {
                    state.commit_move();
                    outcome.accepted += 1;
                    if delta < 0.0 {
                        adaptive.record_success(op, -delta);
                    }
                    if cost_after < best_cost {
                        best_cost = cost_after;
                        state.record_best();
                        improved_this_level = true;
                    }
                } else {
                    state.undo_move();
                    outcome.rejected += 1;
                }

                outcome.iterations += 1;
                if self.config.probability_update_interval > 0
                    && outcome.iterations % self.config.probability_update_interval as u64 == 0
                {
                    adaptive.update_probabilities();
                }
            }

            outcome.temperature_levels += 1;

            if outcome.cancelled {
                break;
            }

            if improved_this_level {
                stagnation = 0;
            } else {
                stagnation += 1;
                if stagnation >= self.config.no_improvement_limit {
                    temperature *= self.config.extra_cooling_factor;
                    stagnation = 0;
                    log::debug!(
                        "stagnation at level {}: extra cooling to T={:.3}",
                        outcome.temperature_levels,
                        temperature
                    );
                }
            }

            temperature *= self.config.cooling_rate;
        }

        outcome.best_cost = best_cost;
        outcome.final_temperature = temperature;
        outcome.elapsed_ms = start.elapsed().as_millis() as u64;
        adaptive.log_stats();
        log::info!(
            "annealing done: best={:.0} iterations={} accepted={} rejected={} cancelled={}",
            best_cost,
            outcome.iterations,
            outcome.accepted,
            outcome.rejected,
            outcome.cancelled
        );
        outcome
    }

    /// Samples random moves from the initial state to pick a starting
    /// temperature where a typical uphill move is accepted with probability
    /// close to [`INITIAL_ACCEPTANCE`], clamped to the configured range.
    fn estimate_initial_temperature<S: AnnealState>(
        &self,
        state: &mut S,
        adaptive: &AdaptivePerturbation,
        rng: &mut StdRng,
    ) -> f64 {
        let mut total_delta = 0.0;
        let mut valid_samples = 0u32;

        for _ in 0..self.config.temperature_samples {
            if self.stop.is_requested() {
                break;
            }
            let before = state.cost();
            let Some(_op) = state.try_move(adaptive.probabilities(), rng) else {
                continue;
            };
            let after = state.cost();
            state.undo_move();

            let delta = (after - before).abs();
            if delta > 0.0 && delta.is_finite() {
                total_delta += delta;
                valid_samples += 1;
            }
        }

        let avg_delta = if valid_samples > 0 {
            total_delta / valid_samples as f64
        } else {
            self.config.min_initial_temperature
        };

        let temperature = -avg_delta / INITIAL_ACCEPTANCE.ln();
        let clamped = temperature.clamp(
            self.config.min_initial_temperature,
            self.config.max_initial_temperature,
        );
        log::debug!(
            "auto temperature: {} samples, avg |delta|={:.1}, T0={:.1}",
            valid_samples,
            avg_delta,
            clamped
        );
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-dimensional toy state: the solution is an integer and a move
    /// nudges it up or down; cost is its distance from zero.
    struct WalkState {
        current: i64,
        best: i64,
        last_step: i64,
    }

    impl WalkState {
        fn new(start: i64) -> Self {
            Self {
                current: start,
                best: start,
                last_step: 0,
            }
        }
    }

    impl AnnealState for WalkState {
        fn operators(&self) -> Vec<OperatorSpec> {
            vec![
                OperatorSpec::new("down", 0.5, 0.1),
                OperatorSpec::new("up", 0.5, 0.1),
            ]
        }

        fn cost(&self) -> f64 {
            self.current.abs() as f64
        }

        fn try_move(&mut self, probabilities: &[f64], rng: &mut StdRng) -> Option<usize> {
            let op = if rng.gen::<f64>() < probabilities[0] { 0 } else { 1 };
            self.last_step = if op == 0 { -1 } else { 1 };
            self.current += self.last_step;
            Some(op)
        }

        fn undo_move(&mut self) {
            self.current -= self.last_step;
        }

        fn commit_move(&mut self) {}

        fn record_best(&mut self) {
            self.best = self.current;
        }
    }

    #[test]
    fn test_run_improves_cost() {
        let config = AnnealConfig::new()
            .with_initial_temperature(50.0)
            .with_final_temperature(0.5)
            .with_cooling_rate(0.8)
            .with_moves_per_temperature(200)
            .with_seed(7);

        let mut state = WalkState::new(40);
        let runner = AnnealRunner::new(config);
        let outcome = runner.run(&mut state);

        assert!(outcome.best_cost <= outcome.initial_cost);
        assert!(outcome.best_cost < 40.0);
        assert_eq!(state.best.abs() as f64, outcome.best_cost);
        assert!(!outcome.cancelled);
        assert!(outcome.iterations > 0);
    }

    #[test]
    fn test_zero_moves_returns_initial() {
        let config = AnnealConfig::new()
            .with_initial_temperature(10.0)
            .with_final_temperature(1.0)
            .with_moves_per_temperature(0)
            .with_seed(1);

        let mut state = WalkState::new(17);
        let runner = AnnealRunner::new(config);
        let outcome = runner.run(&mut state);

        assert_eq!(outcome.best_cost, outcome.initial_cost);
        assert_eq!(state.current, 17);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn test_stop_requested_before_run() {
        let config = AnnealConfig::new()
            .with_initial_temperature(100.0)
            .with_seed(2);

        let mut state = WalkState::new(25);
        let runner = AnnealRunner::new(config);
        runner.stop_handle().request();

        let outcome = runner.run(&mut state);

        assert!(outcome.cancelled);
        assert_eq!(outcome.iterations, 0);
        // The initial solution is still recorded as best.
        assert_eq!(state.best, 25);
    }

    #[test]
    fn test_auto_temperature_is_clamped() {
        // Every move changes cost by exactly 1, so the raw estimate
        // -1/ln(0.8) ~ 4.5 is far below the configured minimum.
        let config = AnnealConfig::new()
            .with_final_temperature(50.0)
            .with_moves_per_temperature(10)
            .with_seed(3);

        let mut state = WalkState::new(5);
        let runner = AnnealRunner::new(config);
        let outcome = runner.run(&mut state);

        // Started at the clamp floor (100), above final_temperature.
        assert!(outcome.temperature_levels > 0);
        assert!(outcome.final_temperature <= 50.0 + 1e-9);
    }

    #[test]
    fn test_outcome_counts_are_consistent() {
        let config = AnnealConfig::new()
            .with_initial_temperature(20.0)
            .with_final_temperature(1.0)
            .with_cooling_rate(0.7)
            .with_moves_per_temperature(50)
            .with_seed(11);

        let mut state = WalkState::new(10);
        let runner = AnnealRunner::new(config);
        let outcome = runner.run(&mut state);

        assert_eq!(outcome.iterations, outcome.accepted + outcome.rejected);
        assert_eq!(outcome.skipped, 0);
    }
}
