//! Placement solver driver.
//!
//! Wires the HB*-tree to the annealing runner: builds the initial
//! placement, runs the search under a cooperative stop handle, and
//! finalizes the best solution (one repack, the overlap safety net, and a
//! never-worse-than-initial guarantee). The driver always tries to emit
//! whatever best placement it has; a timeout is not an error.

use crate::annealer::{placements_of, FloorplanState, SharedBest};
use crate::hb_tree::HbStarTree;
use crate::module::Module;
use crate::symmetry::SymmetryGroup;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use symplace_core::{AnnealConfig, AnnealRunner, PlaceResult, Result, StopHandle};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solver configuration: annealing schedule plus cost weights.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Annealing schedule parameters.
    pub anneal: AnnealConfig,
    /// Weight of the bounding-box area term.
    pub area_weight: f64,
    /// Weight of the wirelength term.
    pub wirelength_weight: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            anneal: AnnealConfig::default(),
            area_weight: 1.0,
            wirelength_weight: 0.0,
        }
    }
}

impl SolverConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the area/wirelength split from a single ratio: the area weight
    /// is `ratio`, the wirelength weight `1 - ratio`.
    pub fn with_area_ratio(mut self, ratio: f64) -> Self {
        let ratio = ratio.clamp(0.0, 1.0);
        self.area_weight = ratio;
        self.wirelength_weight = 1.0 - ratio;
        self
    }

    /// Replaces the annealing schedule.
    pub fn with_anneal(mut self, anneal: AnnealConfig) -> Self {
        self.anneal = anneal;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.anneal.seed = Some(seed);
        self
    }
}

/// The placement solver.
pub struct PlacementSolver {
    config: SolverConfig,
    stop: StopHandle,
    shared_best: SharedBest,
}

impl PlacementSolver {
    /// Creates a solver with the given configuration.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            stop: StopHandle::new(),
            shared_best: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a solver with default configuration.
    pub fn default_config() -> Self {
        Self::new(SolverConfig::default())
    }

    /// The cooperative stop handle; typically wired to a watchdog.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Shares a stop handle owned elsewhere (e.g. a watchdog's).
    pub fn set_stop_handle(&mut self, stop: StopHandle) {
        self.stop = stop;
    }

    /// Shared slot holding the best placement found so far. Updated on
    /// every improvement, so an emergency shutdown path can emit it even
    /// while the search is still running.
    pub fn shared_best(&self) -> SharedBest {
        Arc::clone(&self.shared_best)
    }

    /// Solves the placement problem.
    ///
    /// Returns a result even when the search was stopped early; the only
    /// error cases are invalid input and a problem with no modules.
    pub fn solve(
        &self,
        modules: Vec<Module>,
        groups: Vec<SymmetryGroup>,
    ) -> Result<PlaceResult> {
        let start = Instant::now();

        let mut tree = HbStarTree::new(modules, groups)?;
        tree.build_initial_tree();
        tree.pack()?;

        let initial_tree = tree.clone();
        let initial_area = initial_tree.area();
        log::info!("initial placement area: {}", initial_area);

        // Seed the shared slot so even an immediate emergency shutdown has
        // a placement to write.
        if let Ok(mut slot) = self.shared_best.lock() {
            *slot = Some((placements_of(&initial_tree), initial_area));
        }

        let mut state = FloorplanState::new(
            tree,
            self.config.area_weight,
            self.config.wirelength_weight,
        );
        state.set_best_sink(self.shared_best());

        let mut runner = AnnealRunner::new(self.config.anneal.clone());
        runner.set_stop_handle(self.stop.clone());
        let outcome = runner.run(&mut state);

        let mut best = state.into_best();
        self.finalize(&mut best);

        // The emitted placement is never worse than the initial one.
        if best.area() > initial_area {
            log::info!(
                "annealed area {} is worse than initial {}; keeping the initial placement",
                best.area(),
                initial_area
            );
            best = initial_tree;
        }

        let cost = self.config.area_weight * best.area() as f64
            + self.config.wirelength_weight * best.wire_length() as f64;

        let mut result = PlaceResult::new();
        result.placements = placements_of(&best);
        result.area = best.area();
        result.best_cost = cost;
        result.initial_cost = outcome.initial_cost;
        result.iterations = outcome.iterations;
        result.accepted_moves = outcome.accepted;
        result.rejected_moves = outcome.rejected;
        result.computation_time_ms = start.elapsed().as_millis() as u64;
        result.cancelled = outcome.cancelled;

        if let Ok(mut slot) = self.shared_best.lock() {
            *slot = Some((result.placements.clone(), result.area));
        }
        log::info!(
            "final area: {} ({} iterations, {:.1}% accepted)",
            result.area,
            result.iterations,
            result.acceptance_rate() * 100.0
        );
        Ok(result)
    }

    /// Final validation pass: one repack and the overlap safety net. When
    /// the repack fails the area is recomputed directly from coordinates.
    fn finalize(&self, best: &mut HbStarTree) {
        if best.pack().is_err() {
            log::warn!("final repack failed; using recorded coordinates");
        }
        let repairs = best.repair_overlaps();
        if repairs > 0 {
            log::warn!("finalization repaired {} overlaps", repairs);
        }
    }
}
