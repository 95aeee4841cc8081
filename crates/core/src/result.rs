//! Solve result representation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Final coordinates of one placed module.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Placement {
    /// Module name.
    pub name: String,
    /// X coordinate of the lower-left corner after rotation.
    pub x: i64,
    /// Y coordinate of the lower-left corner after rotation.
    pub y: i64,
    /// Whether the module was rotated by 90 degrees.
    pub rotated: bool,
}

impl Placement {
    /// Creates a new placement record.
    pub fn new(name: impl Into<String>, x: i64, y: i64, rotated: bool) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            rotated,
        }
    }
}

/// Result of a placement solve operation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaceResult {
    /// Placements for all modules, in problem insertion order.
    pub placements: Vec<Placement>,

    /// Bounding-box area of the placement.
    pub area: i64,

    /// Best cost achieved by the search.
    pub best_cost: f64,

    /// Cost of the initial (pre-annealing) placement.
    pub initial_cost: f64,

    /// Total annealing iterations performed.
    pub iterations: u64,

    /// Number of accepted moves.
    pub accepted_moves: u64,

    /// Number of rejected moves.
    pub rejected_moves: u64,

    /// Computation time in milliseconds.
    pub computation_time_ms: u64,

    /// Whether the solve was stopped early by the cooperative stop flag.
    ///
    /// A cancelled run that produced a placement is still a success.
    pub cancelled: bool,
}

impl PlaceResult {
    /// Creates a new empty result.
    pub fn new() -> Self {
        Self {
            placements: Vec::new(),
            area: 0,
            best_cost: f64::INFINITY,
            initial_cost: f64::INFINITY,
            iterations: 0,
            accepted_moves: 0,
            rejected_moves: 0,
            computation_time_ms: 0,
            cancelled: false,
        }
    }

    /// Returns true if at least one placement was produced.
    pub fn is_successful(&self) -> bool {
        !self.placements.is_empty()
    }

    /// Returns true if the solve ran to completion.
    pub fn completed_normally(&self) -> bool {
        !self.cancelled
    }

    /// Fraction of proposed moves that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.accepted_moves + self.rejected_moves;
        if total == 0 {
            0.0
        } else {
            self.accepted_moves as f64 / total as f64
        }
    }

    /// Cost improvement relative to the initial placement (0.0 - 1.0).
    pub fn improvement(&self) -> f64 {
        if self.initial_cost <= 0.0 || !self.initial_cost.is_finite() {
            0.0
        } else {
            1.0 - self.best_cost / self.initial_cost
        }
    }
}

impl Default for PlaceResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics for a solve result.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaceSummary {
    /// Total modules placed.
    pub modules_placed: usize,
    /// Bounding-box area.
    pub area: i64,
    /// Acceptance rate over the whole run.
    pub acceptance_rate: f64,
    /// Computation time in milliseconds.
    pub time_ms: u64,
    /// Whether the run was cancelled early.
    pub cancelled: bool,
}

impl From<&PlaceResult> for PlaceSummary {
    fn from(result: &PlaceResult) -> Self {
        Self {
            modules_placed: result.placements.len(),
            area: result.area,
            acceptance_rate: result.acceptance_rate(),
            time_ms: result.computation_time_ms,
            cancelled: result.cancelled,
        }
    }
}
