//! # SymPlace Floorplan
//!
//! Analog-layout floorplanning with symmetry constraints for the SymPlace
//! engine.
//!
//! Given rectangular modules and symmetry groups (mirror pairs and
//! self-symmetric modules about a shared axis), the solver computes
//! non-overlapping integer placements that honor every symmetry constraint
//! exactly while minimizing the bounding-box area, optionally blended with
//! a wirelength term.
//!
//! ## Architecture
//!
//! - [`Contour`]: skyline profile answering lowest-legal-position queries
//! - [`AsfBStarTree`]: packs one symmetry group from its representatives
//!   and mirrors the rest about a locked axis
//! - [`HbStarTree`]: composes symmetry islands and free modules; three
//!   node kinds (module / hierarchy / contour segment)
//! - [`FloorplanState`] + `symplace_core`'s annealing runner: the search
//! - [`PlacementSolver`]: driver with cooperative timeout and finalization
//!
//! ## Quick Start
//!
//! ```rust
//! use symplace_floorplan::{
//!     Module, PlacementSolver, SolverConfig, SymmetryAxis, SymmetryGroup,
//! };
//! use symplace_core::AnnealConfig;
//!
//! let modules = vec![
//!     Module::new("a", 10, 10),
//!     Module::new("b", 10, 10),
//!     Module::new("bias", 30, 5),
//! ];
//! let mut group = SymmetryGroup::new("g1", SymmetryAxis::Vertical);
//! group.add_pair("a", "b");
//!
//! let config = SolverConfig::new()
//!     .with_area_ratio(1.0)
//!     .with_anneal(AnnealConfig::new()
//!         .with_initial_temperature(200.0)
//!         .with_final_temperature(10.0)
//!         .with_moves_per_temperature(50))
//!     .with_seed(42);
//!
//! let solver = PlacementSolver::new(config);
//! let result = solver.solve(modules, vec![group]).unwrap();
//! assert!(result.is_successful());
//! ```

pub mod annealer;
pub mod asf_tree;
pub mod contour;
pub mod hb_tree;
pub mod module;
pub mod parse;
pub mod perturb;
pub mod solver;
pub mod symmetry;

// Re-exports
pub use annealer::{placements_of, FloorplanState, SharedBest};
pub use asf_tree::AsfBStarTree;
pub use contour::{Contour, ContourSegment};
pub use hb_tree::HbStarTree;
pub use module::{Module, ModuleId};
pub use parse::{format_placement, parse_problem, read_problem_file, write_placement_file};
pub use perturb::{Move, MoveOp, MovePool};
pub use solver::{PlacementSolver, SolverConfig};
pub use symmetry::{SymmetryAxis, SymmetryGroup};
pub use symplace_core::{
    AnnealConfig, Error, PlaceResult, Placement, Result, StopHandle, Watchdog,
};
