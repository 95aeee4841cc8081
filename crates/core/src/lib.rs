//! # SymPlace Core
//!
//! Core annealing framework and shared types for the SymPlace analog
//! floorplanner.
//!
//! This crate is domain-agnostic: it knows how to drive a simulated
//! annealing search over any [`AnnealState`], how to adapt move
//! probabilities from observed improvements, and how to stop cooperatively
//! on a timeout. The placement domain itself (modules, symmetry groups,
//! B*-trees) lives in `symplace-floorplan`.
//!
//! ## Components
//!
//! | Component | Responsibility |
//! |-----------|----------------|
//! | [`AnnealRunner`] | Temperature schedule, Metropolis acceptance, best tracking, stagnation cooling |
//! | [`AdaptivePerturbation`] | Per-operation success statistics and probability rebalancing |
//! | [`StopHandle`] / [`Watchdog`] | Cooperative cancellation with an emergency shutdown hook |
//! | [`PlaceResult`] | Placements plus run statistics |
//! | [`Error`] | Shared error type (`thiserror`) |
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support for config and
//!   result types.

pub mod adaptive;
pub mod anneal;
pub mod error;
pub mod result;
pub mod timeout;

// Re-exports
pub use adaptive::{AdaptivePerturbation, OperatorSpec};
pub use anneal::{AnnealConfig, AnnealOutcome, AnnealRunner, AnnealState};
pub use error::{Error, Result};
pub use result::{PlaceResult, PlaceSummary, Placement};
pub use timeout::{StopHandle, Watchdog};
