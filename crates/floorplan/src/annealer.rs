//! Annealing state over an HB*-tree.
//!
//! Implements [`AnnealState`] for the placement domain: proposes one of the
//! five perturbation operations according to the adaptive probabilities,
//! applies it to the working tree, repacks, and can reverse it in place.
//! The best solution is kept as a full clone of the tree, refreshed only
//! when the runner reports an improvement.
//!
//! Undo is replay-based: a move record carries the names needed to express
//! the reverse operation through the same tree API (rotating or swapping
//! again, moving back and re-homing a displaced child, flipping a
//! representative or an axis back). If a reverse step is ever rejected —
//! possible when an intervening pack rebuilt the contour chains a node was
//! hanging from — the working tree falls back to a clone of the best
//! solution.

use crate::hb_tree::HbStarTree;
use crate::perturb::{Move, MoveOp, MovePool};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use symplace_core::{AnnealState, OperatorSpec, Placement};

/// Bounded retries when proposing a move.
const GENERATION_ATTEMPTS: usize = 5;

/// Shared snapshot of the best placement, for the emergency shutdown hook.
pub type SharedBest = Arc<Mutex<Option<(Vec<Placement>, i64)>>>;

/// Extracts the placement list of a tree, in problem insertion order.
pub fn placements_of(tree: &HbStarTree) -> Vec<Placement> {
    tree.modules()
        .iter()
        .map(|m| Placement::new(m.name(), m.x(), m.y(), m.rotated()))
        .collect()
}

/// Annealing state: working tree, best tree, move pool, cost weights.
pub struct FloorplanState {
    current: HbStarTree,
    best: HbStarTree,
    area_weight: f64,
    wirelength_weight: f64,
    pool: MovePool,
    pending: Option<Move>,
    best_sink: Option<SharedBest>,
}

impl FloorplanState {
    /// Wraps a packed tree. The initial solution doubles as the best one.
    pub fn new(tree: HbStarTree, area_weight: f64, wirelength_weight: f64) -> Self {
        let best = tree.clone();
        Self {
            current: tree,
            best,
            area_weight,
            wirelength_weight,
            pool: MovePool::new(),
            pending: None,
            best_sink: None,
        }
    }

    /// Publishes every new best placement into a shared slot; the
    /// emergency shutdown path reads it from another thread.
    pub fn set_best_sink(&mut self, sink: SharedBest) {
        self.best_sink = Some(sink);
    }

    /// The best tree recorded so far.
    pub fn best_tree(&self) -> &HbStarTree {
        &self.best
    }

    /// Consumes the state, yielding the best tree.
    pub fn into_best(self) -> HbStarTree {
        self.best
    }

    fn cost_of(&self, tree: &HbStarTree) -> f64 {
        self.area_weight * tree.area() as f64
            + self.wirelength_weight * tree.wire_length() as f64
    }

    /// Proposes one move according to `probabilities`, without applying it.
    fn generate(&mut self, probabilities: &[f64], rng: &mut StdRng) -> Option<Move> {
        let op = sample_op(probabilities, rng);
        let mut mv = self.pool.acquire();
        mv.op = op;

        let filled = match op {
            MoveOp::Rotate => {
                let names = self.current.rotatable_names();
                match names.choose(rng) {
                    Some(name) => {
                        mv.param1.push_str(name);
                        true
                    }
                    None => false,
                }
            }
            MoveOp::Move => {
                let names = self.current.eligible_node_names();
                match (names.choose(rng), names.choose(rng)) {
                    (Some(node), Some(parent)) if node != parent => {
                        mv.param1.push_str(node);
                        mv.param2.push_str(parent);
                        mv.as_left = rng.gen::<bool>();
                        // Roots cannot move; snapshot the way back while
                        // the node is still in place.
                        match self.current.parent_info(node) {
                            Some((old_parent, old_as_left)) => {
                                mv.undo_parent = Some(old_parent);
                                mv.undo_as_left = old_as_left;
                                mv.undo_displaced = self
                                    .current
                                    .child_info(parent, mv.as_left)
                                    .filter(|occupant| occupant != node);
                                true
                            }
                            None => false,
                        }
                    }
                    _ => false,
                }
            }
            MoveOp::Swap => {
                let names = self.current.eligible_node_names();
                match (names.choose(rng), names.choose(rng)) {
                    (Some(a), Some(b)) if a != b => {
                        mv.param1.push_str(a);
                        mv.param2.push_str(b);
                        true
                    }
                    _ => false,
                }
            }
            MoveOp::ChangeRep => {
                let groups = self.current.group_names();
                match groups.choose(rng) {
                    Some(group) => {
                        let pairs = self.current.pairs_of_group(group);
                        match pairs.choose(rng) {
                            Some((a, b)) => {
                                let module = if rng.gen::<bool>() { a } else { b };
                                mv.param1.push_str(group);
                                mv.param2.push_str(module);
                                mv.undo_representative =
                                    self.current.representative_of(group, module);
                                true
                            }
                            None => false,
                        }
                    }
                    None => false,
                }
            }
            MoveOp::ConvertSym => {
                let groups = self.current.group_names();
                match groups.choose(rng) {
                    Some(group) => {
                        mv.param1.push_str(group);
                        mv.undo_axis = self.current.axis_of_group(group);
                        true
                    }
                    None => false,
                }
            }
            MoveOp::None => false,
        };

        if filled {
            Some(mv)
        } else {
            self.pool.release(mv);
            None
        }
    }

    fn apply(&mut self, mv: &Move) -> bool {
        match mv.op {
            MoveOp::Rotate => self.current.rotate_module(&mv.param1),
            MoveOp::Move => self.current.move_node(&mv.param1, &mv.param2, mv.as_left),
            MoveOp::Swap => self.current.swap_nodes(&mv.param1, &mv.param2),
            MoveOp::ChangeRep => self.current.change_representative(&mv.param1, &mv.param2),
            MoveOp::ConvertSym => self.current.convert_symmetry_type(&mv.param1),
            MoveOp::None => false,
        }
    }

    /// Reverses `mv` on the working tree. Returns false when the reverse
    /// operation was rejected.
    fn reverse(&mut self, mv: &Move) -> bool {
        match mv.op {
            MoveOp::Rotate => self.current.rotate_module(&mv.param1),
            MoveOp::Move => {
                let Some(parent) = mv.undo_parent.as_deref() else {
                    return false;
                };
                if !self.current.move_node(&mv.param1, parent, mv.undo_as_left) {
                    return false;
                }
                match mv.undo_displaced.as_deref() {
                    Some(displaced) => {
                        self.current.move_node(displaced, &mv.param2, mv.as_left)
                    }
                    None => true,
                }
            }
            MoveOp::Swap => self.current.swap_nodes(&mv.param1, &mv.param2),
            MoveOp::ChangeRep => {
                let module = mv.undo_representative.as_deref().unwrap_or(&mv.param2);
                self.current.change_representative(&mv.param1, module)
            }
            MoveOp::ConvertSym => self.current.convert_symmetry_type(&mv.param1),
            MoveOp::None => false,
        }
    }

    /// Replaces the working tree with the best snapshot. Last resort when
    /// a reverse step cannot be replayed.
    fn restore_from_best(&mut self) {
        log::debug!("undo could not be replayed; restoring working tree from best");
        self.current = self.best.clone();
    }
}

/// Samples an operation index from the probability vector.
fn sample_op(probabilities: &[f64], rng: &mut StdRng) -> MoveOp {
    const OPS: [MoveOp; 5] = [
        MoveOp::Rotate,
        MoveOp::Move,
        MoveOp::Swap,
        MoveOp::ChangeRep,
        MoveOp::ConvertSym,
    ];
    let mut roll = rng.gen::<f64>();
    for (i, &p) in probabilities.iter().enumerate().take(OPS.len()) {
        if roll < p {
            return OPS[i];
        }
        roll -= p;
    }
    OPS[OPS.len() - 1]
}

impl AnnealState for FloorplanState {
    fn operators(&self) -> Vec<OperatorSpec> {
        vec![
            OperatorSpec::new("rotate", 0.30, 0.10),
            OperatorSpec::new("move", 0.30, 0.30),
            OperatorSpec::new("swap", 0.30, 0.10),
            OperatorSpec::new("change-rep", 0.05, 0.02),
            OperatorSpec::new("convert-sym", 0.05, 0.02),
        ]
    }

    fn cost(&self) -> f64 {
        self.cost_of(&self.current)
    }

    fn try_move(&mut self, probabilities: &[f64], rng: &mut StdRng) -> Option<usize> {
        debug_assert!(self.pending.is_none(), "unpaired try_move");

        for _ in 0..GENERATION_ATTEMPTS {
            let Some(mv) = self.generate(probabilities, rng) else {
                continue;
            };
            if !self.apply(&mv) {
                self.pool.release(mv);
                continue;
            }
            if self.current.pack().is_err() {
                // Should not happen on a non-empty tree; fall back to the
                // last consistent state.
                self.restore_from_best();
                self.pool.release(mv);
                return None;
            }
            let op = mv.op.index();
            self.pending = Some(mv);
            return Some(op);
        }
        None
    }

    fn undo_move(&mut self) {
        let Some(mv) = self.pending.take() else {
            return;
        };
        if !self.reverse(&mv) || self.current.pack().is_err() {
            self.restore_from_best();
        }
        self.pool.release(mv);
    }

    fn commit_move(&mut self) {
        if let Some(mv) = self.pending.take() {
            self.pool.release(mv);
        }
    }

    fn record_best(&mut self) {
        self.best = self.current.clone();
        if let Some(sink) = &self.best_sink {
            if let Ok(mut slot) = sink.lock() {
                *slot = Some((placements_of(&self.best), self.best.area()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::symmetry::{SymmetryAxis, SymmetryGroup};
    use symplace_core::{AnnealConfig, AnnealRunner};

    fn sample_state() -> FloorplanState {
        let modules = vec![
            Module::new("a", 10, 10),
            Module::new("b", 10, 10),
            Module::new("c", 10, 10),
            Module::new("d", 10, 10),
            Module::new("e", 30, 5),
        ];
        let mut group = SymmetryGroup::new("g1", SymmetryAxis::Vertical);
        group.add_pair("a", "b");
        group.add_pair("c", "d");

        let mut tree = HbStarTree::new(modules, vec![group]).unwrap();
        tree.build_initial_tree();
        tree.pack().unwrap();
        FloorplanState::new(tree, 1.0, 0.0)
    }

    #[test]
    fn test_try_move_and_undo_restores_cost() {
        let mut state = sample_state();
        let mut rng = StdRng::seed_from_u64(42);
        let probs = [0.3, 0.3, 0.3, 0.05, 0.05];

        for _ in 0..200 {
            let cost_before = state.cost();
            if state.try_move(&probs, &mut rng).is_some() {
                state.undo_move();
                assert_eq!(
                    state.cost(),
                    cost_before,
                    "undo must restore the pre-move cost"
                );
            }
        }
    }

    #[test]
    fn test_undo_preserves_symmetry() {
        let mut state = sample_state();
        let mut rng = StdRng::seed_from_u64(7);
        let probs = [0.2, 0.2, 0.2, 0.2, 0.2];

        for _ in 0..100 {
            if state.try_move(&probs, &mut rng).is_some() {
                state.undo_move();
            }
        }

        let island = &state.current.islands()[0];
        let axis_x2 = island.axis_pos_x2();
        for &(a, b) in island.pairs() {
            let (ma, mb) = (&state.current.modules()[a], &state.current.modules()[b]);
            assert_eq!(ma.center_x2() + mb.center_x2(), 2 * axis_x2);
            assert_eq!(ma.y(), mb.y());
        }
    }

    #[test]
    fn test_commit_keeps_new_state() {
        let mut state = sample_state();
        let mut rng = StdRng::seed_from_u64(3);
        let probs = [1.0, 0.0, 0.0, 0.0, 0.0]; // rotations only

        let applied = (0..20)
            .filter(|_| {
                let accepted = state.try_move(&probs, &mut rng).is_some();
                if accepted {
                    state.commit_move();
                }
                accepted
            })
            .count();
        assert!(applied > 0);
        assert!(state.pending.is_none());
    }

    #[test]
    fn test_record_best_publishes_to_sink() {
        let mut state = sample_state();
        let sink: SharedBest = Arc::new(Mutex::new(None));
        state.set_best_sink(Arc::clone(&sink));

        state.record_best();

        let slot = sink.lock().unwrap();
        let (placements, area) = slot.as_ref().expect("snapshot published");
        assert_eq!(placements.len(), 5);
        assert!(*area > 0);
    }

    #[test]
    fn test_annealing_never_worse_than_initial() {
        let mut state = sample_state();
        let config = AnnealConfig::new()
            .with_initial_temperature(500.0)
            .with_final_temperature(10.0)
            .with_cooling_rate(0.8)
            .with_moves_per_temperature(60)
            .with_seed(11);

        let runner = AnnealRunner::new(config);
        let outcome = runner.run(&mut state);

        assert!(outcome.best_cost <= outcome.initial_cost);
        assert!(state.best_tree().is_overlap_free() || state.best_tree().area() > 0);
    }
}
