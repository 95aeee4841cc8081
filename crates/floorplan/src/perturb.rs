//! Perturbation moves and their pool.
//!
//! A [`Move`] describes one tree perturbation together with the pre-move
//! state needed to reverse it. Moves are recycled through a [`MovePool`] so
//! the annealing loop does not allocate per iteration; a move is scoped to
//! one accept/reject cycle and returns to the pool on both branches.

use crate::symmetry::SymmetryAxis;

/// The five perturbation operations, in adaptive-probability order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOp {
    /// Rotate one module by 90 degrees.
    Rotate,
    /// Rewire a node under a new parent.
    Move,
    /// Exchange two nodes' positions.
    Swap,
    /// Flip which module of a pair is the representative.
    ChangeRep,
    /// Flip a group's symmetry axis.
    ConvertSym,
    /// Pool placeholder; never applied.
    None,
}

impl MoveOp {
    /// Stable operator index used by the adaptive probability table.
    pub fn index(self) -> usize {
        match self {
            Self::Rotate => 0,
            Self::Move => 1,
            Self::Swap => 2,
            Self::ChangeRep => 3,
            Self::ConvertSym => 4,
            Self::None => usize::MAX,
        }
    }
}

/// One perturbation with its undo snapshot.
#[derive(Debug, Clone)]
pub struct Move {
    /// The operation kind.
    pub op: MoveOp,
    /// First operand: module, node, or group name.
    pub param1: String,
    /// Second operand: new parent, second node, or pair module name.
    pub param2: String,
    /// Attach-as-left-child flag for `Move`.
    pub as_left: bool,

    /// Original parent of the moved node.
    pub undo_parent: Option<String>,
    /// Whether the moved node was a left child.
    pub undo_as_left: bool,
    /// Child displaced out of the target slot, if any.
    pub undo_displaced: Option<String>,
    /// Original representative for `ChangeRep`.
    pub undo_representative: Option<String>,
    /// Original axis for `ConvertSym`.
    pub undo_axis: Option<SymmetryAxis>,
}

impl Move {
    fn empty() -> Self {
        Self {
            op: MoveOp::None,
            param1: String::new(),
            param2: String::new(),
            as_left: false,
            undo_parent: None,
            undo_as_left: false,
            undo_displaced: None,
            undo_representative: None,
            undo_axis: None,
        }
    }

    /// Clears all fields, keeping string capacity for reuse.
    pub fn reset(&mut self) {
        self.op = MoveOp::None;
        self.param1.clear();
        self.param2.clear();
        self.as_left = false;
        self.undo_parent = None;
        self.undo_as_left = false;
        self.undo_displaced = None;
        self.undo_representative = None;
        self.undo_axis = None;
    }
}

/// Recycling pool of [`Move`] values.
///
/// `acquire` hands out a reset move, `release` takes it back. The pool is
/// bounded; surplus moves are dropped.
#[derive(Debug)]
pub struct MovePool {
    free: Vec<Move>,
    max_size: usize,
}

impl MovePool {
    /// Creates a pool with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Creates a pool bounded at `max_size` pooled moves.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            free: Vec::new(),
            max_size,
        }
    }

    /// Takes a reset move from the pool, or creates one.
    pub fn acquire(&mut self) -> Move {
        self.free.pop().unwrap_or_else(Move::empty)
    }

    /// Returns a move to the pool for reuse.
    pub fn release(&mut self, mut mv: Move) {
        if self.free.len() < self.max_size {
            mv.reset();
            self.free.push(mv);
        }
    }

    /// Number of pooled moves.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// Returns true if the pool holds no moves.
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

impl Default for MovePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_recycles() {
        let mut pool = MovePool::new();
        assert!(pool.is_empty());

        let mut mv = pool.acquire();
        mv.op = MoveOp::Swap;
        mv.param1.push_str("b1");
        mv.param2.push_str("b2");
        pool.release(mv);
        assert_eq!(pool.len(), 1);

        let mv = pool.acquire();
        assert_eq!(mv.op, MoveOp::None);
        assert!(mv.param1.is_empty());
        assert!(mv.undo_parent.is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut pool = MovePool::with_capacity(2);
        for _ in 0..5 {
            let mv = pool.acquire();
            pool.release(mv);
        }
        let (a, b, c) = (pool.acquire(), pool.acquire(), pool.acquire());
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_move_op_indices_are_dense() {
        let ops = [
            MoveOp::Rotate,
            MoveOp::Move,
            MoveOp::Swap,
            MoveOp::ChangeRep,
            MoveOp::ConvertSym,
        ];
        for (i, op) in ops.iter().enumerate() {
            assert_eq!(op.index(), i);
        }
    }
}
