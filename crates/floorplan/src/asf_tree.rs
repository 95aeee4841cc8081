//! ASF-B*-tree: placement of one symmetry group.
//!
//! Only the *representatives* of the group appear as tree nodes: one module
//! of each symmetry pair plus every self-symmetric module. Packing places
//! the representatives with the usual B*-tree contour rules in a local
//! frame whose symmetry axis runs through coordinate zero, then
//! materializes the other half of each pair by mirroring about that axis
//! and finally shifts the whole island into the first quadrant.
//!
//! The axis position is locked by construction: it is the boundary spine
//! line of the tree (local zero), tracked exactly under translation in
//! doubled coordinates. It is never re-derived from packed positions, so
//! mirror arithmetic stays exact across repacks.
//!
//! Nodes live in an index arena; the tree is rewired by swapping indices,
//! never by touching owned data. Modules themselves are stored by the
//! enclosing floorplan and passed in by slice.

use crate::contour::Contour;
use crate::module::{Module, ModuleId};
use crate::symmetry::{SymmetryAxis, SymmetryGroup};
use std::collections::{HashMap, VecDeque};

/// Index of a node in the ASF arena.
pub type AsfNodeId = usize;

#[derive(Debug, Clone)]
struct AsfNode {
    module: ModuleId,
    parent: Option<AsfNodeId>,
    left: Option<AsfNodeId>,
    right: Option<AsfNodeId>,
}

/// Undo record for one internal rewire.
struct RewireRecord {
    node: AsfNodeId,
    old_parent: Option<AsfNodeId>,
    old_as_left: bool,
    new_parent: AsfNodeId,
    new_as_left: bool,
    displaced: Option<(AsfNodeId, AsfNodeId, bool)>,
}

/// B*-tree over the representatives of one symmetry group.
#[derive(Debug, Clone)]
pub struct AsfBStarTree {
    group: SymmetryGroup,
    /// All member module ids, in group declaration order.
    members: Vec<ModuleId>,
    /// Pair ids in declaration order.
    pairs: Vec<(ModuleId, ModuleId)>,
    /// Self-symmetric module ids.
    self_symmetric: Vec<ModuleId>,
    /// Pair member -> its current representative (representatives map to
    /// themselves, as do self-symmetric modules).
    rep_of: HashMap<ModuleId, ModuleId>,
    nodes: Vec<AsfNode>,
    node_of: HashMap<ModuleId, AsfNodeId>,
    root: Option<AsfNodeId>,
    horizontal: Contour,
    vertical: Contour,
    /// Doubled axis position in committed coordinates (x for a vertical
    /// axis, y for a horizontal one). Valid after a pack.
    axis_pos_x2: i64,
    axis_locked: bool,
}

impl AsfBStarTree {
    /// Creates the tree for a group, resolving member names through `ids`.
    ///
    /// The caller guarantees every member name resolves. Representatives
    /// default to the lexicographically larger name of each pair.
    pub fn new(group: SymmetryGroup, ids: &HashMap<String, ModuleId>) -> Self {
        let mut members = Vec::new();
        let mut pairs = Vec::new();
        let mut self_symmetric = Vec::new();
        let mut rep_of = HashMap::new();

        for (a, b) in group.pairs() {
            let ia = ids[a.as_str()];
            let ib = ids[b.as_str()];
            let rep = if SymmetryGroup::default_representative(a, b) == a {
                ia
            } else {
                ib
            };
            rep_of.insert(ia, rep);
            rep_of.insert(ib, rep);
            pairs.push((ia, ib));
            members.push(ia);
            members.push(ib);
        }
        for name in group.self_symmetric() {
            let id = ids[name.as_str()];
            rep_of.insert(id, id);
            self_symmetric.push(id);
            members.push(id);
        }

        Self {
            group,
            members,
            pairs,
            self_symmetric,
            rep_of,
            nodes: Vec::new(),
            node_of: HashMap::new(),
            root: None,
            horizontal: Contour::new(),
            vertical: Contour::new(),
            axis_pos_x2: 0,
            axis_locked: false,
        }
    }

    /// The symmetry group this tree places.
    pub fn group(&self) -> &SymmetryGroup {
        &self.group
    }

    /// All member module ids.
    pub fn members(&self) -> &[ModuleId] {
        &self.members
    }

    /// The pair ids of the group.
    pub fn pairs(&self) -> &[(ModuleId, ModuleId)] {
        &self.pairs
    }

    /// Doubled axis position in committed coordinates.
    pub fn axis_pos_x2(&self) -> i64 {
        self.axis_pos_x2
    }

    /// Whether the axis has been locked by a pack. Only
    /// [`convert_symmetry_type`](Self::convert_symmetry_type) unlocks it,
    /// and the next pack re-locks with the flipped orientation.
    pub fn axis_locked(&self) -> bool {
        self.axis_locked
    }

    /// The horizontal contour of the last pack, in committed coordinates.
    pub fn horizontal_contour(&self) -> &Contour {
        &self.horizontal
    }

    /// Current representatives: one module per pair plus self-symmetric
    /// modules, in declaration order.
    pub fn representative_ids(&self) -> Vec<ModuleId> {
        let mut reps: Vec<ModuleId> = self.pairs.iter().map(|&(a, _)| self.rep_of[&a]).collect();
        reps.extend(&self.self_symmetric);
        reps
    }

    /// Returns true if the module currently represents its pair (or is
    /// self-symmetric).
    pub fn is_representative(&self, module: ModuleId) -> bool {
        self.rep_of.get(&module) == Some(&module)
    }

    /// Returns true if the module belongs to this group.
    pub fn contains(&self, module: ModuleId) -> bool {
        self.rep_of.contains_key(&module)
    }

    fn is_self_symmetric(&self, module: ModuleId) -> bool {
        self.self_symmetric.contains(&module)
    }

    /// The tree parent of a representative's node: `(parent module,
    /// attached as left child)`. None for the root or non-nodes.
    pub fn parent_of(&self, module: ModuleId) -> Option<(ModuleId, bool)> {
        let &node = self.node_of.get(&module)?;
        let parent = self.nodes[node].parent?;
        Some((
            self.nodes[parent].module,
            self.nodes[parent].left == Some(node),
        ))
    }

    /// The module in the given child slot of a representative's node.
    pub fn child_of(&self, module: ModuleId, as_left: bool) -> Option<ModuleId> {
        let &node = self.node_of.get(&module)?;
        let child = if as_left {
            self.nodes[node].left
        } else {
            self.nodes[node].right
        }?;
        Some(self.nodes[child].module)
    }

    /// Builds the deterministic initial tree: representatives sorted by
    /// area descending, self-symmetric modules kept on the boundary spine
    /// that abuts the axis.
    pub fn build_initial_tree(&mut self, modules: &[Module]) {
        self.nodes.clear();
        self.node_of.clear();
        self.root = None;

        let mut reps = self.representative_ids();
        if reps.is_empty() {
            return;
        }
        reps.sort_by(|&a, &b| {
            modules[b]
                .area()
                .cmp(&modules[a].area())
                .then_with(|| modules[a].name().cmp(modules[b].name()))
        });

        let root = self.alloc_node(reps[0]);
        self.root = Some(root);

        for &rep in &reps[1..] {
            let node = self.alloc_node(rep);
            if self.is_self_symmetric(rep) && self.group.axis() == SymmetryAxis::Vertical {
                // Deepest node of the right spine keeps the module on the
                // axis-abutting column.
                let mut current = root;
                while let Some(next) = self.nodes[current].right {
                    current = next;
                }
                self.nodes[current].right = Some(node);
                self.nodes[node].parent = Some(current);
            } else if self.is_self_symmetric(rep) {
                let mut current = root;
                while let Some(next) = self.nodes[current].left {
                    current = next;
                }
                self.nodes[current].left = Some(node);
                self.nodes[node].parent = Some(current);
            } else {
                let mut current = root;
                while let Some(next) = self.nodes[current].right {
                    current = next;
                }
                self.nodes[current].right = Some(node);
                self.nodes[node].parent = Some(current);
            }
        }
    }

    fn alloc_node(&mut self, module: ModuleId) -> AsfNodeId {
        let id = self.nodes.len();
        self.nodes.push(AsfNode {
            module,
            parent: None,
            left: None,
            right: None,
        });
        self.node_of.insert(module, id);
        id
    }

    /// Packs the whole group: representatives by contour rules, then the
    /// mirror pass, then a shift into the first quadrant.
    ///
    /// Returns false when the tree has no nodes.
    pub fn pack(&mut self, modules: &mut [Module]) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        self.axis_locked = true;
        self.horizontal.clear();
        self.vertical.clear();

        // Representatives first, parents before children.
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(id) = queue.pop_front() {
            self.pack_node(id, modules);
            if let Some(left) = self.nodes[id].left {
                queue.push_back(left);
            }
            if let Some(right) = self.nodes[id].right {
                queue.push_back(right);
            }
        }

        self.mirror_non_representatives(modules);
        self.normalize(modules);
        true
    }

    /// Places one representative relative to its parent and the contour.
    fn pack_node(&mut self, id: AsfNodeId, modules: &mut [Module]) {
        let module_id = self.nodes[id].module;

        let mut x = match self.nodes[id].parent {
            None => 0,
            Some(parent) => {
                let parent_module = &modules[self.nodes[parent].module];
                if self.nodes[parent].left == Some(id) {
                    parent_module.right()
                } else {
                    parent_module.x()
                }
            }
        };

        let width = modules[module_id].width();
        let height = modules[module_id].height();
        let mut y = self.horizontal.height_in(x, x + width);

        if self.is_self_symmetric(module_id) {
            // Center on the axis (local coordinate zero). The module may
            // reach into the mirror half-plane; y keeps the value derived
            // from the parent slot.
            match self.group.axis() {
                SymmetryAxis::Vertical => {
                    x = (-width).div_euclid(2);
                }
                SymmetryAxis::Horizontal => {
                    y = (-height).div_euclid(2);
                }
            }
        }

        modules[module_id].set_position(x, y);
        self.horizontal.raise(x, x + width, y + height);
        self.vertical.raise(y, y + height, x + width);
    }

    /// Places every non-representative at the exact mirror of its pair's
    /// representative, copying the rotation flag.
    fn mirror_non_representatives(&self, modules: &mut [Module]) {
        for &(a, b) in &self.pairs {
            let rep = self.rep_of[&a];
            let non_rep = if rep == a { b } else { a };

            let rotated = modules[rep].rotated();
            modules[non_rep].set_rotated(rotated);

            match self.group.axis() {
                SymmetryAxis::Vertical => {
                    // Reflected doubled center about the local axis (zero),
                    // sharing the representative's y.
                    let center_x2 = -modules[rep].center_x2();
                    let x = (center_x2 - modules[non_rep].width()).div_euclid(2);
                    let y = modules[rep].y();
                    modules[non_rep].set_position(x, y);
                }
                SymmetryAxis::Horizontal => {
                    let center_y2 = -modules[rep].center_y2();
                    let y = (center_y2 - modules[non_rep].height()).div_euclid(2);
                    let x = modules[rep].x();
                    modules[non_rep].set_position(x, y);
                }
            }
        }
    }

    /// Shifts the island into the first quadrant and records the committed
    /// axis position. Rebuilds the contours over committed coordinates.
    fn normalize(&mut self, modules: &mut [Module]) {
        let mut min_x = i64::MAX;
        let mut min_y = i64::MAX;
        for &m in &self.members {
            min_x = min_x.min(modules[m].x());
            min_y = min_y.min(modules[m].y());
        }
        if min_x == i64::MAX {
            return;
        }

        let dx = -min_x;
        let dy = -min_y;
        if dx != 0 || dy != 0 {
            for &m in &self.members {
                modules[m].translate(dx, dy);
            }
        }
        self.axis_pos_x2 = match self.group.axis() {
            SymmetryAxis::Vertical => 2 * dx,
            SymmetryAxis::Horizontal => 2 * dy,
        };
        self.rebuild_contours(modules);
    }

    /// Rebuilds both contours from the committed member positions.
    fn rebuild_contours(&mut self, modules: &[Module]) {
        self.horizontal.clear();
        self.vertical.clear();
        for &m in &self.members {
            let module = &modules[m];
            self.horizontal
                .raise(module.x(), module.right(), module.top());
            self.vertical
                .raise(module.y(), module.top(), module.right());
        }
    }

    /// Shifts the whole committed island, tracking the axis exactly.
    pub fn translate(&mut self, dx: i64, dy: i64, modules: &mut [Module]) {
        for &m in &self.members {
            modules[m].translate(dx, dy);
        }
        self.axis_pos_x2 += match self.group.axis() {
            SymmetryAxis::Vertical => 2 * dx,
            SymmetryAxis::Horizontal => 2 * dy,
        };
        self.rebuild_contours(modules);
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of the island.
    pub fn bounding_box(&self, modules: &[Module]) -> Option<(i64, i64, i64, i64)> {
        let mut bbox: Option<(i64, i64, i64, i64)> = None;
        for &m in &self.members {
            let module = &modules[m];
            let entry = bbox.get_or_insert((i64::MAX, i64::MAX, i64::MIN, i64::MIN));
            entry.0 = entry.0.min(module.x());
            entry.1 = entry.1.min(module.y());
            entry.2 = entry.2.max(module.right());
            entry.3 = entry.3.max(module.top());
        }
        bbox
    }

    /// Checks that every self-symmetric module sits on the boundary spine
    /// matching the axis: the rightmost branch for a vertical axis, the
    /// leftmost for a horizontal one.
    pub fn is_symmetric_feasible(&self) -> bool {
        for &m in &self.self_symmetric {
            let Some(&node) = self.node_of.get(&m) else {
                continue;
            };
            let mut current = node;
            while let Some(parent) = self.nodes[current].parent {
                let on_wrong_side = match self.group.axis() {
                    SymmetryAxis::Vertical => self.nodes[parent].left == Some(current),
                    SymmetryAxis::Horizontal => self.nodes[parent].right == Some(current),
                };
                if on_wrong_side {
                    return false;
                }
                current = parent;
            }
        }
        true
    }

    /// Rotates a representative. Coordinates are recomputed at the next
    /// pack. Fails for non-representatives.
    pub fn rotate_module(&mut self, module: ModuleId, modules: &mut [Module]) -> bool {
        if !self.is_representative(module) {
            return false;
        }
        modules[module].rotate();
        true
    }

    /// Rewires a representative node under a new parent.
    ///
    /// Fails (leaving the tree unchanged) when either name is not a
    /// representative node, the move would create a cycle, or a
    /// self-symmetric module would leave its boundary spine.
    pub fn move_node(&mut self, module: ModuleId, new_parent: ModuleId, as_left: bool) -> bool {
        let (Some(&node), Some(&parent)) =
            (self.node_of.get(&module), self.node_of.get(&new_parent))
        else {
            return false;
        };
        if node == parent || self.is_in_subtree(parent, node) {
            return false;
        }

        let record = self.rewire(node, parent, as_left);
        if !self.is_symmetric_feasible() {
            self.revert_rewire(record);
            return false;
        }
        true
    }

    /// Returns true if `candidate` lies in the subtree rooted at `root`.
    fn is_in_subtree(&self, candidate: AsfNodeId, root: AsfNodeId) -> bool {
        let mut current = Some(candidate);
        while let Some(id) = current {
            if id == root {
                return true;
            }
            current = self.nodes[id].parent;
        }
        false
    }

    /// Detaches `node` and reattaches it under `parent`; an existing child
    /// in the target slot is pushed into `node`'s spare slot or its deepest
    /// left descendant.
    fn rewire(&mut self, node: AsfNodeId, parent: AsfNodeId, as_left: bool) -> RewireRecord {
        let old_parent = self.nodes[node].parent;
        let old_as_left = old_parent.is_some_and(|p| self.nodes[p].left == Some(node));

        if let Some(p) = old_parent {
            if old_as_left {
                self.nodes[p].left = None;
            } else {
                self.nodes[p].right = None;
            }
        }

        let slot = if as_left {
            self.nodes[parent].left
        } else {
            self.nodes[parent].right
        };
        let displaced = slot.map(|existing| {
            let (host, host_as_left) = if self.nodes[node].left.is_none() {
                (node, true)
            } else if self.nodes[node].right.is_none() {
                (node, false)
            } else {
                let mut current = self.nodes[node].left.expect("left child checked");
                while let Some(next) = self.nodes[current].left {
                    current = next;
                }
                (current, true)
            };
            if host_as_left {
                self.nodes[host].left = Some(existing);
            } else {
                self.nodes[host].right = Some(existing);
            }
            self.nodes[existing].parent = Some(host);
            (existing, host, host_as_left)
        });

        if as_left {
            self.nodes[parent].left = Some(node);
        } else {
            self.nodes[parent].right = Some(node);
        }
        self.nodes[node].parent = Some(parent);

        RewireRecord {
            node,
            old_parent,
            old_as_left,
            new_parent: parent,
            new_as_left: as_left,
            displaced,
        }
    }

    fn revert_rewire(&mut self, record: RewireRecord) {
        // Inverse order: pull the displaced child back out, detach the
        // node, restore both to their original slots.
        if let Some((displaced, host, host_as_left)) = record.displaced {
            if host_as_left {
                self.nodes[host].left = None;
            } else {
                self.nodes[host].right = None;
            }
            self.nodes[displaced].parent = Some(record.new_parent);
        }

        if record.new_as_left {
            self.nodes[record.new_parent].left = record.displaced.map(|(d, _, _)| d);
        } else {
            self.nodes[record.new_parent].right = record.displaced.map(|(d, _, _)| d);
        }

        self.nodes[record.node].parent = record.old_parent;
        if let Some(p) = record.old_parent {
            if record.old_as_left {
                self.nodes[p].left = Some(record.node);
            } else {
                self.nodes[p].right = Some(record.node);
            }
        }
    }

    /// Swaps the tree positions of two representatives by exchanging their
    /// payloads. Rejects a mix of self-symmetric and paired modules.
    pub fn swap_nodes(&mut self, a: ModuleId, b: ModuleId) -> bool {
        if a == b {
            return false;
        }
        let (Some(&na), Some(&nb)) = (self.node_of.get(&a), self.node_of.get(&b)) else {
            return false;
        };
        if self.is_self_symmetric(a) != self.is_self_symmetric(b) {
            return false;
        }

        self.nodes[na].module = b;
        self.nodes[nb].module = a;
        self.node_of.insert(a, nb);
        self.node_of.insert(b, na);
        true
    }

    /// Flips which module of a pair is the representative and rebuilds the
    /// tree. Fails for modules outside any pair.
    pub fn change_representative(&mut self, module: ModuleId, modules: &[Module]) -> bool {
        let Some(&(a, b)) = self
            .pairs
            .iter()
            .find(|&&(a, b)| a == module || b == module)
        else {
            return false;
        };

        let new_rep = if self.rep_of[&a] == a { b } else { a };
        self.rep_of.insert(a, new_rep);
        self.rep_of.insert(b, new_rep);
        self.build_initial_tree(modules);
        true
    }

    /// Flips the symmetry axis, re-locks it, rotates every member once and
    /// rebuilds the tree.
    pub fn convert_symmetry_type(&mut self, modules: &mut [Module]) -> bool {
        self.group.flip_axis();
        self.axis_locked = false;

        for &m in &self.members {
            modules[m].rotate();
        }
        self.build_initial_tree(modules);
        self.axis_pos_x2 = 0;
        true
    }
}
