//! Integration tests for symplace-floorplan.

use std::thread;
use std::time::Duration;
use symplace_core::AnnealConfig;
use symplace_floorplan::{
    parse_problem, HbStarTree, Module, PlaceResult, PlacementSolver, SolverConfig, SymmetryAxis,
    SymmetryGroup,
};

fn quick_anneal(seed: u64) -> AnnealConfig {
    AnnealConfig::new()
        .with_initial_temperature(500.0)
        .with_final_temperature(10.0)
        .with_cooling_rate(0.85)
        .with_moves_per_temperature(80)
        .with_seed(seed)
}

fn find<'a>(result: &'a PlaceResult, name: &str) -> &'a symplace_core::Placement {
    result
        .placements
        .iter()
        .find(|p| p.name == name)
        .unwrap_or_else(|| panic!("{} missing from placements", name))
}

fn assert_no_overlaps(result: &PlaceResult, dims: &[(&str, i64, i64)]) {
    let rect = |name: &str| {
        let p = find(result, name);
        let &(_, w, h) = dims.iter().find(|(n, _, _)| *n == name).unwrap();
        let (w, h) = if p.rotated { (h, w) } else { (w, h) };
        (p.x, p.y, p.x + w, p.y + h)
    };
    for (i, &(a, _, _)) in dims.iter().enumerate() {
        for &(b, _, _) in &dims[i + 1..] {
            let ra = rect(a);
            let rb = rect(b);
            let overlaps = ra.0 < rb.2 && ra.2 > rb.0 && ra.1 < rb.3 && ra.3 > rb.1;
            assert!(!overlaps, "{} overlaps {}", a, b);
        }
    }
}

mod symmetry_scenarios {
    use super::*;

    /// Two mirror pairs about one vertical axis.
    #[test]
    fn test_two_pair_vertical_symmetry() {
        let dims = [
            ("a", 10, 10),
            ("b", 10, 10),
            ("c", 10, 10),
            ("d", 10, 10),
        ];
        let modules: Vec<Module> = dims.iter().map(|&(n, w, h)| Module::new(n, w, h)).collect();
        let mut group = SymmetryGroup::new("g1", SymmetryAxis::Vertical);
        group.add_pair("a", "b");
        group.add_pair("c", "d");

        let solver = PlacementSolver::new(SolverConfig::new().with_anneal(quick_anneal(1)));
        let result = solver.solve(modules, vec![group]).unwrap();

        assert!(result.is_successful());
        assert_no_overlaps(&result, &dims);
        assert!(result.area >= 400);
        assert!(result.area <= 800);

        // Pairs share y and rotation; their x-centers are equidistant from
        // one common axis.
        let (a, b) = (find(&result, "a"), find(&result, "b"));
        let (c, d) = (find(&result, "c"), find(&result, "d"));
        assert_eq!(a.y, b.y);
        assert_eq!(c.y, d.y);
        assert_eq!(a.rotated, b.rotated);

        // All modules are 10x10 squares, so the doubled centers are
        // 2x + 10 regardless of rotation.
        let axis_ab = (2 * a.x + 10) + (2 * b.x + 10);
        let axis_cd = (2 * c.x + 10) + (2 * d.x + 10);
        assert_eq!(axis_ab, axis_cd, "both pairs mirror about the same axis");
    }

    /// A self-symmetric module centered on the axis, plus one pair.
    #[test]
    fn test_self_symmetric_vertical() {
        let dims = [("a", 20, 5), ("b", 5, 5), ("c", 5, 5)];
        let modules: Vec<Module> = dims.iter().map(|&(n, w, h)| Module::new(n, w, h)).collect();
        let mut group = SymmetryGroup::new("g1", SymmetryAxis::Vertical);
        group.add_pair("b", "c");
        group.add_self_symmetric("a");

        let solver = PlacementSolver::new(SolverConfig::new().with_anneal(quick_anneal(2)));
        let result = solver.solve(modules, vec![group]).unwrap();

        assert!(result.is_successful());
        assert_no_overlaps(&result, &dims);
        assert!(result.area <= 200);

        // b and c mirror about a's center line. The search may have
        // flipped the group's axis, so check whichever orientation the
        // final placement uses.
        let (a, b, c) = (find(&result, "a"), find(&result, "b"), find(&result, "c"));
        let (a_w, a_h) = if a.rotated { (5, 20) } else { (20, 5) };
        if b.y == c.y {
            // Vertical axis: x-centers mirror about a's x-center.
            let axis_x2 = 2 * a.x + a_w;
            assert_eq!((2 * b.x + 5) + (2 * c.x + 5), 2 * axis_x2);
        } else {
            // Horizontal axis: y-centers mirror about a's y-center.
            assert_eq!(b.x, c.x);
            let axis_y2 = 2 * a.y + a_h;
            assert_eq!((2 * b.y + 5) + (2 * c.y + 5), 2 * axis_y2);
        }
    }

    /// One symmetry group composed with a free module.
    #[test]
    fn test_group_with_free_module() {
        let dims = [
            ("a", 10, 10),
            ("b", 10, 10),
            ("c", 10, 10),
            ("d", 10, 10),
            ("e", 30, 5),
        ];
        let modules: Vec<Module> = dims.iter().map(|&(n, w, h)| Module::new(n, w, h)).collect();
        let mut group = SymmetryGroup::new("g1", SymmetryAxis::Vertical);
        group.add_pair("a", "b");
        group.add_pair("c", "d");

        let solver = PlacementSolver::new(
            SolverConfig::new()
                .with_area_ratio(1.0)
                .with_anneal(quick_anneal(3)),
        );
        let result = solver.solve(modules, vec![group]).unwrap();

        assert!(result.is_successful());
        assert_no_overlaps(&result, &dims);

        let (a, b) = (find(&result, "a"), find(&result, "b"));
        assert_eq!(a.y, b.y);
        assert_eq!(a.rotated, b.rotated);
        assert!(result.best_cost <= result.initial_cost);
    }
}

mod determinism {
    use super::*;

    /// Rotating twice and repacking twice restores the exact placement.
    #[test]
    fn test_rotate_rotate_is_identity() {
        let modules = vec![
            Module::new("a", 30, 10),
            Module::new("b", 10, 20),
            Module::new("c", 15, 15),
            Module::new("d", 5, 25),
        ];
        let mut tree = HbStarTree::new(modules, Vec::new()).unwrap();
        tree.build_initial_tree();
        tree.pack().unwrap();

        let before: Vec<(i64, i64)> = tree.modules().iter().map(|m| (m.x(), m.y())).collect();

        assert!(tree.rotate_module("b"));
        tree.pack().unwrap();
        assert!(tree.rotate_module("b"));
        tree.pack().unwrap();

        let after: Vec<(i64, i64)> = tree.modules().iter().map(|m| (m.x(), m.y())).collect();
        assert_eq!(before, after);
    }

    /// The same seed reproduces the same placement.
    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let modules = vec![
                Module::new("a", 12, 8),
                Module::new("b", 8, 12),
                Module::new("c", 10, 10),
            ];
            let solver =
                PlacementSolver::new(SolverConfig::new().with_anneal(quick_anneal(77)));
            solver.solve(modules, Vec::new()).unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first.area, second.area);
        assert_eq!(first.placements, second.placements);
    }
}

mod termination {
    use super::*;

    /// A cooperative stop returns the best-so-far placement, not an error.
    #[test]
    fn test_timeout_returns_best() {
        let dims: Vec<(String, i64, i64)> = (0..24)
            .map(|i| (format!("m{}", i), 5 + (i % 7) * 3, 4 + (i % 5) * 4))
            .collect();
        let modules: Vec<Module> = dims
            .iter()
            .map(|(n, w, h)| Module::new(n.clone(), *w, *h))
            .collect();

        // A schedule that would run for a long time without the stop.
        let anneal = AnnealConfig::new()
            .with_initial_temperature(5000.0)
            .with_final_temperature(0.01)
            .with_cooling_rate(0.999)
            .with_moves_per_temperature(2000)
            .with_seed(5);
        let solver = PlacementSolver::new(SolverConfig::new().with_anneal(anneal));

        let stop = solver.stop_handle();
        let watcher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            stop.request();
        });

        let result = solver.solve(modules, Vec::new()).unwrap();
        watcher.join().unwrap();

        assert!(result.cancelled);
        assert!(result.is_successful());
        assert!(result.best_cost <= result.initial_cost);
        assert_eq!(result.placements.len(), 24);
    }

    /// Zero moves per temperature degenerates to the initial placement.
    #[test]
    fn test_zero_moves_returns_initial() {
        let modules = vec![Module::new("a", 10, 10), Module::new("b", 20, 5)];
        let anneal = AnnealConfig::new()
            .with_initial_temperature(100.0)
            .with_final_temperature(50.0)
            .with_moves_per_temperature(0)
            .with_seed(1);
        let solver = PlacementSolver::new(SolverConfig::new().with_anneal(anneal));

        let result = solver.solve(modules, Vec::new()).unwrap();
        assert!(result.is_successful());
        assert_eq!(result.iterations, 0);
        assert_eq!(result.best_cost, result.initial_cost);
    }
}

mod end_to_end {
    use super::*;

    /// Parse, solve, and format: the full pipeline on a textual problem.
    #[test]
    fn test_parse_solve_format() {
        let text = "\
NumHardRectilinearBlocks : 5
blk1 hardrectilinear 4 (0,0) (0,10) (10,10) (10,0)
blk2 hardrectilinear 4 (0,0) (0,10) (10,10) (10,0)
blk3 hardrectilinear 4 (0,0) (0,8) (8,8) (8,0)
blk4 hardrectilinear 4 (0,0) (0,8) (8,8) (8,0)
osc hardrectilinear 4 (0,0) (0,6) (24,6) (24,0)
NumSymGroups : 1
SymGroup : sg1 4
SymPair blk1 blk2
SymPair blk3 blk4
";
        let (modules, groups) = parse_problem(text).unwrap();
        assert_eq!(modules.len(), 5);
        assert_eq!(groups.len(), 1);

        let solver = PlacementSolver::new(SolverConfig::new().with_anneal(quick_anneal(21)));
        let result = solver.solve(modules, groups).unwrap();
        assert!(result.is_successful());

        let output = symplace_floorplan::format_placement(&result.placements, result.area);
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some(format!("A={}", result.area).as_str()));
        assert_eq!(lines.count(), 5);
    }

    /// Larger mixed problem: symmetry invariants under a longer search.
    #[test]
    fn test_mixed_problem_invariants() {
        let mut dims: Vec<(String, i64, i64)> = vec![
            ("p0".into(), 12, 6),
            ("p1".into(), 12, 6),
            ("q0".into(), 8, 8),
            ("q1".into(), 8, 8),
            ("mid".into(), 10, 14),
        ];
        for i in 0..6 {
            dims.push((format!("f{}", i), 6 + i as i64 * 2, 9));
        }
        let modules: Vec<Module> = dims
            .iter()
            .map(|(n, w, h)| Module::new(n.clone(), *w, *h))
            .collect();

        let mut group = SymmetryGroup::new("core", SymmetryAxis::Vertical);
        group.add_pair("p0", "p1");
        group.add_pair("q0", "q1");
        group.add_self_symmetric("mid");

        let solver = PlacementSolver::new(SolverConfig::new().with_anneal(quick_anneal(33)));
        let result = solver.solve(modules, vec![group]).unwrap();
        assert!(result.is_successful());
        assert_eq!(result.placements.len(), 11);

        // Pair invariants hold regardless of which axis orientation the
        // search settled on.
        let (p0, p1) = (find(&result, "p0"), find(&result, "p1"));
        assert_eq!(p0.rotated, p1.rotated);
        assert!(p0.y == p1.y || p0.x == p1.x);
    }
}
