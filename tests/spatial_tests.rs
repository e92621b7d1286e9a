use ndarray::{arr2, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use slipstream::spatial::CellTree;

fn random_points(n: usize, dim: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, dim), |_| rng.gen::<f64>() * 4.0 - 2.0)
}

#[test]
fn root_counts_every_point() {
    let pts = random_points(200, 2, 42);
    let tree = CellTree::<2>::build(pts.view());
    assert_eq!(tree.root().unwrap().count, 200);
}

#[test]
fn root_centroid_is_the_arithmetic_mean() {
    let pts = random_points(150, 3, 7);
    let tree = CellTree::<3>::build(pts.view());
    let root = tree.root().unwrap();
    for d in 0..3 {
        let mean: f64 = (0..150).map(|i| pts[[i, d]]).sum::<f64>() / 150.0;
        assert!(
            (root.centroid[d] - mean).abs() < 1e-9,
            "axis {d}: centroid {} vs mean {mean}",
            root.centroid[d]
        );
    }
}

#[test]
fn accepting_the_root_visits_exactly_one_cell() {
    let pts = random_points(64, 2, 3);
    let tree = CellTree::<2>::build(pts.view());
    let mut visited = 0;
    tree.visit(|_| {
        visited += 1;
        true
    });
    assert_eq!(visited, 1);
}

#[test]
fn rejecting_everything_reaches_every_point_once() {
    let pts = random_points(100, 2, 17);
    let tree = CellTree::<2>::build(pts.view());
    let mut leaf_points = 0u32;
    tree.visit(|cell| {
        if cell.is_leaf() {
            leaf_points += cell.count;
        }
        false
    });
    assert_eq!(leaf_points, 100);
}

#[test]
fn coincident_points_degenerate_to_a_single_leaf() {
    let pts = arr2(&[[1.5, -2.0], [1.5, -2.0], [1.5, -2.0], [1.5, -2.0]]);
    let tree = CellTree::<2>::build(pts.view());
    assert_eq!(tree.len(), 1);
    let root = tree.root().unwrap();
    assert!(root.is_leaf());
    assert_eq!(root.count, 4);
    assert_eq!(root.centroid, [1.5, -2.0]);
}

#[test]
fn rebuilding_the_same_points_gives_the_same_tree() {
    let pts = random_points(80, 3, 29);
    let collect = |tree: &CellTree<3>| {
        let mut seen = Vec::new();
        tree.visit(|cell| {
            seen.push((cell.count, cell.extent, cell.centroid));
            false
        });
        seen
    };
    let a = CellTree::<3>::build(pts.view());
    let b = CellTree::<3>::build(pts.view());
    assert_eq!(collect(&a), collect(&b));
}

#[test]
fn extent_is_the_first_axis_side_length() {
    let pts = arr2(&[[0.0, 0.0], [4.0, 1.0]]);
    let tree = CellTree::<2>::build(pts.view());
    assert_eq!(tree.root().unwrap().extent, 4.0);
}
