use serde::{Serialize, Deserialize};

/// One entry of the k-nearest-neighbor table: a neighbor index paired with
/// the distance measured in the original (high-dimensional) feature space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub index: usize,
    pub dist: f64,
}

impl Neighbor {
    pub fn new(index: usize, dist: f64) -> Self {
        Self { index, dist }
    }
}

/// The neighbors of a single point, ordered by the producer of the graph.
pub type NeighborRow = Vec<Neighbor>;

/// The full kNN table. `table[i][k]` is the k-th neighbor of point `i`;
/// every row must have the same length.
pub type NeighborTable = Vec<NeighborRow>;
