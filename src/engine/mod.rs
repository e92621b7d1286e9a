//! The embedding engine facade.
//!
//! [`Embedder`] owns the probability matrix and the solution arrays and
//! drives the per-step pipeline: build and annotate a fresh tree from the
//! current embedding, evaluate the gradient, apply the adaptive update.
//! Dimension-specific inner loops are monomorphized over D and selected by
//! an exhaustive match on the validated configuration.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::affinity::{self, DEFAULT_TOLERANCE};
use crate::errors::{EmbedError, EmbedResult};
use crate::gradient;
use crate::metric::dist2;
use crate::optim;
use crate::sampler::{Gaussian, UniformSource};
use crate::spatial::point_at;
use crate::types::NeighborTable;

/// Attractive-force multiplier while `iter < EXAGGERATION_END`.
const EXAGGERATION: f64 = 4.0;
const EXAGGERATION_END: usize = 100;
/// Standard deviation of the random initial embedding.
const INIT_SIGMA: f64 = 1e-4;
/// Guard against ln(0) in the KL diagnostic.
const COST_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderOptions {
    /// Embedding dimensionality; 2 and 3 are supported.
    pub dim: usize,
    /// Target perplexity of each point's neighborhood distribution. The
    /// caller is responsible for keeping it at or below the neighbor
    /// count.
    pub perplexity: f64,
    /// Learning rate of the gradient-descent update.
    pub epsilon: f64,
    /// Barnes-Hut acceptance threshold. Leave at the default; 0 disables
    /// the approximation entirely (exact evaluation, test use only).
    pub theta: f64,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            dim: 2,
            perplexity: 30.0,
            epsilon: 10.0,
            theta: 0.8,
        }
    }
}

struct State {
    neighbors: NeighborTable,
    affinities: Array2<f64>,
    y: Array2<f64>,
    gains: Array2<f64>,
    steps: Array2<f64>,
    iter: usize,
}

pub struct Embedder {
    options: EmbedderOptions,
    sampler: Gaussian,
    state: Option<State>,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("options", &self.options)
            .field("points", &self.len())
            .field("iteration", &self.iteration())
            .finish()
    }
}

impl Embedder {
    /// Engine with an entropy-seeded uniform source.
    pub fn new(options: EmbedderOptions) -> EmbedResult<Self> {
        Self::with_sampler(options, Gaussian::from_entropy())
    }

    /// Engine with a deterministic, seed-derived uniform source.
    pub fn with_seed(options: EmbedderOptions, seed: u64) -> EmbedResult<Self> {
        Self::with_sampler(options, Gaussian::from_seed(seed))
    }

    /// Engine drawing uniforms in [0,1) from the given source.
    pub fn with_source(options: EmbedderOptions, source: UniformSource) -> EmbedResult<Self> {
        Self::with_sampler(options, Gaussian::from_source(source))
    }

    fn with_sampler(options: EmbedderOptions, sampler: Gaussian) -> EmbedResult<Self> {
        if options.dim != 2 && options.dim != 3 {
            return Err(EmbedError::UnsupportedDimension(options.dim));
        }
        Ok(Self {
            options,
            sampler,
            state: None,
        })
    }

    pub fn options(&self) -> &EmbedderOptions {
        &self.options
    }

    pub fn dim(&self) -> usize {
        self.options.dim
    }

    /// Number of embedded points; 0 before initialization.
    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.y.nrows())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed optimization steps since the last solution reset.
    pub fn iteration(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.iter)
    }

    /// Supplies the kNN graph: validates the table, calibrates the joint
    /// probability matrix and (re)initializes the solution.
    pub fn init_neighbors(&mut self, neighbors: NeighborTable) -> EmbedResult<()> {
        validate_neighbors(&neighbors)?;
        let affinities =
            affinity::calibrate(&neighbors, self.options.perplexity, DEFAULT_TOLERANCE);
        let n = neighbors.len();
        let dim = self.options.dim;
        self.state = Some(State {
            neighbors,
            affinities,
            y: Array2::zeros((n, dim)),
            gains: Array2::zeros((n, dim)),
            steps: Array2::zeros((n, dim)),
            iter: 0,
        });
        self.init_solution();
        Ok(())
    }

    /// Resamples the embedding from N(0, 1e-4²) and resets gains, step
    /// memory and the iteration counter.
    pub fn init_solution(&mut self) {
        let sampler = &mut self.sampler;
        if let Some(state) = self.state.as_mut() {
            for v in state.y.iter_mut() {
                *v = sampler.randn(0.0, INIT_SIGMA);
            }
            state.gains.fill(1.0);
            state.steps.fill(0.0);
            state.iter = 0;
        }
    }

    /// One optimization step.
    #[tracing::instrument(skip(self), name = "embedding_step", fields(iter = self.iteration()))]
    pub fn step(&mut self) -> EmbedResult<()> {
        let theta = self.options.theta;
        let epsilon = self.options.epsilon;
        let dim = self.options.dim;
        let state = self.state.as_mut().ok_or(EmbedError::Uninitialized)?;
        match dim {
            2 => step_impl::<2>(state, theta, epsilon),
            3 => step_impl::<3>(state, theta, epsilon),
            other => return Err(EmbedError::UnsupportedDimension(other)),
        }
        Ok(())
    }

    /// Flat row-major view of the embedding, length N·D. Valid until the
    /// next mutating call.
    pub fn solution(&self) -> EmbedResult<&[f64]> {
        let state = self.state.as_ref().ok_or(EmbedError::Uninitialized)?;
        Ok(state
            .y
            .as_slice()
            .expect("embedding is stored in standard layout"))
    }

    /// The embedding as an N×D view.
    pub fn solution_view(&self) -> EmbedResult<ArrayView2<'_, f64>> {
        Ok(self
            .state
            .as_ref()
            .ok_or(EmbedError::Uninitialized)?
            .y
            .view())
    }

    /// Warm start: overwrites the embedding with a flat row-major vector,
    /// leaving gains, step memory and the iteration counter untouched.
    pub fn set_solution(&mut self, flat: &[f64]) -> EmbedResult<()> {
        let state = self.state.as_mut().ok_or(EmbedError::Uninitialized)?;
        if flat.len() != state.y.len() {
            return Err(EmbedError::DimensionMismatch {
                left: flat.len(),
                right: state.y.len(),
            });
        }
        state
            .y
            .as_slice_mut()
            .expect("embedding is stored in standard layout")
            .copy_from_slice(flat);
        Ok(())
    }

    /// KL-divergence diagnostic Σ P·ln(P/(Q+ε)) against the exact Q of the
    /// current embedding. O(N²); intended for monitoring and tests, not
    /// for the per-step path.
    pub fn cost(&self) -> EmbedResult<f64> {
        let state = self.state.as_ref().ok_or(EmbedError::Uninitialized)?;
        match self.options.dim {
            2 => Ok(cost_impl::<2>(state)),
            3 => Ok(cost_impl::<3>(state)),
            other => Err(EmbedError::UnsupportedDimension(other)),
        }
    }
}

fn step_impl<const D: usize>(state: &mut State, theta: f64, epsilon: f64) {
    let exaggeration = if state.iter < EXAGGERATION_END {
        EXAGGERATION
    } else {
        1.0
    };
    let (grad, _z) = gradient::evaluate::<D>(
        &state.y.view(),
        &state.affinities,
        &state.neighbors,
        theta,
        exaggeration,
    );
    optim::apply_step(
        &mut state.y,
        &mut state.gains,
        &mut state.steps,
        &grad,
        state.iter,
        epsilon,
    );
    state.iter += 1;
}

fn cost_impl<const D: usize>(state: &State) -> f64 {
    let n = state.y.nrows();
    let view = state.y.view();

    let mut z_sum = 0.0;
    for i in 0..n {
        let yi = point_at::<D>(&view, i);
        for j in 0..n {
            if j == i {
                continue;
            }
            let yj = point_at::<D>(&view, j);
            z_sum += 1.0 / (1.0 + dist2(&yi, &yj));
        }
    }

    let mut cost = 0.0;
    for i in 0..n {
        let yi = point_at::<D>(&view, i);
        for j in 0..n {
            if j == i {
                continue;
            }
            let p = state.affinities[[i, j]];
            if p <= 0.0 {
                continue;
            }
            let yj = point_at::<D>(&view, j);
            let q = (1.0 / (1.0 + dist2(&yi, &yj))) / z_sum;
            cost += p * (p / (q + COST_EPS)).ln();
        }
    }
    cost
}

fn validate_neighbors(neighbors: &NeighborTable) -> EmbedResult<()> {
    let n = neighbors.len();
    if n == 0 {
        return Err(EmbedError::InvalidNeighbors("table is empty".into()));
    }
    let k = neighbors[0].len();
    if k == 0 {
        return Err(EmbedError::InvalidNeighbors(
            "rows have no neighbors".into(),
        ));
    }
    for (i, row) in neighbors.iter().enumerate() {
        if row.len() != k {
            return Err(EmbedError::InvalidNeighbors(format!(
                "row {i} has {} neighbors, expected {k}",
                row.len()
            )));
        }
        for nb in row {
            if nb.index >= n {
                return Err(EmbedError::InvalidNeighbors(format!(
                    "row {i} references point {} outside 0..{n}",
                    nb.index
                )));
            }
        }
    }
    Ok(())
}
