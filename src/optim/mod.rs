//! Adaptive gradient-descent update with gain and momentum.

use ndarray::Array2;

const GAIN_FLOOR: f64 = 0.01;
const MOMENTUM_EARLY: f64 = 0.5;
const MOMENTUM_LATE: f64 = 0.8;
const MOMENTUM_SWITCH: usize = 250;

/// Three-valued sign: gain adaptation treats an exactly-zero gradient or
/// step as its own sign class.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Applies one update in place: per-coordinate gain adaptation, two-phase
/// momentum, the learning-rate-scaled descent step, and re-centering of
/// the embedding to zero column mean.
pub fn apply_step(
    y: &mut Array2<f64>,
    gains: &mut Array2<f64>,
    steps: &mut Array2<f64>,
    grad: &Array2<f64>,
    iter: usize,
    epsilon: f64,
) {
    let (n, dim) = y.dim();
    let momentum = if iter < MOMENTUM_SWITCH {
        MOMENTUM_EARLY
    } else {
        MOMENTUM_LATE
    };

    let mut means = vec![0.0; dim];
    for i in 0..n {
        for d in 0..dim {
            let g = grad[[i, d]];
            let prev = steps[[i, d]];
            let gain = if sign(g) == sign(prev) {
                gains[[i, d]] * 0.8
            } else {
                gains[[i, d]] + 0.2
            }
            .max(GAIN_FLOOR);
            gains[[i, d]] = gain;

            let step = momentum * prev - epsilon * gain * g;
            steps[[i, d]] = step;
            y[[i, d]] += step;
            means[d] += y[[i, d]];
        }
    }

    for mean in means.iter_mut() {
        *mean /= n as f64;
    }
    for i in 0..n {
        for d in 0..dim {
            y[[i, d]] -= means[d];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn world(n: usize, dim: usize) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        (
            Array2::zeros((n, dim)),
            Array2::from_elem((n, dim), 1.0),
            Array2::zeros((n, dim)),
        )
    }

    #[test]
    fn gains_never_drop_below_the_floor() {
        let (mut y, mut gains, mut steps) = world(1, 2);
        let grad = arr2(&[[1.0, -1.0]]);
        // Forcing sign agreement every iteration shrinks the gain toward,
        // but never below, the floor.
        for iter in 0..100 {
            steps[[0, 0]] = 1.0;
            steps[[0, 1]] = -1.0;
            apply_step(&mut y, &mut gains, &mut steps, &grad, iter, 10.0);
        }
        assert_eq!(gains[[0, 0]], GAIN_FLOOR);
        assert_eq!(gains[[0, 1]], GAIN_FLOOR);
    }

    #[test]
    fn sign_disagreement_grows_the_gain() {
        let (mut y, mut gains, mut steps) = world(2, 2);
        steps[[0, 0]] = 1.0;
        let grad = arr2(&[[-1.0, 0.0], [0.0, 0.0]]);
        apply_step(&mut y, &mut gains, &mut steps, &grad, 0, 10.0);
        assert!((gains[[0, 0]] - 1.2).abs() < 1e-12);
    }

    #[test]
    fn momentum_switches_at_iteration_250() {
        let (mut y, mut gains, mut steps) = world(2, 2);
        steps[[0, 0]] = 1.0;
        steps[[1, 0]] = -1.0;
        let grad = Array2::zeros((2, 2));
        apply_step(&mut y, &mut gains, &mut steps, &grad, 249, 10.0);
        assert_eq!(steps[[0, 0]], 0.5);
        apply_step(&mut y, &mut gains, &mut steps, &grad, 250, 10.0);
        assert_eq!(steps[[0, 0]], 0.4);
    }

    #[test]
    fn embedding_is_zero_centered_after_the_update() {
        let mut y = arr2(&[[5.0, -3.0], [1.0, 7.0], [-2.0, 0.5]]);
        let mut gains = Array2::from_elem((3, 2), 1.0);
        let mut steps = Array2::zeros((3, 2));
        let grad = arr2(&[[0.3, -0.1], [-0.2, 0.4], [0.05, 0.0]]);
        apply_step(&mut y, &mut gains, &mut steps, &grad, 10, 10.0);
        for d in 0..2 {
            let mean: f64 = (0..3).map(|i| y[[i, d]]).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-9);
        }
    }
}
