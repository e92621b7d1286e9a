//! Standard-normal sampling over a caller-provided uniform source.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A uniform-in-[0,1) source. Anything callable works; the engine wraps
/// seeded or entropy-backed [`StdRng`] instances by default.
pub type UniformSource = Box<dyn FnMut() -> f64 + Send>;

/// Marsaglia polar sampler for standard-normal values.
///
/// Two uniform draws yield two normal values; the second is cached and
/// returned by the next call. The cache lives on the instance so separate
/// engines never share sampler state.
pub struct Gaussian {
    source: UniformSource,
    spare: Option<f64>,
}

impl Gaussian {
    pub fn from_source(source: UniformSource) -> Self {
        Self {
            source,
            spare: None,
        }
    }

    /// Deterministic sampler backed by a seeded [`StdRng`].
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_source(Box::new(move || rng.gen::<f64>()))
    }

    /// Sampler backed by an entropy-seeded [`StdRng`].
    pub fn from_entropy() -> Self {
        let mut rng = StdRng::from_entropy();
        Self::from_source(Box::new(move || rng.gen::<f64>()))
    }

    /// One standard-normal draw.
    pub fn gauss(&mut self) -> f64 {
        if let Some(v) = self.spare.take() {
            return v;
        }
        loop {
            let u = 2.0 * (self.source)() - 1.0;
            let v = 2.0 * (self.source)() - 1.0;
            let r = u * u + v * v;
            if r > 0.0 && r <= 1.0 {
                let f = (-2.0 * r.ln() / r).sqrt();
                self.spare = Some(v * f);
                return u * f;
            }
        }
    }

    /// A normal draw with the given mean and standard deviation.
    pub fn randn(&mut self, mu: f64, sigma: f64) -> f64 {
        mu + sigma * self.gauss()
    }
}
