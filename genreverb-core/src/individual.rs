//! One candidate impulse response and its score.

use core::cmp::Ordering;

/// Fitness carried by an individual that has not been evaluated yet.
///
/// Lower fitness is better, so unscored individuals rank behind every scored
/// one. This is the only place the sentinel is spelled out.
pub const UNSCORED: f64 = 1.0e10;

/// A candidate impulse response.
///
/// Individuals are plain values: a generation owns its individuals outright
/// and nothing refers to them across generations.
#[derive(Clone, Debug, PartialEq)]
pub struct Individual {
    ir: Vec<f32>,
    fitness: f64,
}

impl Individual {
    /// Wrap a waveform with [`UNSCORED`] fitness.
    #[inline]
    pub fn unscored(ir: Vec<f32>) -> Self {
        Self { ir, fitness: UNSCORED }
    }

    /// The same waveform carrying `fitness`.
    #[inline]
    #[must_use]
    pub fn scored(self, fitness: f64) -> Self {
        Self { fitness, ..self }
    }

    #[inline] pub fn ir(&self) -> &[f32] { &self.ir }
    #[inline] pub fn fitness(&self) -> f64 { self.fitness }
    #[inline] pub fn is_scored(&self) -> bool { self.fitness < UNSCORED }
    #[inline] pub fn into_ir(self) -> Vec<f32> { self.ir }

    /// Total order by fitness (NaN sorts after everything, including [`UNSCORED`]).
    #[inline]
    pub fn cmp_fitness(&self, other: &Self) -> Ordering {
        self.fitness.total_cmp(&other.fitness)
    }
}

/// Stable ascending sort by fitness; equal scores keep their current order.
pub fn rank(population: &mut [Individual]) {
    population.sort_by(Individual::cmp_fitness);
}
