//! Processor configuration.

use genreverb_core::GeneticConfig;

/// Sample rate assumed until the host calls `prepare`.
pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;

/// Block size assumed until the host calls `prepare`.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1024;

/// Knobs for the IR search run by [`ConvolutionProcessor`](crate::ConvolutionProcessor).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProcessorConfig {
    pub population_size: usize,
    pub mutation_rate: f32,
    /// Generation budget per `start_generate`.
    pub generations: usize,
    pub seed: Option<u64>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        let g = GeneticConfig::default();
        Self {
            population_size: g.population_size,
            mutation_rate: g.mutation_rate,
            generations: 250,
            seed: g.seed,
        }
    }
}

impl ProcessorConfig {
    #[must_use]
    pub fn with_population_size(mut self, n: usize) -> Self { self.population_size = n; self }
    #[must_use]
    pub fn with_mutation_rate(mut self, rate: f32) -> Self { self.mutation_rate = rate.clamp(0.0, 1.0); self }
    #[must_use]
    pub fn with_generations(mut self, n: usize) -> Self { self.generations = n; self }
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self { self.seed = seed; self }

    /// Synthesizer settings for a given sample rate.
    pub fn genetic(&self, sample_rate: f32) -> GeneticConfig {
        GeneticConfig {
            population_size: self.population_size,
            mutation_rate: self.mutation_rate,
            sample_rate,
            seed: self.seed,
        }
    }
}
