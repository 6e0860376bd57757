//! Genetic impulse-response synthesizer.
//!
//! A [`GeneticSynth`] evolves a population of decaying-noise impulse responses
//! toward a [`ReverbTargetParams`] pair of descriptors (T60 and C80):
//!
//! 1. initialize `population_size` exponentially decaying noise bursts,
//! 2. score each with the acoustic analysis (lower fitness is better),
//! 3. rank, report progress, stop on convergence / budget / cancellation,
//! 4. keep the top 20 % unchanged and refill the rest with mutated children
//!    of two elite parents.
//!
//! Cancellation is cooperative: the [`CancelToken`] is looked at once per
//! generation, after ranking, so whatever `compute` returns always comes from
//! a fully ranked population.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::analysis::{clarity_c80, decay_curve, reverberation_time};
use crate::dsp::{decay_envelope, seconds_to_samples};
use crate::individual::{rank, Individual, UNSCORED};
use crate::params::{ReverbTargetParams, MAX_T60, MIN_T60_EPSILON};

/// Shortest IR ever generated, in samples.
pub const MIN_IR_LEN: usize = 1024;

/// IR length relative to the target T60.
pub const IR_LENGTH_FACTOR: f32 = 1.5;

/// Weight of the T60 error; T60 dominates perceptually.
pub const T60_WEIGHT: f64 = 100.0;

/// Weight of the C80 error.
pub const C80_WEIGHT: f64 = 1.0;

/// Share of the population carried unchanged into the next generation.
pub const ELITE_FRACTION: f32 = 0.2;

/// Best fitness below which the search stops early.
pub const CONVERGENCE_FITNESS: f64 = 1.0e-3;

/// Upper bound (exclusive) of the additive mutation noise. The noise is drawn
/// from `[0, MUTATION_NOISE)`, i.e. it only ever pushes samples upward.
pub const MUTATION_NOISE: f32 = 0.1;

/// Why a run produced no impulse response.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SynthError {
    #[error("population size is zero")]
    EmptyPopulation,
    #[error("best individual has an empty impulse response")]
    EmptyImpulse,
}

/// Synthesizer settings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeneticConfig {
    pub population_size: usize,
    /// Per-sample mutation probability.
    pub mutation_rate: f32,
    pub sample_rate: f32,
    /// Fixed RNG seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self { population_size: 50, mutation_rate: 0.001, sample_rate: 44_100.0, seed: None }
    }
}

/// Snapshot handed to the progress callback after every generation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Progress {
    /// Generations fully evaluated and ranked so far.
    pub completed: usize,
    /// Generation budget of the run.
    pub total: usize,
    /// Fitness of the best individual ([`UNSCORED`] if nothing was scored).
    pub best_fitness: f64,
}

impl Progress {
    /// `completed / total` in [0, 1]; an empty budget counts as done.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            (self.completed as f32 / self.total as f32).clamp(0.0, 1.0)
        }
    }
}

/// Progress sink installed on a synthesizer. Runs on the thread calling `compute`.
pub type ProgressFn = Box<dyn FnMut(Progress) + Send>;

/// Shared cooperative-cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[inline] pub fn new() -> Self { Self::default() }
    #[inline] pub fn cancel(&self) { self.0.store(true, Ordering::Release); }
    #[inline] pub fn reset(&self) { self.0.store(false, Ordering::Release); }
    #[inline] pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Acquire) }
}

/// Evolutionary IR synthesizer. See the module docs for the algorithm.
pub struct GeneticSynth {
    config: GeneticConfig,
    population: Vec<Individual>,
    rng: StdRng,
    cancel: CancelToken,
    on_progress: Option<ProgressFn>,
}

impl core::fmt::Debug for GeneticSynth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeneticSynth")
            .field("config", &self.config)
            .field("population", &self.population.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl GeneticSynth {
    pub fn new(config: GeneticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            population: Vec::with_capacity(config.population_size),
            rng,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }

    #[inline] pub fn config(&self) -> &GeneticConfig { &self.config }

    /// A handle that cancels this synthesizer's runs from any thread.
    #[inline] pub fn cancel_token(&self) -> CancelToken { self.cancel.clone() }

    /// Install (or clear) the progress sink.
    pub fn set_progress_callback(&mut self, f: Option<ProgressFn>) {
        self.on_progress = f;
    }

    /// Length of every initial IR for a target T60.
    pub fn ir_len_for(&self, t60: f32) -> usize {
        seconds_to_samples(t60 * IR_LENGTH_FACTOR, self.config.sample_rate).max(MIN_IR_LEN)
    }

    /// Evolve for up to `generations` generations and return the best IR.
    ///
    /// Stops early when the best fitness drops below [`CONVERGENCE_FITNESS`] or
    /// when the cancel token is set. A final [`Progress`] is reported on every
    /// path that gets past the population-size guard.
    pub fn compute(&mut self, target: &ReverbTargetParams, generations: usize) -> Result<Vec<f32>, SynthError> {
        if self.config.population_size == 0 {
            log::error!("genetic synth: population size is zero, nothing to evolve");
            return Err(SynthError::EmptyPopulation);
        }

        let mut target = *target;
        if !(target.t60.is_finite() && target.t60 > MIN_T60_EPSILON) {
            log::warn!("genetic synth: target t60 {} is degenerate, clamping", target.t60);
            target.t60 = target.effective_t60();
        } else if target.t60 > MAX_T60 {
            log::warn!("genetic synth: target t60 {} exceeds {MAX_T60}s, clamping", target.t60);
            target.t60 = MAX_T60;
        }

        log::info!(
            "genetic synth: target t60={:.3}s c80={:.1}dB, pop={}, budget={} generations",
            target.t60, target.c80, self.config.population_size, generations
        );

        self.initialize(target.t60);

        let mut completed = 0;
        for gen in 0..generations {
            self.evaluate(&target);
            rank(&mut self.population);
            completed = gen + 1;

            let best = self.best_fitness();
            log::debug!("generation {gen}: best fitness = {best}");
            self.report(Progress { completed, total: generations, best_fitness: best });

            if best < CONVERGENCE_FITNESS {
                log::info!("genetic synth: converged after {completed} generations");
                break;
            }
            if self.cancel.is_cancelled() {
                log::info!("genetic synth: cancelled after {completed} generations");
                break;
            }

            if completed < generations {
                self.population = self.next_generation();
            }
        }

        let best_fitness = self.best_fitness();
        self.report(Progress { completed, total: generations, best_fitness });

        match self.population.first() {
            Some(best) if !best.ir().is_empty() => Ok(best.ir().to_vec()),
            _ => Err(SynthError::EmptyImpulse),
        }
    }

    fn report(&mut self, p: Progress) {
        if let Some(f) = self.on_progress.as_mut() {
            f(p);
        }
    }

    fn best_fitness(&self) -> f64 {
        self.population.first().map_or(UNSCORED, Individual::fitness)
    }

    /// Fresh population of exponentially decaying uniform noise.
    fn initialize(&mut self, t60: f32) {
        let len = self.ir_len_for(t60);
        let sr = self.config.sample_rate;
        let rng = &mut self.rng;

        self.population.clear();
        self.population.extend((0..self.config.population_size).map(|_| {
            #[allow(clippy::cast_precision_loss)]
            let ir = (0..len)
                .map(|i| {
                    let t = i as f32 / sr;
                    rng.gen_range(-1.0_f32..=1.0) * decay_envelope(t, t60)
                })
                .collect();
            Individual::unscored(ir)
        }));
    }

    fn evaluate(&mut self, target: &ReverbTargetParams) {
        let sr = self.config.sample_rate;
        let population = std::mem::take(&mut self.population);
        self.population = population
            .into_iter()
            .map(|ind| match fitness_of(ind.ir(), target, sr) {
                Some(f) => ind.scored(f),
                None => Individual::unscored(ind.into_ir()),
            })
            .collect();
    }

    /// Elites unchanged, the remainder bred from elite parents only.
    fn next_generation(&mut self) -> Vec<Individual> {
        let size = self.population.len();
        let elite = elite_count(size);

        let mut next = Vec::with_capacity(size);
        next.extend_from_slice(&self.population[..elite]);

        while next.len() < size {
            let a = self.rng.gen_range(0..elite);
            let b = self.rng.gen_range(0..elite);
            let child = crossover(&mut self.rng, &self.population[a], &self.population[b]);
            next.push(mutate(&mut self.rng, child, self.config.mutation_rate));
        }
        next
    }
}

/// Weighted absolute error against the targets, or `None` when the IR gives
/// nothing to measure.
pub fn fitness_of(ir: &[f32], target: &ReverbTargetParams, sample_rate: f32) -> Option<f64> {
    let curve = decay_curve(ir);
    if curve.is_empty() {
        return None;
    }
    let t60 = reverberation_time(&curve, sample_rate);
    let c80 = clarity_c80(ir, sample_rate);
    let err_t60 = f64::from((t60 - target.t60).abs());
    let err_c80 = f64::from((c80 - target.c80).abs());
    Some(T60_WEIGHT * err_t60 + C80_WEIGHT * err_c80)
}

/// `max(1, round(ELITE_FRACTION * size))`, never more than `size` (for `size > 0`).
pub fn elite_count(size: usize) -> usize {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (size as f32 * ELITE_FRACTION).round() as usize;
    n.max(1).min(size.max(1))
}

/// Uniform crossover: every sample comes from either parent with p = 0.5.
///
/// The child is as long as the longer parent; past the end of the shorter
/// parent its contribution is silence.
pub fn crossover<R: Rng + ?Sized>(rng: &mut R, a: &Individual, b: &Individual) -> Individual {
    let (a, b) = (a.ir(), b.ir());
    let len = a.len().max(b.len());
    let ir = (0..len)
        .map(|i| {
            let from_a = rng.gen::<f32>() < 0.5;
            let src = if from_a { a } else { b };
            src.get(i).copied().unwrap_or(0.0)
        })
        .collect();
    Individual::unscored(ir)
}

/// Per-sample mutation: with probability `rate`, add noise from `[0, MUTATION_NOISE)`.
#[must_use]
pub fn mutate<R: Rng + ?Sized>(rng: &mut R, ind: Individual, rate: f32) -> Individual {
    let mut ir = ind.into_ir();
    for s in &mut ir {
        if rng.gen::<f32>() < rate {
            *s += rng.gen_range(0.0..MUTATION_NOISE);
        }
    }
    Individual::unscored(ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn seeded(population_size: usize) -> GeneticSynth {
        GeneticSynth::new(GeneticConfig {
            population_size,
            mutation_rate: 0.001,
            sample_rate: 8_000.0,
            seed: Some(7),
        })
    }

    #[test]
    fn crossover_length_is_max_of_parents() {
        let mut rng = StdRng::seed_from_u64(1);
        for (la, lb) in [(0, 0), (0, 9), (9, 0), (3, 7), (7, 3), (5, 5)] {
            let a = Individual::unscored(vec![1.0; la]);
            let b = Individual::unscored(vec![2.0; lb]);
            let child = crossover(&mut rng, &a, &b);
            assert_eq!(child.ir().len(), la.max(lb), "({la}, {lb})");
            assert!(!child.is_scored());
        }
    }

    #[test]
    fn crossover_pads_shorter_parent_with_silence() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = Individual::unscored(vec![1.0; 4]);
        let b = Individual::unscored(vec![2.0; 64]);
        let child = crossover(&mut rng, &a, &b);
        for &s in &child.ir()[4..] {
            assert!(s == 0.0 || s == 2.0, "s={s}");
        }
        assert!(child.ir()[4..].iter().any(|&s| s == 0.0));
    }

    #[test]
    fn mutation_only_adds_bounded_positive_noise() {
        let mut rng = StdRng::seed_from_u64(5);
        let before = Individual::unscored(vec![0.25; 4096]);
        let after = mutate(&mut rng, before.clone(), 0.5);
        let mut changed = 0;
        for (&x, &y) in before.ir().iter().zip(after.ir()) {
            let d = y - x;
            assert!((0.0..=MUTATION_NOISE + 1e-6).contains(&d), "d={d}");
            if d > 0.0 {
                changed += 1;
            }
        }
        assert!(changed > 1000 && changed < 3000, "changed={changed}");
    }

    #[test]
    fn zero_mutation_rate_is_identity() {
        let mut rng = StdRng::seed_from_u64(5);
        let ind = Individual::unscored(vec![0.1, -0.2, 0.3]);
        assert_eq!(mutate(&mut rng, ind.clone(), 0.0).ir(), ind.ir());
    }

    #[test]
    fn elite_count_rounds_and_keeps_one() {
        assert_eq!(elite_count(1), 1);
        assert_eq!(elite_count(2), 1);
        assert_eq!(elite_count(3), 1);
        assert_eq!(elite_count(8), 2);
        assert_eq!(elite_count(50), 10);
    }

    #[test]
    fn empty_population_fails_without_reporting() {
        let mut synth = seeded(0);
        let calls = Arc::new(Mutex::new(0));
        let c = Arc::clone(&calls);
        synth.set_progress_callback(Some(Box::new(move |_| *c.lock().unwrap() += 1)));
        let res = synth.compute(&ReverbTargetParams::default(), 10);
        assert_eq!(res, Err(SynthError::EmptyPopulation));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn single_individual_keeps_initial_length() {
        let mut synth = seeded(1);
        let params = ReverbTargetParams::new(0.4, 12.0);
        let ir = synth.compute(&params, 3).unwrap();
        assert_eq!(ir.len(), (1.5_f32 * 0.4 * 8_000.0).round() as usize);

        // Short targets hit the floor.
        let ir = synth.compute(&ReverbTargetParams::new(0.01, 12.0), 2).unwrap();
        assert_eq!(ir.len(), MIN_IR_LEN);
    }

    #[test]
    fn degenerate_t60_is_clamped_not_fatal() {
        let mut synth = seeded(4);
        let ir = synth.compute(&ReverbTargetParams::new(0.0, 0.0), 2).unwrap();
        assert_eq!(ir.len(), MIN_IR_LEN);
        assert!(ir.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn huge_t60_is_clamped_to_max() {
        let mut synth = seeded(1);
        let ir = synth.compute(&ReverbTargetParams::new(1.0e9, 12.0), 1).unwrap();
        assert_eq!(ir.len(), synth.ir_len_for(MAX_T60));
        assert_eq!(ir.len(), 120_000);
    }

    #[test]
    fn progress_reports_every_generation_plus_final() {
        let mut synth = seeded(6);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        synth.set_progress_callback(Some(Box::new(move |p| s.lock().unwrap().push(p))));
        synth.compute(&ReverbTargetParams::new(0.2, 5.0), 4).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        for (i, p) in seen.iter().take(4).enumerate() {
            assert_eq!(p.completed, i + 1);
            assert_eq!(p.total, 4);
        }
        assert_eq!(seen[4].completed, 4);
        assert!((seen[4].fraction() - 1.0).abs() < f32::EPSILON);
        // Elitism: the best fitness never gets worse.
        for w in seen.windows(2) {
            assert!(w[1].best_fitness <= w[0].best_fitness);
        }
    }

    #[test]
    fn zero_generations_still_reports_once() {
        let mut synth = seeded(3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        synth.set_progress_callback(Some(Box::new(move |p| s.lock().unwrap().push(p))));
        let ir = synth.compute(&ReverbTargetParams::default(), 0).unwrap();
        assert!(!ir.is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].best_fitness, UNSCORED);
    }

    #[test]
    fn cancel_before_start_returns_generation_zero() {
        let mut synth = seeded(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        synth.set_progress_callback(Some(Box::new(move |p| s.lock().unwrap().push(p))));
        synth.cancel_token().cancel();

        let params = ReverbTargetParams::new(0.3, 8.0);
        let ir = synth.compute(&params, 50).unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|p| p.completed <= 1), "{seen:?}");
        // The returned IR is the best of the first ranked generation.
        let best = fitness_of(&ir, &params, 8_000.0).unwrap();
        assert!((best - seen[0].best_fitness).abs() < 1e-9);
    }

    #[test]
    fn cancel_from_callback_stops_at_that_generation() {
        let mut synth = seeded(5);
        let token = synth.cancel_token();
        let last = Arc::new(Mutex::new(0));
        let l = Arc::clone(&last);
        synth.set_progress_callback(Some(Box::new(move |p| {
            *l.lock().unwrap() = p.completed;
            if p.completed == 3 {
                token.cancel();
            }
        })));
        synth.compute(&ReverbTargetParams::new(0.3, 8.0), 100).unwrap();
        assert_eq!(*last.lock().unwrap(), 3);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let params = ReverbTargetParams::new(0.25, 6.0);
        let a = seeded(6).compute(&params, 3).unwrap();
        let b = seeded(6).compute(&params, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn search_moves_toward_target() {
        let params = ReverbTargetParams::new(0.25, 6.0);
        let mut synth = seeded(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        synth.set_progress_callback(Some(Box::new(move |p: Progress| s.lock().unwrap().push(p.best_fitness))));
        let ir = synth.compute(&params, 20).unwrap();

        let seen = seen.lock().unwrap();
        let last = *seen.last().unwrap();
        assert!(last <= seen[0]);
        let measured = fitness_of(&ir, &params, 8_000.0).unwrap();
        assert!((measured - last).abs() < 1e-9);
    }
}
