//! GenReverb Core — acoustic analysis and genetic impulse-response synthesis.
//!
//! Features
//! - `libm` : use `libm` for `log10`/`pow` so analysis is bit-identical across platforms
//!
//! Modules
//! - [`dsp`]        : math backend, energy/dB helpers, constants
//! - [`analysis`]   : Schroeder decay curve, T60, EDT, C80
//! - [`params`]     : target descriptors for a run
//! - [`individual`] : one scored candidate IR
//! - [`genetic`]    : the evolutionary synthesizer
//!
//! Design
//! - Analysis is pure and never panics on degenerate input
//! - The synthesizer owns its population and RNG; progress and cancellation are
//!   the only things shared with other threads

pub mod analysis;
pub mod dsp;
pub mod genetic;
pub mod individual;
pub mod params;

pub use genetic::{CancelToken, GeneticConfig, GeneticSynth, Progress, ProgressFn, SynthError};
pub use individual::{Individual, UNSCORED};
pub use params::ReverbTargetParams;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::analysis::{
        clarity_c80, decay_curve, early_decay_time, measure, reverberation_time, DecayDescriptors,
    };
    pub use crate::dsp::{db_to_lin, lin_to_db, SILENCE_DB};
    pub use crate::genetic::{CancelToken, GeneticConfig, GeneticSynth, Progress, SynthError};
    pub use crate::params::ReverbTargetParams;
}
