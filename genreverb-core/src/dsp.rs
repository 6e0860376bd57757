//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - Math backend selection (`std` or `libm`) in one place
//! - Clean, side-effect free helpers that are easy to test
//!
//! Features used by this file:
//! - `libm` : route `log10`/`pow` through `libm` for bit-reproducible analysis
//!
//! Conventions:
//! - Energy accumulation is done in `f64`; samples stay `f32`.
//! - All functions are `#[inline]` where useful to help the optimizer.

use cfg_if::cfg_if;
use num_traits::ToPrimitive;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    if #[cfg(feature = "libm")] {
        #[inline] fn m_log10(x: f64) -> f64 { libm::log10(x) }
        #[inline] fn m_powf(b: f32, e: f32) -> f32 { libm::powf(b, e) }
    } else {
        #[inline] fn m_log10(x: f64) -> f64 { x.log10() }
        #[inline] fn m_powf(b: f32, e: f32) -> f32 { b.powf(e) }
    }
}

// --------------------------------- Constants -------------------------------------

/// Smallest energy (or energy ratio) considered distinct from silence.
/// Everything below is clamped here before taking a logarithm.
pub const ENERGY_FLOOR: f64 = 1.0e-20;

/// Level reported for a decay curve that carries no energy at all.
pub const SILENCE_DB: f32 = -100.0;

/// Threshold below which a single sample is treated as zero (denormal guard).
pub const EPS_SMALL: f32 = 1.0e-20;

// --------------------------------- Utilities -------------------------------------

/// Squared magnitude of one sample, widened to `f64` before multiplying.
#[inline]
pub fn energy(x: f32) -> f64 {
    let x = f64::from(x);
    x * x
}

/// `10 * log10(max(ratio, ENERGY_FLOOR))`: power ratio to decibels with a floor.
#[inline]
pub fn power_ratio_db(ratio: f64) -> f64 {
    10.0 * m_log10(ratio.max(ENERGY_FLOOR))
}

/// Energy ratio in dB, both terms floored at [`ENERGY_FLOOR`].
///
/// Uses the selected math backend, so results are reproducible with `libm`.
#[inline]
pub fn energy_ratio_db(num: f64, den: f64) -> f64 {
    10.0 * m_log10(num.max(ENERGY_FLOOR) / den.max(ENERGY_FLOOR))
}

/// Exponential amplitude envelope that loses 60 dB after `t60` seconds:
/// `10^(-3 t / t60)`.
#[inline]
pub fn decay_envelope(t: f32, t60: f32) -> f32 {
    m_powf(10.0, -3.0 * t / t60)
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

/// Convert dB to linear gain: lin = 10^(db/20).
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= -120.0 { 0.0 } else { m_powf(10.0, db / 20.0) }
}

/// Convert linear gain to dB: db = 20*log10(lin).
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin <= EPS_SMALL { -120.0 } else { 20.0 * lin.log10() }
}

/// Convert a duration in seconds to a whole number of samples (rounded, never negative).
#[inline]
pub fn seconds_to_samples(seconds: f32, sample_rate: f32) -> usize {
    (f64::from(seconds) * f64::from(sample_rate))
        .round()
        .to_usize()
        .unwrap_or(0)
}

// --------------------------------- Tests (std only) ------------------------------
