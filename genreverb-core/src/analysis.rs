//! Acoustic analysis of impulse responses.
//!
//! Everything here is a pure function over a sample slice (or a decay curve
//! derived from one). Degenerate input (empty, shorter than the analysis
//! window, or silent) never panics; it yields `0.0` or [`SILENCE_DB`] instead.
//!
//! Contents
//! - [`decay_curve`]         : Schroeder backward-integrated energy curve in dB
//! - [`reverberation_time`]  : T60 extrapolated from the −5 → −35 dB span (T30 × 2)
//! - [`early_decay_time`]    : EDT extrapolated from the 0 → −10 dB span (× 6)
//! - [`clarity_c80`]         : early (≤ 80 ms) to late energy ratio in dB
//! - [`measure`]             : all of the above in one pass-friendly bundle

use crate::dsp::{energy, energy_ratio_db, power_ratio_db, ENERGY_FLOOR, SILENCE_DB};

/// Boundary between "early" and "late" energy for C80, in seconds.
pub const C80_WINDOW_S: f32 = 0.080;

/// Schroeder decay curve: energy remaining from each sample to the end,
/// normalized to the total and expressed in dB (first sample is 0 dB).
///
/// Returns an empty vector for empty input and a flat [`SILENCE_DB`] curve
/// when the IR carries no measurable energy.
#[allow(clippy::cast_possible_truncation)]
pub fn decay_curve(ir: &[f32]) -> Vec<f32> {
    if ir.is_empty() {
        return Vec::new();
    }

    // Backward integration: edc[i] = Σ_{k ≥ i} ir[k]²
    let mut edc: Vec<f64> = ir.iter().map(|&x| energy(x)).collect();
    let mut acc = 0.0;
    for e in edc.iter_mut().rev() {
        acc += *e;
        *e = acc;
    }

    let total = edc[0];
    if total < ENERGY_FLOOR {
        return vec![SILENCE_DB; ir.len()];
    }

    edc.iter()
        .map(|&e| power_ratio_db(e / total) as f32)
        .collect()
}

/// Index of the first sample at or below `db`, or the last index if the curve
/// never gets there. `None` only for an empty curve.
#[inline]
fn first_crossing(curve: &[f32], db: f32) -> Option<usize> {
    curve
        .iter()
        .position(|&v| v <= db)
        .or_else(|| curve.len().checked_sub(1))
}

/// Time between two level crossings, scaled to a 60 dB decay.
fn extrapolated_span(curve: &[f32], sample_rate: f32, from_db: f32, to_db: f32, scale: f32) -> f32 {
    if sample_rate <= 0.0 {
        return 0.0;
    }
    let (Some(a), Some(b)) = (first_crossing(curve, from_db), first_crossing(curve, to_db)) else {
        return 0.0;
    };
    if b <= a {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let span = (b - a) as f32 / sample_rate;
    span * scale
}

/// Reverberation time (T60, seconds) from a decay curve.
///
/// Measures the −5 dB → −35 dB span (T30) and doubles it. A curve that never
/// reaches −35 dB is measured to its last sample; a non-positive span gives 0.
pub fn reverberation_time(curve: &[f32], sample_rate: f32) -> f32 {
    extrapolated_span(curve, sample_rate, -5.0, -35.0, 2.0)
}

/// Early decay time (EDT, seconds): the 0 dB → −10 dB span × 6.
pub fn early_decay_time(curve: &[f32], sample_rate: f32) -> f32 {
    extrapolated_span(curve, sample_rate, 0.0, -10.0, 6.0)
}

/// Clarity C80 (dB): `10·log10(E_early / E_late)` with the split at 80 ms.
///
/// Both energies are floored before the ratio, so an IR that ends before
/// 80 ms reports a large positive clarity instead of infinity.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clarity_c80(ir: &[f32], sample_rate: f32) -> f32 {
    let split = (C80_WINDOW_S * sample_rate.max(0.0)) as usize;
    let split = split.min(ir.len());

    let early: f64 = ir[..split].iter().map(|&x| energy(x)).sum();
    let late: f64 = ir[split..].iter().map(|&x| energy(x)).sum();

    energy_ratio_db(early, late) as f32
}

/// Descriptors measured from one impulse response.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DecayDescriptors {
    pub t60: f32,
    pub edt: f32,
    pub c80: f32,
}

/// Compute the decay curve once and derive every descriptor from it.
pub fn measure(ir: &[f32], sample_rate: f32) -> DecayDescriptors {
    let curve = decay_curve(ir);
    DecayDescriptors {
        t60: reverberation_time(&curve, sample_rate),
        edt: early_decay_time(&curve, sample_rate),
        c80: clarity_c80(ir, sample_rate),
    }
}
