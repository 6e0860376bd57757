//! Target descriptors for one generation run.

/// Targets below this are treated as degenerate.
pub const MIN_T60_EPSILON: f32 = 1.0e-4;

/// Replacement used when the requested T60 is degenerate.
pub const SAFE_MIN_T60: f32 = 1.0e-3;

/// Longest T60 a run will synthesize; longer targets are clamped down.
pub const MAX_T60: f32 = 10.0;

/// Acoustic descriptors the synthesizer steers toward.
///
/// Only `t60` and `c80` enter the fitness function; `edt` and `br` are carried
/// so a host can round-trip the full parameter set.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReverbTargetParams {
    /// Reverberation time in seconds (−5 → −35 dB slope, extrapolated).
    pub t60: f32,
    /// Early decay time in seconds.
    pub edt: f32,
    /// Early/late energy ratio at 80 ms, in dB.
    pub c80: f32,
    /// Bass ratio.
    pub br: f32,
}

impl Default for ReverbTargetParams {
    fn default() -> Self {
        Self { t60: 0.4, edt: 0.06, c80: 12.0, br: 0.7 }
    }
}

impl ReverbTargetParams {
    #[inline]
    pub fn new(t60: f32, c80: f32) -> Self {
        Self { t60, c80, ..Self::default() }
    }

    /// T60 safe to divide by: anything at or below [`MIN_T60_EPSILON`]
    /// (or not finite) becomes [`SAFE_MIN_T60`].
    #[inline]
    pub fn effective_t60(&self) -> f32 {
        if self.t60.is_finite() && self.t60 > MIN_T60_EPSILON { self.t60 } else { SAFE_MIN_T60 }
    }
}
