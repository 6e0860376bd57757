//! Frequency-domain partitions of one impulse response.
//!
//! An [`ImpulseKernel`] is immutable once built. Both channels of a
//! [`ConvolverPair`](crate::stereo::ConvolverPair) share the same kernel through
//! an `Arc`, so the FFT work for a new IR happens once, off the audio thread,
//! before anything is locked.

use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::error::{try_filled, EngineError};

/// Trailing samples quieter than this are dropped before partitioning.
pub const TAIL_SILENCE: f32 = 1.0e-6;

/// Uniformly partitioned IR spectrum.
pub struct ImpulseKernel {
    block_size: usize,
    partitions: Vec<Vec<Complex32>>,
    ir: Arc<[f32]>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    scratch_len: usize,
}

impl fmt::Debug for ImpulseKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpulseKernel")
            .field("block_size", &self.block_size)
            .field("partitions", &self.partitions.len())
            .field("ir_len", &self.ir.len())
            .finish_non_exhaustive()
    }
}

impl ImpulseKernel {
    /// Partition `ir` into blocks of `max_block_size` (rounded up to a power of
    /// two) and transform each block into a `2 * block` point spectrum.
    pub fn new(max_block_size: usize, ir: &[f32]) -> Result<Self, EngineError> {
        if max_block_size == 0 {
            return Err(EngineError::InvalidBlockSize);
        }
        let len = ir
            .iter()
            .rposition(|s| s.abs() >= TAIL_SILENCE)
            .map_or(0, |i| i + 1);
        if len == 0 {
            return Err(EngineError::EmptyImpulse);
        }

        let block_size = max_block_size.next_power_of_two();
        let segment_size = 2 * block_size;
        let count = len.div_ceil(block_size);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(segment_size);
        let ifft = planner.plan_fft_inverse(segment_size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        let mut scratch = try_filled(scratch_len, Complex32::default())?;

        let mut partitions = Vec::new();
        partitions
            .try_reserve_exact(count)
            .map_err(|_| EngineError::Allocation(count))?;
        for chunk in ir[..len].chunks(block_size) {
            let mut spectrum = try_filled(segment_size, Complex32::default())?;
            for (dst, &src) in spectrum.iter_mut().zip(chunk) {
                dst.re = src;
            }
            fft.process_with_scratch(&mut spectrum, &mut scratch);
            partitions.push(spectrum);
        }

        let mut owned = Vec::new();
        owned
            .try_reserve_exact(ir.len())
            .map_err(|_| EngineError::Allocation(ir.len()))?;
        owned.extend_from_slice(ir);

        Ok(Self {
            block_size,
            partitions,
            ir: owned.into(),
            fft,
            ifft,
            scratch_len,
        })
    }

    /// Partition length in samples (a power of two).
    #[inline] pub fn block_size(&self) -> usize { self.block_size }
    /// FFT length: two blocks.
    #[inline] pub fn segment_size(&self) -> usize { 2 * self.block_size }
    #[inline] pub fn partition_count(&self) -> usize { self.partitions.len() }
    #[inline] pub fn partition(&self, i: usize) -> &[Complex32] { &self.partitions[i] }
    /// The IR exactly as it was handed in (before tail trimming).
    #[inline] pub fn ir(&self) -> Arc<[f32]> { Arc::clone(&self.ir) }
    #[inline] pub(crate) fn fft(&self) -> &dyn Fft<f32> { &*self.fft }
    #[inline] pub(crate) fn ifft(&self) -> &dyn Fft<f32> { &*self.ifft }
    #[inline] pub(crate) fn scratch_len(&self) -> usize { self.scratch_len }
}
