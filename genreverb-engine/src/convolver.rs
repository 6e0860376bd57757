//! Zero-latency uniformly partitioned convolution for one channel.
//!
//! Design
//! - The IR is split into blocks of `B` samples (see [`ImpulseKernel`]); every
//!   block is convolved in the frequency domain with a `2B` point FFT.
//! - Input spectra live in a ring with one slot per IR partition. When a new
//!   input block starts, the contribution of all *older* blocks against
//!   partitions `1..` is summed once and cached; each call then only adds the
//!   current (possibly partial) block against partition 0.
//! - Partial blocks are convolved immediately, so `process` adds no latency and
//!   accepts any number of samples per call.
//!
//! `process` performs no allocation and takes no lock. Callers serialize access.

use std::fmt;
use std::sync::Arc;

use genreverb_core::dsp::kill_denormals;
use rustfft::num_complex::Complex32;

use crate::error::{try_filled, EngineError};
use crate::kernel::ImpulseKernel;

/// Single-channel partitioned convolver. `Default` is the uninitialized state,
/// which outputs silence.
#[derive(Default)]
pub struct PartitionedConvolver {
    kernel: Option<Arc<ImpulseKernel>>,
    // frequency-domain ring of past input blocks, one per IR partition
    input_spectra: Vec<Vec<Complex32>>,
    pre_multiplied: Vec<Complex32>,
    conv: Vec<Complex32>,
    overlap: Vec<f32>,
    input: Vec<f32>,
    input_fill: usize,
    current: usize,
    scratch: Vec<Complex32>,
}

impl fmt::Debug for PartitionedConvolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedConvolver")
            .field("kernel", &self.kernel)
            .field("input_fill", &self.input_fill)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// `acc[i] += a[i] * b[i]`
#[inline]
fn complex_mul_acc(acc: &mut [Complex32], a: &[Complex32], b: &[Complex32]) {
    for ((acc, &a), &b) in acc.iter_mut().zip(a).zip(b) {
        *acc += a * b;
    }
}

impl PartitionedConvolver {
    /// A convolver ready to stream against an already partitioned IR.
    ///
    /// All buffers are allocated here; nothing is allocated afterwards.
    pub fn with_kernel(kernel: Arc<ImpulseKernel>) -> Result<Self, EngineError> {
        let block = kernel.block_size();
        let seg = kernel.segment_size();
        let count = kernel.partition_count();

        let mut input_spectra = Vec::new();
        input_spectra
            .try_reserve_exact(count)
            .map_err(|_| EngineError::Allocation(count))?;
        for _ in 0..count {
            input_spectra.push(try_filled(seg, Complex32::default())?);
        }

        Ok(Self {
            input_spectra,
            pre_multiplied: try_filled(seg, Complex32::default())?,
            conv: try_filled(seg, Complex32::default())?,
            overlap: try_filled(block, 0.0)?,
            input: try_filled(block, 0.0)?,
            input_fill: 0,
            current: 0,
            scratch: try_filled(kernel.scratch_len(), Complex32::default())?,
            kernel: Some(kernel),
        })
    }

    /// (Re)configure for `ir` with blocks of at most `max_block_size` samples.
    ///
    /// On error the convolver keeps whatever it had before.
    pub fn init(&mut self, max_block_size: usize, ir: &[f32]) -> Result<(), EngineError> {
        let kernel = Arc::new(ImpulseKernel::new(max_block_size, ir)?);
        *self = Self::with_kernel(kernel)?;
        Ok(())
    }

    /// Drop the installed IR and every buffer; `process` outputs silence afterwards.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline] pub fn is_initialized(&self) -> bool { self.kernel.is_some() }
    #[inline] pub fn kernel(&self) -> Option<&Arc<ImpulseKernel>> { self.kernel.as_ref() }

    /// Convolve `input` into `output` (`min` of both lengths; any excess
    /// output is zeroed).
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        output[n..].fill(0.0);

        let Some(kernel) = self.kernel.as_deref() else {
            output.fill(0.0);
            return;
        };

        let block = kernel.block_size();
        let count = kernel.partition_count();
        let scale = 1.0 / kernel.segment_size() as f32;

        let mut done = 0;
        while done < n {
            let fresh_block = self.input_fill == 0;
            let pos = self.input_fill;
            let take = (n - done).min(block - pos);

            self.input[pos..pos + take].copy_from_slice(&input[done..done + take]);

            // Forward FFT of the (zero-padded) current block.
            let spectrum = &mut self.input_spectra[self.current];
            for (dst, &src) in spectrum.iter_mut().zip(&self.input) {
                *dst = Complex32::new(src, 0.0);
            }
            spectrum[block..].fill(Complex32::default());
            kernel.fft().process_with_scratch(spectrum, &mut self.scratch);

            // Older blocks against partitions 1.. only change once per block.
            if fresh_block {
                self.pre_multiplied.fill(Complex32::default());
                for i in 1..count {
                    let slot = (self.current + i) % count;
                    complex_mul_acc(&mut self.pre_multiplied, kernel.partition(i), &self.input_spectra[slot]);
                }
            }

            self.conv.copy_from_slice(&self.pre_multiplied);
            complex_mul_acc(&mut self.conv, &self.input_spectra[self.current], kernel.partition(0));
            kernel.ifft().process_with_scratch(&mut self.conv, &mut self.scratch);

            for ((out, c), &ov) in output[done..done + take]
                .iter_mut()
                .zip(&self.conv[pos..pos + take])
                .zip(&self.overlap[pos..pos + take])
            {
                *out = kill_denormals(c.re * scale + ov);
            }

            self.input_fill += take;
            if self.input_fill == block {
                self.input.fill(0.0);
                self.input_fill = 0;
                for (ov, c) in self.overlap.iter_mut().zip(&self.conv[block..]) {
                    *ov = c.re * scale;
                }
                self.current = if self.current > 0 { self.current - 1 } else { count - 1 };
            }

            done += take;
        }
    }
}
