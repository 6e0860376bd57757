//! Left/right convolver pair sharing one kernel.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::convolver::PartitionedConvolver;
use crate::error::EngineError;
use crate::kernel::ImpulseKernel;

/// Two independent channel convolvers.
///
/// The pair lives behind the processor's `RwLock`: the audio thread holds the
/// read side while it streams, and the writer swaps whole pairs. Each channel
/// sits in its own `Mutex` only because streaming mutates its buffers through
/// a shared reference. Only [`process`](Self::process) locks a channel; the
/// read-only accessors go through the `kernel` field instead.
#[derive(Debug, Default)]
pub struct ConvolverPair {
    kernel: Option<Arc<ImpulseKernel>>,
    left: Mutex<PartitionedConvolver>,
    right: Mutex<PartitionedConvolver>,
}

impl ConvolverPair {
    /// Both channels streaming against the same kernel.
    pub fn with_kernel(kernel: &Arc<ImpulseKernel>) -> Result<Self, EngineError> {
        Ok(Self {
            kernel: Some(Arc::clone(kernel)),
            left: Mutex::new(PartitionedConvolver::with_kernel(Arc::clone(kernel))?),
            right: Mutex::new(PartitionedConvolver::with_kernel(Arc::clone(kernel))?),
        })
    }

    #[inline] pub fn is_initialized(&self) -> bool { self.kernel.is_some() }
    #[inline] pub fn kernel(&self) -> Option<&Arc<ImpulseKernel>> { self.kernel.as_ref() }

    /// The IR both channels are convolving with, if any.
    pub fn ir(&self) -> Option<Arc<[f32]>> {
        self.kernel.as_ref().map(|k| k.ir())
    }

    /// Run both channels. Returns `false`, touching nothing, if a channel is
    /// unexpectedly busy; the caller then outputs silence for this block.
    pub fn process(&self, in_l: &[f32], in_r: &[f32], out_l: &mut [f32], out_r: &mut [f32]) -> bool {
        let (Some(mut left), Some(mut right)) = (self.left.try_lock(), self.right.try_lock()) else {
            return false;
        };
        left.process(in_l, out_l);
        right.process(in_r, out_r);
        true
    }
}
