//! GenReverb Engine — partitioned convolution driven by genetic IR synthesis.
//!
//! Crate layout:
//! - [`kernel`]    : immutable, pre-transformed IR partitions
//! - [`convolver`] : zero-latency uniformly partitioned convolver (one channel)
//! - [`stereo`]    : left/right pair sharing one kernel
//! - [`processor`] : `ConvolutionProcessor`, the host-facing surface
//! - [`config`]    : search budget and defaults
//! - [`error`]     : engine errors
//!
//! The audio path never allocates and never blocks: all buffers are sized when
//! an IR is installed, and the realtime side only ever *tries* to take locks.

pub mod config;
pub mod convolver;
pub mod error;
pub mod kernel;
pub mod processor;
pub mod stereo;

pub use config::ProcessorConfig;
pub use convolver::PartitionedConvolver;
pub use error::EngineError;
pub use kernel::ImpulseKernel;
pub use processor::ConvolutionProcessor;
pub use stereo::ConvolverPair;
