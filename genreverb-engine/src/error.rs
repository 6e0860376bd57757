use thiserror::Error;

/// Errors raised while configuring the convolution engine.
///
/// None of these ever reach the audio thread; a failed install leaves the
/// previous state in place and `process` keeps producing whatever it produced
/// before (silence, if nothing was installed).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("maximum block size must be non-zero")]
    InvalidBlockSize,
    #[error("impulse response is empty or silent")]
    EmptyImpulse,
    #[error("failed to allocate {0} convolution buffer elements")]
    Allocation(usize),
}

/// Allocate `len` copies of `value`, reporting allocation failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>, EngineError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| EngineError::Allocation(len))?;
    v.resize(len, value);
    Ok(v)
}
