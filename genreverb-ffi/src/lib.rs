//! C ABI wrapper for the GenReverb convolution processor.
//!
//! Exposes an opaque handle with the host-facing surface: prepare, target
//! parameters, background IR generation, progress, and planar stereo processing.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `GenReverbProcessor` (heap-allocated; you own/delete it).
//! - Null handles are ignored; `process` with null inputs writes silence.
//!
//! Threading
//! - `genreverb_process`, `genreverb_progress`, `genreverb_is_generating` and
//!   `genreverb_is_ready` are safe to call from the audio thread while another
//!   thread uses the rest. Control functions must not be called concurrently
//!   with `genreverb_destroy`.
//! - `genreverb_cancel_ir`, `genreverb_prepare` and `genreverb_release` wait for
//!   the running generation to stop; never call them from the audio thread.

use std::slice;

use genreverb_core::ReverbTargetParams;
use genreverb_engine::{ConvolutionProcessor, ProcessorConfig};

/// Opaque processor handle handed to C.
pub struct GenReverbProcessor {
    inner: ConvolutionProcessor,
}

fn boxed(config: ProcessorConfig) -> *mut GenReverbProcessor {
    Box::into_raw(Box::new(GenReverbProcessor { inner: ConvolutionProcessor::new(config) }))
}

/// Borrow the processor behind `handle`, or `None` for null.
///
/// # Safety
/// `handle` must be null or a live pointer from `genreverb_create*`.
unsafe fn processor<'a>(handle: *const GenReverbProcessor) -> Option<&'a ConvolutionProcessor> {
    handle.as_ref().map(|p| &p.inner)
}

// --- Creation / destruction -------------------------------------------------------

/// Create a processor with the default search budget (population 50, 250
/// generations, mutation rate 0.001, unseeded).
#[no_mangle]
pub extern "C" fn genreverb_create() -> *mut GenReverbProcessor {
    boxed(ProcessorConfig::default())
}

/// Create a processor with an explicit search budget. Zero `population` or
/// `generations` keep the defaults; `seed` is used only when `seeded` is true.
#[no_mangle]
pub extern "C" fn genreverb_create_with(
    population: u32,
    generations: u32,
    mutation_rate: f32,
    seed: u64,
    seeded: bool,
) -> *mut GenReverbProcessor {
    let mut config = ProcessorConfig::default();
    if population > 0 {
        config = config.with_population_size(population as usize);
    }
    if generations > 0 {
        config = config.with_generations(generations as usize);
    }
    if mutation_rate.is_finite() {
        config = config.with_mutation_rate(mutation_rate);
    }
    boxed(config.with_seed(seeded.then_some(seed)))
}

/// Destroy a processor; stops any running generation first.
///
/// # Safety
/// `handle` must be null or come from `genreverb_create*`, and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn genreverb_destroy(handle: *mut GenReverbProcessor) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// --- Control ---------------------------------------------------------------------

/// Reconfigure for a new sample rate / maximum block size. Drops the current IR.
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_prepare(handle: *const GenReverbProcessor, sample_rate: f64, max_block_size: u32) {
    if let Some(p) = processor(handle) {
        p.prepare(sample_rate, max_block_size as usize);
    }
}

/// Set the targets for the next generation run.
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_set_target_params(
    handle: *const GenReverbProcessor,
    t60: f32,
    edt: f32,
    c80: f32,
    br: f32,
) {
    if let Some(p) = processor(handle) {
        p.set_target_params(ReverbTargetParams { t60, edt, c80, br });
    }
}

/// Start a background search; ignored while one is running.
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_start_generate(handle: *const GenReverbProcessor) {
    if let Some(p) = processor(handle) {
        p.start_generate();
    }
}

/// Cancel a running search and wait for it to stop. The current IR stays live.
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_cancel_ir(handle: *const GenReverbProcessor) {
    if let Some(p) = processor(handle) {
        p.cancel_ir();
    }
}

/// Install an IR supplied by the host. Returns false if it was rejected
/// (null, empty or silent) or the handle is null.
///
/// # Safety
/// `handle` must be null or a live handle; `ir` must point to `len` readable floats.
#[no_mangle]
pub unsafe extern "C" fn genreverb_set_ir(handle: *const GenReverbProcessor, ir: *const f32, len: u32) -> bool {
    let Some(p) = processor(handle) else { return false };
    if ir.is_null() || len == 0 {
        return false;
    }
    p.set_ir(slice::from_raw_parts(ir, len as usize)).is_ok()
}

/// Stop generation and drop the IR (plugin teardown).
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_release(handle: *const GenReverbProcessor) {
    if let Some(p) = processor(handle) {
        p.release();
    }
}

// --- Status ----------------------------------------------------------------------

/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_is_generating(handle: *const GenReverbProcessor) -> bool {
    processor(handle).is_some_and(ConvolutionProcessor::is_generating)
}

/// Generation progress in [0, 1]; 0 for a null handle.
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_progress(handle: *const GenReverbProcessor) -> f32 {
    processor(handle).map_or(0.0, ConvolutionProcessor::progress)
}

/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn genreverb_is_ready(handle: *const GenReverbProcessor) -> bool {
    processor(handle).is_some_and(ConvolutionProcessor::is_ready)
}

// --- Rendering -------------------------------------------------------------------

/// Convolve `frames` samples of planar stereo. Realtime safe.
///
/// Null outputs are skipped; with a null handle or null inputs the non-null
/// outputs are filled with silence.
///
/// # Safety
/// Each non-null pointer must address `frames` floats; outputs must not alias
/// each other or the inputs.
#[no_mangle]
pub unsafe extern "C" fn genreverb_process(
    handle: *const GenReverbProcessor,
    in_l: *const f32,
    in_r: *const f32,
    out_l: *mut f32,
    out_r: *mut f32,
    frames: u32,
) {
    let n = frames as usize;
    if out_l.is_null() || out_r.is_null() {
        for out in [out_l, out_r] {
            if !out.is_null() {
                slice::from_raw_parts_mut(out, n).fill(0.0);
            }
        }
        return;
    }
    let out_l = slice::from_raw_parts_mut(out_l, n);
    let out_r = slice::from_raw_parts_mut(out_r, n);

    match processor(handle) {
        Some(p) if !in_l.is_null() && !in_r.is_null() => {
            p.process(slice::from_raw_parts(in_l, n), slice::from_raw_parts(in_r, n), out_l, out_r);
        }
        _ => {
            out_l.fill(0.0);
            out_r.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn null_handles_are_inert() {
        unsafe {
            genreverb_destroy(ptr::null_mut());
            genreverb_prepare(ptr::null(), 48_000.0, 256);
            genreverb_start_generate(ptr::null());
            assert!(!genreverb_is_generating(ptr::null()));
            assert_eq!(genreverb_progress(ptr::null()), 0.0);
            assert!(!genreverb_set_ir(ptr::null(), [1.0f32].as_ptr(), 1));

            let mut l = [1.0f32; 8];
            let mut r = [1.0f32; 8];
            genreverb_process(ptr::null(), ptr::null(), ptr::null(), l.as_mut_ptr(), r.as_mut_ptr(), 8);
            assert!(l.iter().chain(&r).all(|&s| s == 0.0));
        }
    }

    #[test]
    fn host_ir_round_trip() {
        let h = genreverb_create();
        unsafe {
            genreverb_prepare(h, 48_000.0, 16);
            let ir = [0.0f32, 0.5];
            assert!(genreverb_set_ir(h, ir.as_ptr(), 2));
            assert!(genreverb_is_ready(h));

            let input = [1.0f32, 0.0, 0.0, 0.0];
            let mut l = [0.0f32; 4];
            let mut r = [0.0f32; 4];
            genreverb_process(h, input.as_ptr(), input.as_ptr(), l.as_mut_ptr(), r.as_mut_ptr(), 4);
            assert!((l[1] - 0.5).abs() < 1e-5 && (r[1] - 0.5).abs() < 1e-5);

            assert!(!genreverb_set_ir(h, ptr::null(), 4));
            genreverb_release(h);
            assert!(!genreverb_is_ready(h));
            genreverb_destroy(h);
        }
    }

    #[test]
    fn seeded_generation_completes() {
        let h = genreverb_create_with(4, 2, 0.01, 3, true);
        unsafe {
            genreverb_prepare(h, 8_000.0, 64);
            genreverb_set_target_params(h, 0.2, 0.05, 6.0, 0.7);
            genreverb_start_generate(h);
            while genreverb_is_generating(h) {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            assert!(genreverb_is_ready(h));
            assert!((genreverb_progress(h) - 1.0).abs() < f32::EPSILON);
            genreverb_destroy(h);
        }
    }
}
