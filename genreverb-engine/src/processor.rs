//! Convolution processor: background IR generation + realtime convolution.
//!
//! [`ConvolutionProcessor`] is the surface a host talks to. Every method takes
//! `&self`, so one instance can be shared (e.g. in an `Arc`) between the audio
//! callback and a control/UI thread:
//!
//! - audio thread   : [`process`](ConvolutionProcessor::process),
//!   [`progress`](ConvolutionProcessor::progress),
//!   [`is_generating`](ConvolutionProcessor::is_generating)
//! - control thread : everything else
//!
//! Threading
//! - At most one worker thread runs the genetic search. It owns the
//!   [`GeneticSynth`] while running and hands it back through its join handle.
//! - The convolver pair sits behind an `RwLock`. The audio thread only ever
//!   *tries* the read side; the write side is held just long enough to swap a
//!   fully built pair in or out, never while the search runs.
//! - Progress and run state are plain atomics.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use atomic_float::AtomicF32;
use genreverb_core::{CancelToken, GeneticSynth, ReverbTargetParams};
use parking_lot::{Mutex, RwLock};

use crate::config::{ProcessorConfig, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use crate::error::EngineError;
use crate::kernel::ImpulseKernel;
use crate::stereo::ConvolverPair;

/// State touched by the audio thread and the worker.
#[derive(Debug, Default)]
struct Shared {
    ready: AtomicBool,
    generating: AtomicBool,
    progress: AtomicF32,
    convolvers: RwLock<ConvolverPair>,
}

impl Shared {
    /// Build everything for `ir` unlocked, then swap it in under the write lock.
    fn install(&self, max_block_size: usize, ir: &[f32]) -> Result<(), EngineError> {
        let kernel = Arc::new(ImpulseKernel::new(max_block_size, ir)?);
        let pair = ConvolverPair::with_kernel(&kernel)?;

        let old = {
            let mut guard = self.convolvers.write();
            let old = mem::replace(&mut *guard, pair);
            self.ready.store(true, Ordering::Release);
            old
        };
        drop(old);
        Ok(())
    }

    fn clear(&self) {
        let old = {
            let mut guard = self.convolvers.write();
            self.ready.store(false, Ordering::Release);
            mem::take(&mut *guard)
        };
        drop(old);
    }

    fn set_idle(&self) {
        self.generating.store(false, Ordering::Release);
        self.progress.store(0.0, Ordering::Release);
    }
}

/// State owned by the control side.
#[derive(Debug)]
struct Control {
    sample_rate: f32,
    max_block_size: usize,
    params: ReverbTargetParams,
    synth: Option<GeneticSynth>,
    cancel: CancelToken,
    worker: Option<JoinHandle<GeneticSynth>>,
}

/// Genetic IR synthesis feeding a stereo partitioned convolver.
#[derive(Debug)]
pub struct ConvolutionProcessor {
    config: ProcessorConfig,
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl Default for ConvolutionProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

impl ConvolutionProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        let synth = GeneticSynth::new(config.genetic(DEFAULT_SAMPLE_RATE));
        let control = Control {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            params: ReverbTargetParams::default(),
            cancel: synth.cancel_token(),
            synth: Some(synth),
            worker: None,
        };
        Self { config, shared: Arc::new(Shared::default()), control: Mutex::new(control) }
    }

    #[inline] pub fn config(&self) -> &ProcessorConfig { &self.config }

    /// Reconfigure for a new stream format.
    ///
    /// Stops any running generation, drops the installed IR (output is silent
    /// until the next IR lands) and sizes a fresh synthesizer for `sample_rate`.
    /// Control thread only.
    pub fn prepare(&self, sample_rate: f64, max_block_size: usize) {
        let mut ctl = self.control.lock();
        self.stop_worker(&mut ctl);

        #[allow(clippy::cast_possible_truncation)]
        let sr = sample_rate as f32;
        if sr.is_finite() && sr > 0.0 {
            ctl.sample_rate = sr;
        } else {
            log::warn!("prepare: ignoring invalid sample rate {sample_rate}, keeping {}", ctl.sample_rate);
        }
        ctl.max_block_size = max_block_size;

        let synth = GeneticSynth::new(self.config.genetic(ctl.sample_rate));
        ctl.cancel = synth.cancel_token();
        ctl.synth = Some(synth);

        self.shared.clear();
        log::info!("prepared: {} Hz, max block {}", ctl.sample_rate, ctl.max_block_size);
    }

    /// Replace the targets used by the next [`start_generate`](Self::start_generate).
    pub fn set_target_params(&self, params: ReverbTargetParams) {
        self.control.lock().params = params;
    }

    pub fn target_params(&self) -> ReverbTargetParams {
        self.control.lock().params
    }

    /// Launch a background search for the current targets. No-op while one is running.
    pub fn start_generate(&self) {
        let mut ctl = self.control.lock();
        if self.shared.generating.load(Ordering::Acquire) {
            log::debug!("start_generate: already generating");
            return;
        }
        self.join_worker(&mut ctl);

        let mut synth = match ctl.synth.take() {
            Some(s) => s,
            None => {
                let s = GeneticSynth::new(self.config.genetic(ctl.sample_rate));
                ctl.cancel = s.cancel_token();
                s
            }
        };
        // Reset here, not in the worker, so a cancel issued right after this
        // call cannot be wiped out by a late reset.
        ctl.cancel.reset();

        let sink = Arc::clone(&self.shared);
        synth.set_progress_callback(Some(Box::new(move |p| {
            sink.progress.store(p.fraction(), Ordering::Release);
        })));

        self.shared.progress.store(0.0, Ordering::Release);
        self.shared.generating.store(true, Ordering::Release);

        let job = Job {
            shared: Arc::clone(&self.shared),
            params: ctl.params,
            generations: self.config.generations,
            max_block_size: ctl.max_block_size,
        };
        let spawned = thread::Builder::new()
            .name("genreverb-ga".into())
            .spawn(move || job.run(synth));

        match spawned {
            Ok(handle) => ctl.worker = Some(handle),
            Err(e) => {
                log::error!("start_generate: failed to spawn worker: {e}");
                self.shared.set_idle();
            }
        }
    }

    /// Stop a running search and wait for the worker to exit.
    ///
    /// Blocks until the current generation finishes; never call from the audio thread.
    pub fn cancel_ir(&self) {
        let mut ctl = self.control.lock();
        if !self.shared.generating.load(Ordering::Acquire) {
            return;
        }
        self.stop_worker(&mut ctl);
        log::info!("IR generation cancelled");
    }

    #[inline]
    pub fn is_generating(&self) -> bool {
        self.shared.generating.load(Ordering::Acquire)
    }

    /// Fraction of the generation budget completed, in [0, 1].
    #[inline]
    pub fn progress(&self) -> f32 {
        self.shared.progress.load(Ordering::Acquire)
    }

    /// True once an IR is installed and `process` convolves.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Install an externally supplied IR (same swap as a finished search).
    pub fn set_ir(&self, ir: &[f32]) -> Result<(), EngineError> {
        // Held across the install so a concurrent `prepare` cannot slip in
        // between and leave a kernel sized for the old block length.
        let ctl = self.control.lock();
        self.shared.install(ctl.max_block_size, ir).inspect_err(|e| {
            log::error!("set_ir: {e}");
        })
    }

    /// The IR currently being convolved with. Control thread only.
    pub fn installed_ir(&self) -> Option<Arc<[f32]>> {
        self.shared.convolvers.read().ir()
    }

    /// Realtime entry point: convolve one stereo block.
    ///
    /// Processes `min` of the four slice lengths and zero-fills the rest of the
    /// outputs. Outputs silence when no IR is installed or the IR is being
    /// swapped at this instant. Never blocks, never allocates.
    pub fn process(&self, in_l: &[f32], in_r: &[f32], out_l: &mut [f32], out_r: &mut [f32]) {
        let n = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());
        out_l[n..].fill(0.0);
        out_r[n..].fill(0.0);

        if !self.shared.ready.load(Ordering::Acquire) {
            out_l.fill(0.0);
            out_r.fill(0.0);
            return;
        }
        let Some(pair) = self.shared.convolvers.try_read() else {
            out_l.fill(0.0);
            out_r.fill(0.0);
            return;
        };
        if !pair.process(&in_l[..n], &in_r[..n], &mut out_l[..n], &mut out_r[..n]) {
            out_l.fill(0.0);
            out_r.fill(0.0);
        }
    }

    /// Teardown: stop the worker and drop the installed IR.
    pub fn release(&self) {
        let mut ctl = self.control.lock();
        self.stop_worker(&mut ctl);
        self.shared.clear();
    }

    /// Cancel and join whatever is running, then mark the processor idle.
    fn stop_worker(&self, ctl: &mut Control) {
        if ctl.worker.is_some() {
            ctl.cancel.cancel();
        }
        self.join_worker(ctl);
        self.shared.set_idle();
    }

    /// Take back the synthesizer from a finished (or finishing) worker.
    fn join_worker(&self, ctl: &mut Control) {
        let Some(handle) = ctl.worker.take() else { return };
        match handle.join() {
            Ok(synth) => ctl.synth = Some(synth),
            Err(_) => {
                log::error!("IR worker panicked; a new synthesizer will be created");
                ctl.synth = None;
                self.shared.generating.store(false, Ordering::Release);
            }
        }
    }
}

impl Drop for ConvolutionProcessor {
    fn drop(&mut self) {
        self.release();
    }
}

/// Everything one worker run needs besides the synthesizer itself.
struct Job {
    shared: Arc<Shared>,
    params: ReverbTargetParams,
    generations: usize,
    max_block_size: usize,
}

impl Job {
    fn run(self, mut synth: GeneticSynth) -> GeneticSynth {
        let result = synth.compute(&self.params, self.generations);
        synth.set_progress_callback(None);

        match result {
            Ok(_) if synth.cancel_token().is_cancelled() => {
                log::info!("IR generation cancelled; keeping the current IR");
            }
            Ok(ir) => match self.shared.install(self.max_block_size, &ir) {
                Ok(()) => {
                    self.shared.progress.store(1.0, Ordering::Release);
                    log::info!("installed generated IR ({} samples)", ir.len());
                }
                Err(e) => log::error!("generated IR could not be installed: {e}"),
            },
            Err(e) => log::warn!("IR generation produced nothing: {e}"),
        }

        self.shared.generating.store(false, Ordering::Release);
        synth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn small() -> ConvolutionProcessor {
        ConvolutionProcessor::new(
            ProcessorConfig::default()
                .with_population_size(4)
                .with_generations(3)
                .with_seed(Some(11)),
        )
    }

    fn wait_idle(p: &ConvolutionProcessor) {
        let start = Instant::now();
        while p.is_generating() {
            assert!(start.elapsed() < Duration::from_secs(60), "generation never finished");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn silent_before_any_ir() {
        let p = small();
        p.prepare(48_000.0, 256);
        let mut l = vec![1.0; 256];
        let mut r = vec![1.0; 256];
        p.process(&[0.7; 256], &[0.7; 256], &mut l, &mut r);
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
        assert!(!p.is_ready());
    }

    #[test]
    fn set_ir_then_prepare_clears() {
        let p = small();
        p.prepare(48_000.0, 64);
        p.set_ir(&[1.0, 0.5]).unwrap();
        assert!(p.is_ready());

        let mut l = [0.0; 4];
        let mut r = [0.0; 4];
        p.process(&[1.0, 0.0, 0.0, 0.0], &[0.0; 4], &mut l, &mut r);
        assert!((l[1] - 0.5).abs() < 1e-5);

        p.prepare(48_000.0, 64);
        assert!(!p.is_ready());
        assert!(p.installed_ir().is_none());
    }

    #[test]
    fn rejected_ir_keeps_silence() {
        let p = small();
        p.prepare(48_000.0, 64);
        assert_eq!(p.set_ir(&[]).unwrap_err(), EngineError::EmptyImpulse);
        assert!(!p.is_ready());
    }

    #[test]
    fn generation_installs_ir_and_reports_done() {
        let p = small();
        p.prepare(8_000.0, 128);
        p.set_target_params(ReverbTargetParams::new(0.2, 6.0));
        p.start_generate();
        wait_idle(&p);

        assert!(p.is_ready());
        assert!((p.progress() - 1.0).abs() < f32::EPSILON);
        let ir = p.installed_ir().unwrap();
        assert_eq!(ir.len(), 1024.max((0.2_f32 * 1.5 * 8_000.0).round() as usize));
    }

    #[test]
    fn start_while_running_is_noop_and_cancel_resets() {
        let p = ConvolutionProcessor::new(
            ProcessorConfig::default().with_population_size(4).with_generations(100_000).with_seed(Some(2)),
        );
        p.prepare(8_000.0, 128);
        p.start_generate();
        p.start_generate();
        assert!(p.is_generating());

        p.cancel_ir();
        assert!(!p.is_generating());
        assert_eq!(p.progress(), 0.0);
        // A cancelled search never replaces the live IR.
        assert!(!p.is_ready());

        // The synthesizer came back from the worker and can run again.
        p.cancel_ir();
        p.start_generate();
        p.release();
        assert!(!p.is_generating());
    }

    #[test]
    fn zero_population_clears_generating() {
        let p = ConvolutionProcessor::new(ProcessorConfig::default().with_population_size(0));
        p.prepare(8_000.0, 64);
        p.start_generate();
        wait_idle(&p);
        assert!(!p.is_ready());
    }

    #[test]
    fn set_ir_never_outlives_a_concurrent_prepare() {
        let p = Arc::new(small());
        p.prepare(48_000.0, 64);

        let preparer = {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                for i in 0..300 {
                    p.prepare(48_000.0, if i % 2 == 0 { 64 } else { 512 });
                }
            })
        };
        let loader = {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                for _ in 0..300 {
                    let _ = p.set_ir(&[1.0, 0.5, 0.25]);
                }
            })
        };

        while !preparer.is_finished() || !loader.is_finished() {
            let ctl = p.control.lock();
            let pair = p.shared.convolvers.read();
            if let Some(kernel) = pair.kernel() {
                assert_eq!(kernel.block_size(), ctl.max_block_size.next_power_of_two());
            }
        }
        preparer.join().unwrap();
        loader.join().unwrap();
    }

    #[test]
    fn polling_installed_ir_never_silences_audio() {
        let p = Arc::new(small());
        p.prepare(48_000.0, 64);
        p.set_ir(&[1.0]).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let poller = {
            let p = Arc::clone(&p);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut polls = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    assert!(p.installed_ir().is_some());
                    polls += 1;
                }
                polls
            })
        };

        let mut l = [0.0; 64];
        let mut r = [0.0; 64];
        for _ in 0..20_000 {
            p.process(&[0.5; 64], &[0.5; 64], &mut l, &mut r);
            assert!(l.iter().chain(&r).all(|s| (s - 0.5).abs() < 1e-5), "block went silent");
        }
        stop.store(true, Ordering::Relaxed);
        assert!(poller.join().unwrap() > 0);
    }

    #[test]
    fn target_params_apply_to_next_run() {
        let p = small();
        let params = ReverbTargetParams { t60: 1.2, edt: 0.1, c80: -3.0, br: 1.1 };
        p.set_target_params(params);
        assert_eq!(p.target_params(), params);
    }
}
