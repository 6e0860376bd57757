//! GenReverb CLI — evolve an impulse response toward target descriptors, then
//! hear it: render a click train offline to WAV, or play it live while the IR
//! evolves.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use genreverb_core::analysis::measure;
use genreverb_core::dsp::{db_to_lin, lin_to_db};
use genreverb_core::ReverbTargetParams;
use genreverb_engine::{ConvolutionProcessor, ProcessorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "genreverb", author, version, about = "Evolve a reverb impulse response and listen through it")]
struct Args {
    /// Target reverberation time in seconds
    #[arg(long, default_value_t = 0.4)]
    t60: f32,

    /// Target early decay time in seconds (reported, not optimized)
    #[arg(long, default_value_t = 0.06)]
    edt: f32,

    /// Target clarity C80 in dB
    #[arg(long, default_value_t = 12.0)]
    c80: f32,

    /// Target bass ratio (reported, not optimized)
    #[arg(long, default_value_t = 0.7)]
    br: f32,

    #[arg(long, default_value_t = 250)]
    generations: usize,

    #[arg(long, default_value_t = 50)]
    population: usize,

    #[arg(long, default_value_t = 0.001)]
    mutation_rate: f32,

    /// Seed for a reproducible search
    #[arg(long)]
    seed: Option<u64>,

    /// Sample rate; live playback defaults to the device rate, offline to 48000
    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long, default_value_t = 512)]
    block_size: usize,

    /// Render a click train through the reverb into this WAV file instead of playing live
    #[arg(long, value_name = "WAV")]
    offline: Option<PathBuf>,

    /// Also write the generated IR (mono, float) to this WAV file
    #[arg(long, value_name = "WAV")]
    ir_out: Option<PathBuf>,

    /// Seconds to render or play (offline default: 2 x T60 + 1 s; live default: until Ctrl+C)
    #[arg(long)]
    duration: Option<f32>,

    /// Wet/dry balance in [0, 1]
    #[arg(long, default_value_t = 1.0)]
    wet: f32,

    /// Output gain in dB
    #[arg(long, default_value_t = -6.0, allow_negative_numbers = true)]
    gain: f32,

    /// Output device name (see --list-devices)
    #[arg(long)]
    device: Option<String>,

    #[arg(long, default_value_t = false)]
    list_devices: bool,
}

impl Args {
    fn targets(&self) -> ReverbTargetParams {
        ReverbTargetParams { t60: self.t60, edt: self.edt, c80: self.c80, br: self.br }
    }

    fn gain_lin(&self) -> f32 {
        db_to_lin(self.gain)
    }

    fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default()
            .with_population_size(self.population)
            .with_mutation_rate(self.mutation_rate)
            .with_generations(self.generations)
            .with_seed(self.seed)
    }
}

// --------------------------------- Signal + mix ----------------------------------

/// One full-scale click per second: the classic way to audition a reverb tail.
struct ClickTrain {
    period: usize,
    pos: usize,
}

impl ClickTrain {
    fn new(sample_rate: u32) -> Self {
        Self { period: sample_rate.max(1) as usize, pos: 0 }
    }

    fn fill(&mut self, out: &mut [f32]) {
        for s in out {
            *s = if self.pos == 0 { 0.8 } else { 0.0 };
            self.pos = (self.pos + 1) % self.period;
        }
    }
}

/// Planar scratch for one block, allocated once.
struct Block {
    dry: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Block {
    fn new(size: usize) -> Self {
        Self { dry: vec![0.0; size], left: vec![0.0; size], right: vec![0.0; size] }
    }

    /// Generate `n` frames of dry signal and run them through the processor.
    fn render(&mut self, n: usize, clicks: &mut ClickTrain, processor: &ConvolutionProcessor) {
        clicks.fill(&mut self.dry[..n]);
        let dry = &self.dry[..n];
        processor.process(dry, dry, &mut self.left[..n], &mut self.right[..n]);
    }

    #[inline]
    fn frame(&self, i: usize, wet: f32, gain: f32) -> (f32, f32) {
        let d = self.dry[i] * (1.0 - wet);
        let l = (self.left[i] * wet + d) * gain;
        let r = (self.right[i] * wet + d) * gain;
        (l.clamp(-1.0, 1.0), r.clamp(-1.0, 1.0))
    }
}

// --------------------------------- Generation ------------------------------------

/// Run the search to completion, drawing a progress line on stderr.
fn generate(processor: &ConvolutionProcessor, args: &Args, sample_rate: u32) -> Result<Arc<[f32]>> {
    processor.set_target_params(args.targets());
    tracing::info!(
        t60 = args.t60, c80 = args.c80, generations = args.generations, population = args.population,
        "evolving impulse response"
    );

    let started = Instant::now();
    processor.start_generate();
    while processor.is_generating() {
        eprint!("\r[gen] {:5.1}%  {:>6.1}s", processor.progress() * 100.0, started.elapsed().as_secs_f32());
        thread::sleep(Duration::from_millis(100));
    }
    eprintln!("\r[gen] {:5.1}%  {:>6.1}s", processor.progress() * 100.0, started.elapsed().as_secs_f32());

    let ir = processor
        .installed_ir()
        .context("generation finished without producing an impulse response")?;

    let got = measure(&ir, sample_rate as f32);
    println!("IR: {} samples ({:.2} s)", ir.len(), ir.len() as f32 / sample_rate as f32);
    println!("         target   measured");
    println!("  T60  {:>8.3}  {:>9.3} s", args.t60, got.t60);
    println!("  EDT  {:>8.3}  {:>9.3} s", args.edt, got.edt);
    println!("  C80  {:>8.2}  {:>9.2} dB", args.c80, got.c80);

    if let Some(path) = &args.ir_out {
        write_wav(path, sample_rate, 1, ir.iter().copied())?;
        println!("IR written to {}", path.display());
    }
    Ok(ir)
}

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: impl Iterator<Item = f32>) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize().context("failed to finalize WAV")?;
    Ok(())
}

// --------------------------------- Offline ---------------------------------------

fn run_offline(args: &Args, path: &Path) -> Result<()> {
    let sr = args.sample_rate.unwrap_or(48_000);
    let processor = ConvolutionProcessor::new(args.processor_config());
    processor.prepare(f64::from(sr), args.block_size);
    generate(&processor, args, sr)?;

    let seconds = args.duration.unwrap_or(2.0 * args.t60 + 1.0).max(0.0);
    let frames = (seconds * sr as f32).round() as usize;
    let wet = args.wet.clamp(0.0, 1.0);
    let gain = args.gain_lin();

    let mut clicks = ClickTrain::new(sr);
    let mut block = Block::new(args.block_size.max(1));
    let mut out = Vec::with_capacity(frames * 2);
    let mut peak = 0.0_f32;

    let mut done = 0;
    while done < frames {
        let n = (frames - done).min(block.dry.len());
        block.render(n, &mut clicks, &processor);
        for i in 0..n {
            let (l, r) = block.frame(i, wet, gain);
            peak = peak.max(l.abs()).max(r.abs());
            out.push(l);
            out.push(r);
        }
        done += n;
    }

    write_wav(path, sr, 2, out.into_iter())?;
    println!("Rendered {seconds:.2} s to {} (peak {:.1} dBFS)", path.display(), lin_to_db(peak));
    Ok(())
}

// --------------------------------- Realtime --------------------------------------

#[cfg(feature = "realtime")]
mod live {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    pub fn list_output_devices() -> Result<()> {
        let host = cpal::default_host();
        println!("Available output devices:");
        for dev in host.output_devices()? {
            println!("- {}", dev.name()?);
        }
        Ok(())
    }

    fn pick_device(name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(name) = name {
            for d in host.output_devices()? {
                if d.name()? == name {
                    return Ok(d);
                }
            }
            bail!("requested device not found: {name}");
        }
        host.default_output_device().context("no default output device")
    }

    /// Prefer stereo at the requested rate; fall back to the closest range.
    fn choose_config(device: &cpal::Device, req_sr: Option<u32>) -> Result<cpal::SupportedStreamConfig> {
        let Some(req_sr) = req_sr else {
            return Ok(device.default_output_config()?);
        };

        let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
        for range in device.supported_output_configs()? {
            let lo = range.min_sample_rate().0;
            let hi = range.max_sample_rate().0;
            let ch_pen = u64::from(range.channels().abs_diff(2));
            let sr_pen = if (lo..=hi).contains(&req_sr) {
                0
            } else {
                u64::from(lo.abs_diff(req_sr).min(hi.abs_diff(req_sr)))
            };
            let score = sr_pen.saturating_mul(1000) + ch_pen;
            if best.as_ref().map_or(true, |(s, _)| score < *s) {
                best = Some((score, range));
            }
        }

        let (_, range) = best.context("no supported output configs")?;
        let sr = req_sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
        Ok(range.with_sample_rate(cpal::SampleRate(sr)))
    }

    fn build_stream<T>(
        device: &cpal::Device,
        cfg: &cpal::StreamConfig,
        processor: Arc<ConvolutionProcessor>,
        block_size: usize,
        wet: f32,
        gain: f32,
    ) -> Result<cpal::Stream>
    where
        T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
    {
        let channels = usize::from(cfg.channels);
        let mut clicks = ClickTrain::new(cfg.sample_rate.0);
        let mut block = Block::new(block_size.max(1));

        // ~1 second meter
        let meter_interval = cfg.sample_rate.0.max(1) as usize;
        let mut meter_count = 0usize;
        let mut meter_peak = 0.0_f32;

        let stream = device.build_output_stream(
            cfg,
            move |output: &mut [T], _| {
                for chunk in output.chunks_mut(block.dry.len() * channels) {
                    let n = chunk.len() / channels;
                    block.render(n, &mut clicks, &processor);
                    for (i, frame) in chunk.chunks_mut(channels).enumerate() {
                        let (l, r) = block.frame(i, wet, gain);
                        if channels == 1 {
                            frame[0] = T::from_sample(0.5 * (l + r));
                        } else {
                            for (c, s) in frame.iter_mut().enumerate() {
                                *s = T::from_sample(match c {
                                    0 => l,
                                    1 => r,
                                    _ => 0.0,
                                });
                            }
                        }
                        meter_peak = meter_peak.max(l.abs()).max(r.abs());
                    }
                    meter_count += n;
                    if meter_count >= meter_interval {
                        tracing::debug!(peak_db = lin_to_db(meter_peak), "meter");
                        meter_peak = 0.0;
                        meter_count = 0;
                    }
                }
            },
            |e| tracing::error!("stream error: {e}"),
            None,
        )?;
        Ok(stream)
    }

    pub fn run(args: &Args) -> Result<()> {
        let device = pick_device(args.device.as_deref())?;
        let supported = choose_config(&device, args.sample_rate)?;
        let sample_format = supported.sample_format();
        let cfg = supported.config();
        let sr = cfg.sample_rate.0;

        let processor = Arc::new(ConvolutionProcessor::new(args.processor_config()));
        processor.prepare(f64::from(sr), args.block_size);

        let wet = args.wet.clamp(0.0, 1.0);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, Arc::clone(&processor), args.block_size, wet, args.gain_lin())?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, Arc::clone(&processor), args.block_size, wet, args.gain_lin())?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, Arc::clone(&processor), args.block_size, wet, args.gain_lin())?,
            other => bail!("unsupported device sample format: {other:?}"),
        };

        println!("Using device: {}", device.name()?);
        println!("Stream config: {cfg:?} (sample_format: {sample_format:?})");
        stream.play()?;

        // The stream is already running: the dry clicks play while the IR evolves.
        generate(&processor, args, sr)?;

        match args.duration {
            Some(d) => {
                println!("Auto-stop after {d} seconds");
                thread::sleep(Duration::from_secs_f32(d.max(0.0)));
                processor.release();
                Ok(())
            }
            None => {
                println!("Press Ctrl+C to stop…");
                loop {
                    thread::sleep(Duration::from_millis(500));
                }
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();

    if args.list_devices {
        #[cfg(feature = "realtime")]
        return live::list_output_devices();
        #[cfg(not(feature = "realtime"))]
        bail!("built without the `realtime` feature; no devices to list");
    }

    println!("genreverb — evolved convolution reverb\n");

    if let Some(path) = args.offline.clone() {
        return run_offline(&args, &path);
    }

    #[cfg(feature = "realtime")]
    return live::run(&args);
    #[cfg(not(feature = "realtime"))]
    bail!("built without the `realtime` feature; pass --offline <WAV>");
}
