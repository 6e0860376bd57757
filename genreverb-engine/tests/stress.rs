//! Audio thread hammering `process` while a control thread starts, cancels and
//! replaces IRs; every swap must be seen whole and by both channels at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use genreverb_engine::{ConvolutionProcessor, ProcessorConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn concurrent_control_never_corrupts_audio() {
    let p = Arc::new(ConvolutionProcessor::new(
        ProcessorConfig::default()
            .with_population_size(4)
            .with_generations(3)
            .with_seed(Some(99)),
    ));
    p.prepare(16_000.0, 128);
    let stop = Arc::new(AtomicBool::new(false));

    let audio = {
        let p = Arc::clone(&p);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let input: Vec<f32> = (0..128).map(|i| if i % 37 == 0 { 1.0 } else { 0.0 }).collect();
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            let mut blocks = 0usize;
            while !stop.load(Ordering::Relaxed) {
                // Vary the block length to exercise partial-block streaming.
                let n = 1 + blocks % 128;
                p.process(&input[..n], &input[..n], &mut l[..n], &mut r[..n]);
                assert!(l[..n].iter().chain(&r[..n]).all(|s| s.is_finite()));
                let prog = p.progress();
                assert!((0.0..=1.0).contains(&prog));
                blocks += 1;
            }
            blocks
        })
    };

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        match rng.gen_range(0..4) {
            0 => p.start_generate(),
            1 => p.cancel_ir(),
            2 => {
                let len = rng.gen_range(1..3000);
                let ir: Vec<f32> = (0..len).map(|_| rng.gen_range(-0.5..0.5)).collect();
                let _ = p.set_ir(&ir);
            }
            _ => thread::sleep(Duration::from_micros(rng.gen_range(0..500))),
        }
    }
    p.cancel_ir();

    stop.store(true, Ordering::Relaxed);
    let blocks = audio.join().expect("audio thread panicked");
    assert!(blocks > 0);
    assert!(!p.is_generating());
}

/// Gain of the single-tap IR installed at step `k`; every install is distinct.
fn tap_gain(k: usize) -> f32 {
    0.25 + k as f32 / 1024.0
}

#[test]
fn swaps_are_whole_and_shared_by_both_channels() {
    const INSTALLS: usize = 400;
    const BLOCK: usize = 64;

    let p = Arc::new(ConvolutionProcessor::default());
    p.prepare(48_000.0, BLOCK);
    let stop = Arc::new(AtomicBool::new(false));

    let audio = {
        let p = Arc::clone(&p);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut impulse = [0.0f32; BLOCK];
            impulse[0] = 1.0;
            let mut l = [0.0f32; BLOCK];
            let mut r = [0.0f32; BLOCK];
            let mut heard = 0usize;
            while !stop.load(Ordering::Relaxed) {
                p.process(&impulse, &impulse, &mut l, &mut r);
                assert_eq!(l, r, "channels diverged");
                assert!(l[1..].iter().all(|s| s.abs() < 1e-5), "tail from a torn kernel: {l:?}");
                if l[0] != 0.0 {
                    let k = ((l[0] - 0.25) * 1024.0).round();
                    assert!(
                        (0.0..INSTALLS as f32).contains(&k) && (l[0] - tap_gain(k as usize)).abs() < 1e-5,
                        "output {} matches no installed IR",
                        l[0]
                    );
                    heard += 1;
                }
            }
            heard
        })
    };

    for k in 0..INSTALLS {
        p.set_ir(&[tap_gain(k)]).expect("single tap IR");
        if k % 16 == 0 {
            thread::sleep(Duration::from_micros(200));
        }
    }
    thread::sleep(Duration::from_millis(5));

    stop.store(true, Ordering::Relaxed);
    let heard = audio.join().expect("audio thread panicked");
    assert!(heard > 0);
}
