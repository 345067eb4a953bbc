//! End-to-end scenarios covering the full conditioning + detection chain.

use tuner_core::agc::AgcConfig;
use tuner_core::engine::{build_detector, Algorithm, DetectorConfig, PitchEngine};
use tuner_core::pyin::PyinEngine;
use tuner_core::resampler::Resampler;

fn sine(freq: f32, rate: u32, n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
        .collect()
}

fn square(freq: f32, rate: u32, n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = (freq * i as f32 / rate as f32).fract();
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        })
        .collect()
}

fn harmonic(freq: f32, amps: &[f32], rate: u32, n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = i as f32 / rate as f32;
            amps.iter()
                .enumerate()
                .map(|(h, &a)| a * (2.0 * std::f32::consts::PI * freq * (h + 1) as f32 * t).sin())
                .sum()
        })
        .collect()
}

/// Scenario 1: A4 sine, YIN.
#[test]
fn scenario_1_a4_sine_yin() {
    let config = DetectorConfig {
        algorithm: Algorithm::Yin,
        sample_rate: 44_100,
        frame_size: 1024,
        yin_threshold: 0.1,
        ..Default::default()
    };
    let mut detector = build_detector(config).unwrap();
    let frame = sine(440.0, 44_100, 1024);
    let (hz, clarity) = detector.find_pitch(&frame).unwrap();
    assert!((436.0..=444.0).contains(&hz), "hz={hz}");
    assert!(clarity > 0.9, "clarity={clarity}");
}

/// Scenario 2: square 220 Hz, pYIN, no octave error.
#[test]
fn scenario_2_square_220_pyin_no_octave_error() {
    let config = DetectorConfig {
        algorithm: Algorithm::Pyin,
        sample_rate: 44_100,
        frame_size: 2048,
        min_freq: 80.0,
        max_freq: 1000.0,
        ..Default::default()
    };
    let mut detector = build_detector(config).unwrap();
    let frame = square(220.0, 44_100, 2048);
    let (hz, _) = detector.find_pitch(&frame).unwrap();
    if hz > 0.0 {
        assert!((210.0..=230.0).contains(&hz), "hz={hz}");
        assert!((hz - 440.0).abs() > 10.0);
        assert!((hz - 660.0).abs() > 10.0);
    }
}

/// Scenario 3: harmonic 220 Hz, MPM.
#[test]
fn scenario_3_harmonic_220_mpm() {
    let config = DetectorConfig {
        algorithm: Algorithm::Mpm,
        sample_rate: 44_100,
        frame_size: 2048,
        mpm_threshold: 0.93,
        ..Default::default()
    };
    let mut detector = build_detector(config).unwrap();
    let frame = harmonic(220.0, &[1.0, 0.5, 0.3, 0.2], 44_100, 2048);
    let (hz, clarity) = detector.find_pitch(&frame).unwrap();
    assert!((213.0..=227.0).contains(&hz), "hz={hz}");
    assert!(clarity > 0.7, "clarity={clarity}");
}

/// Scenario 4: noise burst between clean frames, pYIN batch.
#[test]
fn scenario_4_noise_burst_pyin_batch() {
    let config = DetectorConfig {
        algorithm: Algorithm::Pyin,
        sample_rate: 44_100,
        frame_size: 2048,
        min_freq: 80.0,
        max_freq: 800.0,
        ..Default::default()
    };
    let mut engine = PyinEngine::new(config).unwrap();

    let clean = sine(440.0, 44_100, 2048);
    let mut seed = 42u32;
    let mixed: Vec<f32> = (0..2048)
        .map(|i| {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            let noise = ((seed >> 8) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0;
            0.2 * noise + 0.3 * clean[i]
        })
        .collect();

    let frames: Vec<&[f32]> = vec![&clean, &mixed, &clean];
    let track = engine.detect_pitch_track(&frames).unwrap();
    assert_eq!(track.len(), 3);
    for (hz, _) in &track {
        if *hz > 0.0 {
            assert!((*hz - 440.0).abs() < 20.0, "hz={hz}");
        }
    }
}

/// Scenario 5: resampler continuity, 44100 -> 10000 Hz.
#[test]
fn scenario_5_resampler_continuity() {
    let input = sine(440.0, 44_100, 200);

    let mut chunked = Resampler::new(44_100, 10_000).unwrap();
    let mut out = chunked.process(&input[..100]);
    out.extend(chunked.process(&input[100..]));

    let expected = (200.0 * 10_000.0 / 44_100.0).floor() as i64;
    assert!((out.len() as i64 - expected).abs() <= 2, "len={}", out.len());

    let mut single = Resampler::new(44_100, 10_000).unwrap();
    let out_single = single.process(&input);
    assert!((out.len() as i64 - out_single.len() as i64).abs() <= 2);
}

/// Scenario 6: AGC convergence on quiet white noise.
#[test]
fn scenario_6_agc_convergence() {
    use tuner_core::agc::AgcStage;

    let mut agc = AgcStage::new_at_rate(
        AgcConfig {
            target_level: 0.3,
            attack_time_ms: 3.0,
            release_time_ms: 100.0,
            ..Default::default()
        },
        44_100,
    );

    let mut seed = 7u32;
    let noise: Vec<f32> = (0..44_100)
        .map(|_| {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            0.05 * (((seed >> 8) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0)
        })
        .collect();

    let mut out = Vec::with_capacity(noise.len());
    // Process in small chunks so attack/release actually settle, rather
    // than computing one RMS over the entire second.
    for chunk in noise.chunks(512) {
        out.extend(agc.apply_gain(chunk, true));
    }

    assert!(out.iter().all(|&s| s.abs() <= 1.0));
    assert!(agc.envelope() >= 0.04 && agc.envelope() <= 0.08, "envelope={}", agc.envelope());
    let gain = agc.current_gain();
    assert!((1.0 / 0.25..=1.0 / 0.15).contains(&gain), "gain={gain}");
}
