//! tuner-cli - offline pitch-detection smoke test
//!
//! Generates a short test tone (or reads raw little-endian f32 samples from
//! stdin), runs it through the full pipeline, and prints the detected
//! frequency/clarity per frame. Not a host integration - the real audio I/O
//! runtime is out of scope for this crate.

use std::io::Read;

use anyhow::{Context, Result};

use tuner_core::{AgcConfig, Algorithm, DetectorConfig, Pipeline};

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    match name {
        "yin" => Ok(Algorithm::Yin),
        "mpm" => Ok(Algorithm::Mpm),
        "pyin" => Ok(Algorithm::Pyin),
        "baseline" => Ok(Algorithm::Baseline),
        other => anyhow::bail!("unknown algorithm '{other}' (expected yin|mpm|pyin|baseline)"),
    }
}

fn read_stdin_samples() -> Result<Vec<f32>> {
    let mut bytes = Vec::new();
    std::io::stdin()
        .read_to_end(&mut bytes)
        .context("reading raw f32 samples from stdin")?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn test_tone(freq: f32, rate: u32, seconds: f32) -> Vec<f32> {
    let n = (rate as f32 * seconds) as usize;
    (0..n)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let algorithm = args.next().unwrap_or_else(|| "yin".to_string());
    let algorithm = parse_algorithm(&algorithm)?;
    let use_stdin = args.next().as_deref() == Some("--stdin");

    let device_rate = 44_100;
    let detector_config = DetectorConfig {
        algorithm,
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(device_rate, AgcConfig::default(), detector_config)
        .context("constructing pipeline")?;

    let samples = if use_stdin {
        log::info!("reading samples from stdin");
        read_stdin_samples()?
    } else {
        log::info!("no --stdin flag given, generating a 440 Hz test tone");
        test_tone(440.0, device_rate, 1.0)
    };

    for chunk in samples.chunks(512) {
        if let Some((hz, clarity)) = pipeline.process(chunk, true)? {
            println!("{hz:.2} Hz  clarity={clarity:.3}");
        }
    }

    Ok(())
}
