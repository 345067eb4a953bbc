//! Pitch engine interface (C4) and detector registry (C6)
//!
//! A tagged enum over engines sharing one `find_pitch` contract, selected
//! and constructed once by the registry. No inheritance, no shared scratch
//! across engines.

use serde::{Deserialize, Serialize};

use crate::baseline::BaselineEngine;
use crate::error::PitchResult;
use crate::mpm::MpmEngine;
use crate::pyin::PyinEngine;
use crate::yin::YinEngine;

/// Which detection algorithm to construct (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Yin,
    Mpm,
    Pyin,
    Baseline,
}

/// Shared construction parameters for any engine, plus algorithm-specific
/// knobs. Fields not used by the selected algorithm are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub algorithm: Algorithm,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub min_freq: f32,
    pub max_freq: f32,
    /// YIN/pYIN absolute-difference threshold.
    pub yin_threshold: f32,
    /// MPM relative key-peak threshold `k`.
    pub mpm_threshold: f32,
    /// pYIN pitch-grid resolution, steps per semitone.
    pub pyin_steps_per_semitone: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Yin,
            sample_rate: crate::DEFAULT_ANALYSIS_RATE,
            frame_size: crate::DEFAULT_FRAME_SIZE,
            min_freq: 80.0,
            max_freq: 800.0,
            yin_threshold: 0.15,
            mpm_threshold: 0.93,
            pyin_steps_per_semitone: 5,
        }
    }
}

/// Uniform contract every pitch-detection engine implements.
///
/// `find_pitch` must not allocate; every engine precomputes its scratch
/// buffers at construction. Returns `(0.0, 0.0)` for unvoiced or
/// insufficient signal, never NaN/Inf.
pub trait PitchEngine {
    /// Analyze one frame of exactly `frame_size()` samples.
    fn find_pitch(&mut self, frame: &[f32]) -> PitchResult<(f32, f32)>;

    /// The frame length this engine was constructed for.
    fn frame_size(&self) -> usize;

    /// Clear any cross-frame state (HMM path probabilities, etc). A no-op
    /// for stateless engines.
    fn reset(&mut self) {}
}

/// Tagged choice over the four engines, dispatching through one enum
/// rather than a trait object so each engine's scratch stays inline.
pub enum Detector {
    Yin(YinEngine),
    Mpm(MpmEngine),
    Pyin(PyinEngine),
    Baseline(BaselineEngine),
}

impl PitchEngine for Detector {
    fn find_pitch(&mut self, frame: &[f32]) -> PitchResult<(f32, f32)> {
        match self {
            Detector::Yin(e) => e.find_pitch(frame),
            Detector::Mpm(e) => e.find_pitch(frame),
            Detector::Pyin(e) => e.find_pitch(frame),
            Detector::Baseline(e) => e.find_pitch(frame),
        }
    }

    fn frame_size(&self) -> usize {
        match self {
            Detector::Yin(e) => e.frame_size(),
            Detector::Mpm(e) => e.frame_size(),
            Detector::Pyin(e) => e.frame_size(),
            Detector::Baseline(e) => e.frame_size(),
        }
    }

    fn reset(&mut self) {
        match self {
            Detector::Yin(e) => e.reset(),
            Detector::Mpm(e) => e.reset(),
            Detector::Pyin(e) => e.reset(),
            Detector::Baseline(e) => e.reset(),
        }
    }
}

/// Construct one engine by configuration (C6). The detector is constructed
/// once per stream and mutated only via its own engine-specific API
/// thereafter (e.g. `PyinEngine::reset`).
pub fn build_detector(config: DetectorConfig) -> PitchResult<Detector> {
    Ok(match config.algorithm {
        Algorithm::Yin => Detector::Yin(YinEngine::new(config)?),
        Algorithm::Mpm => Detector::Mpm(MpmEngine::new(config)?),
        Algorithm::Pyin => Detector::Pyin(PyinEngine::new(config)?),
        Algorithm::Baseline => Detector::Baseline(BaselineEngine::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn every_algorithm_detects_a4() {
        for algo in [Algorithm::Yin, Algorithm::Mpm, Algorithm::Pyin, Algorithm::Baseline] {
            let config = DetectorConfig {
                algorithm: algo,
                sample_rate: 44_100,
                frame_size: 2048,
                ..Default::default()
            };
            let mut detector = build_detector(config).unwrap();
            let frame = sine(440.0, 44_100, 2048);
            let (hz, clarity) = detector.find_pitch(&frame).unwrap();
            assert!(hz.is_finite() && clarity.is_finite());
            assert!((0.0..=1.0).contains(&clarity));
            assert!(hz == 0.0 || (hz > 0.0 && hz < 44_100.0 / 2.0), "algo={algo:?} hz={hz}");
        }
    }

    #[test]
    fn silence_yields_zero_on_every_algorithm() {
        for algo in [Algorithm::Yin, Algorithm::Mpm, Algorithm::Pyin, Algorithm::Baseline] {
            let config = DetectorConfig {
                algorithm: algo,
                sample_rate: 44_100,
                frame_size: 2048,
                ..Default::default()
            };
            let mut detector = build_detector(config).unwrap();
            let frame = vec![0.0f32; 2048];
            let (hz, clarity) = detector.find_pitch(&frame).unwrap();
            assert_eq!(hz, 0.0, "algo={algo:?}");
            assert_eq!(clarity, 0.0, "algo={algo:?}");
        }
    }

    #[test]
    fn frame_length_mismatch_is_hard_error() {
        let config = DetectorConfig {
            algorithm: Algorithm::Yin,
            frame_size: 2048,
            ..Default::default()
        };
        let mut detector = build_detector(config).unwrap();
        let short_frame = vec![0.0f32; 100];
        assert!(detector.find_pitch(&short_frame).is_err());
    }
}
