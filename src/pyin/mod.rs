//! Probabilistic YIN engine (C5c)
//!
//! Combines a YIN-shaped difference/CMNDF front end with
//! threshold-distribution candidate weighting and a log-domain HMM
//! Viterbi over a discretized pitch-state grid.

pub mod candidates;
pub mod grid;
pub mod hmm;

use log::trace;
use ndarray::Array2;
use rayon::prelude::*;

use crate::engine::{DetectorConfig, PitchEngine};
use crate::error::{PitchError, PitchResult};
use crate::all_finite;

use candidates::extract_candidates;
use grid::{build_transition_matrix, PitchGrid};
use hmm::{observation_log_likelihoods, offline_viterbi, OnlineViterbi};

/// Difference function + CMNDF for one frame, standalone so the batch path
/// can compute observations for every frame in parallel without each
/// worker fighting over `PyinEngine`'s scratch buffers.
fn yin_cmndf(frame: &[f32]) -> Vec<f32> {
    let n = frame.len();
    let mut diff = vec![0.0f32; n];
    for tau in 1..n {
        let mut sum = 0.0f32;
        for j in 0..(n - tau) {
            let delta = frame[j] - frame[j + tau];
            sum += delta * delta;
        }
        diff[tau] = sum;
    }
    let mut cmndf = vec![1.0f32; n];
    let mut running_sum = 0.0f32;
    for tau in 1..n {
        running_sum += diff[tau];
        cmndf[tau] = if running_sum > 0.0 {
            diff[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }
    cmndf
}

const SIGMA_TRANS_CENTS: f32 = 25.0;
const P_SWITCH: f32 = 0.01;
const THRESHOLD_BINS_ONLINE: usize = 50;
const THRESHOLD_BINS_BATCH: usize = 100;

/// Probabilistic YIN engine: YIN front end + HMM smoothing.
pub struct PyinEngine {
    sample_rate: u32,
    frame_size: usize,
    min_freq: f32,
    max_freq: f32,
    grid: PitchGrid,
    log_trans: Array2<f64>,
    viterbi: OnlineViterbi,
    diff: Vec<f32>,
    cmndf: Vec<f32>,
}

impl PyinEngine {
    pub fn new(config: DetectorConfig) -> PitchResult<Self> {
        if config.sample_rate == 0 {
            return Err(PitchError::InvalidSampleRate(config.sample_rate));
        }
        if config.frame_size < 256 {
            return Err(PitchError::InvalidFrameSize(config.frame_size));
        }
        if config.min_freq <= 0.0 || config.max_freq <= config.min_freq {
            return Err(PitchError::InvalidFrequencyRange {
                min: config.min_freq,
                max: config.max_freq,
            });
        }
        if config.pyin_steps_per_semitone < 1 {
            return Err(PitchError::ParameterOutOfRange {
                name: "pyin_steps_per_semitone",
                value: config.pyin_steps_per_semitone as f32,
                expected: ">= 1",
            });
        }

        let grid = PitchGrid::new(config.min_freq, config.max_freq, config.pyin_steps_per_semitone);
        let log_trans = build_transition_matrix(&grid, SIGMA_TRANS_CENTS, P_SWITCH);
        let viterbi = OnlineViterbi::new(grid.len());

        Ok(Self {
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            min_freq: config.min_freq,
            max_freq: config.max_freq,
            grid,
            log_trans,
            viterbi,
            diff: vec![0.0; config.frame_size],
            cmndf: vec![0.0; config.frame_size],
        })
    }

    fn yin_front_end(&mut self, frame: &[f32]) {
        let n = frame.len();
        self.diff[0] = 0.0;
        for tau in 1..n {
            let mut sum = 0.0f32;
            for j in 0..(n - tau) {
                let delta = frame[j] - frame[j + tau];
                sum += delta * delta;
            }
            self.diff[tau] = sum;
        }
        self.cmndf[0] = 1.0;
        let mut running_sum = 0.0f32;
        for tau in 1..n {
            running_sum += self.diff[tau];
            self.cmndf[tau] = if running_sum > 0.0 {
                self.diff[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    fn lag_range(&self) -> (usize, usize) {
        let tau_min = (self.sample_rate as f32 / self.max_freq).floor().max(1.0) as usize;
        let tau_max = ((self.sample_rate as f32 / self.min_freq).ceil() as usize).min(self.frame_size - 1);
        (tau_min, tau_max)
    }

    /// Clear HMM state; the next `find_pitch` call is treated as the first
    /// frame of a new stream.
    pub fn reset_hmm(&mut self) {
        self.viterbi.reset();
    }

    /// Run the offline (batch) Viterbi over a full track of pre-extracted
    /// frames, used for test-fixture validation and batch analyses where
    /// future context may refine a noisy middle frame.
    pub fn detect_pitch_track(&mut self, frames: &[&[f32]]) -> PitchResult<Vec<(f32, f32)>> {
        for &frame in frames {
            if frame.len() != self.frame_size {
                return Err(PitchError::FrameLengthMismatch {
                    got: frame.len(),
                    expected: self.frame_size,
                });
            }
        }

        let (tau_min, tau_max) = self.lag_range();
        let sample_rate = self.sample_rate;
        let grid = &self.grid;

        // Each frame's observation likelihoods are independent of every
        // other frame's, so the batch path fans them out across rayon's
        // pool; only the Viterbi traceback below is inherently sequential.
        let observations: Vec<Vec<f64>> = frames
            .par_iter()
            .map(|&frame| {
                if !all_finite(frame) {
                    return observation_log_likelihoods(grid, &[]);
                }
                let cmndf = yin_cmndf(frame);
                let candidates = extract_candidates(&cmndf, sample_rate, tau_min, tau_max, THRESHOLD_BINS_BATCH);
                observation_log_likelihoods(grid, &candidates)
            })
            .collect();

        let path = offline_viterbi(&self.grid, &self.log_trans, &observations);
        Ok(path
            .iter()
            .map(|&s| {
                let state = &self.grid.states[s];
                if state.voiced {
                    (state.freq, 1.0)
                } else {
                    (0.0, 0.0)
                }
            })
            .collect())
    }
}

impl PitchEngine for PyinEngine {
    fn find_pitch(&mut self, frame: &[f32]) -> PitchResult<(f32, f32)> {
        if frame.len() != self.frame_size {
            return Err(PitchError::FrameLengthMismatch {
                got: frame.len(),
                expected: self.frame_size,
            });
        }
        if !all_finite(frame) {
            trace!("pYIN: non-finite frame");
            let obs = observation_log_likelihoods(&self.grid, &[]);
            let (best, _) = self.viterbi.step(&self.grid, &self.log_trans, &obs);
            let _ = best;
            return Ok((0.0, 0.0));
        }

        self.yin_front_end(frame);
        let (tau_min, tau_max) = self.lag_range();
        let candidates = extract_candidates(&self.cmndf, self.sample_rate, tau_min, tau_max, THRESHOLD_BINS_ONLINE);
        let obs = observation_log_likelihoods(&self.grid, &candidates);
        let (best_state, clarity) = self.viterbi.step(&self.grid, &self.log_trans, &obs);

        let state = &self.grid.states[best_state];
        if !state.voiced {
            return Ok((0.0, 0.0));
        }
        if state.freq.is_finite() && state.freq > 0.0 && state.freq < self.sample_rate as f32 / 2.0 {
            Ok((state.freq, clarity))
        } else {
            Ok((0.0, 0.0))
        }
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn reset(&mut self) {
        self.reset_hmm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Algorithm;

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

    fn config(frame_size: usize, sample_rate: u32, min_freq: f32, max_freq: f32) -> DetectorConfig {
        DetectorConfig {
            algorithm: Algorithm::Pyin,
            sample_rate,
            frame_size,
            min_freq,
            max_freq,
            pyin_steps_per_semitone: 5,
            ..Default::default()
        }
    }

    #[test]
    fn square_220_no_octave_error() {
        let mut e = PyinEngine::new(config(2048, 44_100, 80.0, 1000.0)).unwrap();
        let frame = square(220.0, 44_100, 2048);
        let (hz, _) = e.find_pitch(&frame).unwrap();
        if hz > 0.0 {
            assert!((210.0..=230.0).contains(&hz), "hz={hz}");
            assert!((hz - 440.0).abs() > 10.0);
            assert!((hz - 660.0).abs() > 10.0);
        }
    }

    #[test]
    fn reset_then_redetect_is_deterministic() {
        let mut e = PyinEngine::new(config(2048, 44_100, 80.0, 800.0)).unwrap();
        let frame = sine(440.0, 44_100, 2048);
        e.reset_hmm();
        let a = e.find_pitch(&frame).unwrap();
        e.reset_hmm();
        let b = e.find_pitch(&frame).unwrap();
        assert_eq!(a.0.to_bits(), b.0.to_bits());
        assert_eq!(a.1.to_bits(), b.1.to_bits());
    }

    #[test]
    fn batch_track_smooths_noisy_middle_frame() {
        let mut e = PyinEngine::new(config(2048, 44_100, 80.0, 800.0)).unwrap();
        let clean = sine(440.0, 44_100, 2048);
        let mut seed = 999u32;
        let noisy: Vec<f32> = (0..2048)
            .map(|i| {
                seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                let n = ((seed >> 8) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0;
                0.2 * n + 0.3 * clean[i]
            })
            .collect();
        let frames: Vec<&[f32]> = vec![&clean, &noisy, &clean];
        let track = e.detect_pitch_track(&frames).unwrap();
        assert_eq!(track.len(), 3);
        for (hz, _) in &track {
            if *hz > 0.0 {
                assert!((*hz - 440.0).abs() < 20.0, "hz={hz}");
            }
        }
    }

    #[test]
    fn silence_is_unvoiced() {
        let mut e = PyinEngine::new(config(2048, 44_100, 80.0, 800.0)).unwrap();
        let (hz, clarity) = e.find_pitch(&vec![0.0; 2048]).unwrap();
        assert_eq!(hz, 0.0);
        assert_eq!(clarity, 0.0);
    }

    #[test]
    fn invalid_freq_range_is_hard_error() {
        let bad = config(2048, 44_100, 800.0, 80.0);
        assert!(PyinEngine::new(bad).is_err());
    }
}
