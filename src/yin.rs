//! YIN engine (C5a)
//!
//! Difference function, CMNDF, threshold search, and parabolic refinement.
//! The threshold search walks past the first dip below threshold to find
//! a local minimum, which avoids locking onto a harmonic; this logic is
//! shared via `threshold_search` with the pYIN front end.

use log::trace;

use crate::engine::{DetectorConfig, PitchEngine};
use crate::error::{PitchError, PitchResult};
use crate::{all_finite, rms};

/// YIN pitch-detection engine.
pub struct YinEngine {
    sample_rate: u32,
    frame_size: usize,
    threshold: f32,
    diff: Vec<f32>,
    cmndf: Vec<f32>,
}

impl YinEngine {
    pub fn new(config: DetectorConfig) -> PitchResult<Self> {
        if config.sample_rate == 0 {
            return Err(PitchError::InvalidSampleRate(config.sample_rate));
        }
        if config.frame_size < 256 {
            return Err(PitchError::InvalidFrameSize(config.frame_size));
        }
        if !(0.0..=1.0).contains(&config.yin_threshold) {
            return Err(PitchError::ParameterOutOfRange {
                name: "yin_threshold",
                value: config.yin_threshold,
                expected: "[0, 1]",
            });
        }
        Ok(Self {
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            threshold: config.yin_threshold,
            diff: vec![0.0; config.frame_size],
            cmndf: vec![0.0; config.frame_size],
        })
    }

    /// Fill `self.diff` with the squared-difference function, `d(0) = 0`.
    fn difference_function(&mut self, frame: &[f32]) {
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
    }

    /// Fill `self.cmndf` from `self.diff`: cumulative mean normalized
    /// difference, `d'(0) = 1`.
    fn cumulative_mean_normalized_difference(&mut self) {
        self.cmndf[0] = 1.0;
        let mut running_sum = 0.0f32;
        for tau in 1..self.diff.len() {
            running_sum += self.diff[tau];
            self.cmndf[tau] = if running_sum > 0.0 {
                self.diff[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    /// Parabolic interpolation around integer lag `tau` using `cmndf`.
    fn parabolic_refine(cmndf: &[f32], tau: usize) -> f32 {
        if tau == 0 || tau + 1 >= cmndf.len() {
            return tau as f32;
        }
        let (y1, y2, y3) = (cmndf[tau - 1], cmndf[tau], cmndf[tau + 1]);
        let denom = 2.0 * (2.0 * y2 - y1 - y3);
        if denom.abs() < 1e-12 {
            tau as f32
        } else {
            let shift = (y3 - y1) / denom;
            if shift.is_finite() {
                tau as f32 + shift.clamp(-1.0, 1.0)
            } else {
                tau as f32
            }
        }
    }
}

/// Threshold search shared by YIN and the pYIN front end: starting at
/// `tau=2`, advance until `d'(tau) < threshold`, then return the first
/// `tau` where `d'(tau) < d'(tau+1)` (falling-then-rising step). Returns
/// `None` if nothing crosses.
pub fn threshold_search(cmndf: &[f32], threshold: f32, min_tau: usize, max_tau: usize) -> Option<usize> {
    let mut tau = min_tau.max(2);
    let max_tau = max_tau.min(cmndf.len() - 1);
    while tau < max_tau {
        if cmndf[tau] < threshold {
            while tau + 1 < max_tau && cmndf[tau + 1] < cmndf[tau] {
                tau += 1;
            }
            return Some(tau);
        }
        tau += 1;
    }
    None
}

impl PitchEngine for YinEngine {
    fn find_pitch(&mut self, frame: &[f32]) -> PitchResult<(f32, f32)> {
        if frame.len() != self.frame_size {
            return Err(PitchError::FrameLengthMismatch {
                got: frame.len(),
                expected: self.frame_size,
            });
        }
        if !all_finite(frame) || rms(frame) < 1e-9 {
            trace!("YIN: silent or non-finite frame");
            return Ok((0.0, 0.0));
        }

        self.difference_function(frame);
        self.cumulative_mean_normalized_difference();

        let max_tau = self.frame_size - 1;
        match threshold_search(&self.cmndf, self.threshold, 2, max_tau) {
            Some(tau) => {
                let tau_refined = Self::parabolic_refine(&self.cmndf, tau);
                if tau_refined <= 0.0 {
                    return Ok((0.0, 0.0));
                }
                let hz = self.sample_rate as f32 / tau_refined;
                let clarity = (1.0 - self.cmndf[tau]).max(0.0);
                if hz.is_finite() && hz > 0.0 && hz < self.sample_rate as f32 / 2.0 {
                    Ok((hz, clarity))
                } else {
                    Ok((0.0, 0.0))
                }
            }
            None => Ok((0.0, 0.0)),
        }
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }
}
