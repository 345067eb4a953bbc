//! MPM (McLeod Pitch Method) engine (C5b)
//!
//! Normalized square difference function (NSDF), peak picking with
//! relative-threshold key-peak selection, and parabolic refinement.

use log::trace;

use crate::engine::{DetectorConfig, PitchEngine};
use crate::error::{PitchError, PitchResult};
use crate::all_finite;

/// McLeod Pitch Method engine.
pub struct MpmEngine {
    sample_rate: u32,
    frame_size: usize,
    k: f32,
    /// Autocorrelation `r(tau)`.
    r: Vec<f32>,
    /// NSDF `n(tau) = 2 r(tau) / m(tau)`.
    nsdf: Vec<f32>,
    /// Prefix sums of squares, used to compute `m(tau)` in O(N).
    prefix_sq: Vec<f32>,
    peaks: Vec<usize>,
}

impl MpmEngine {
    pub fn new(config: DetectorConfig) -> PitchResult<Self> {
        if config.sample_rate == 0 {
            return Err(PitchError::InvalidSampleRate(config.sample_rate));
        }
        if config.frame_size < 256 {
            return Err(PitchError::InvalidFrameSize(config.frame_size));
        }
        if !(0.0..=1.0).contains(&config.mpm_threshold) {
            return Err(PitchError::ParameterOutOfRange {
                name: "mpm_threshold",
                value: config.mpm_threshold,
                expected: "[0, 1]",
            });
        }
        let n = config.frame_size;
        Ok(Self {
            sample_rate: config.sample_rate,
            frame_size: n,
            k: config.mpm_threshold,
            r: vec![0.0; n],
            nsdf: vec![0.0; n],
            prefix_sq: vec![0.0; n + 1],
            peaks: Vec::with_capacity(64),
        })
    }

    fn compute_nsdf(&mut self, frame: &[f32]) {
        let n = frame.len();

        self.prefix_sq[0] = 0.0;
        for i in 0..n {
            self.prefix_sq[i + 1] = self.prefix_sq[i] + frame[i] * frame[i];
        }
        let total_sq = self.prefix_sq[n];

        for tau in 0..n {
            let mut acc = 0.0f32;
            for j in 0..(n - tau) {
                acc += frame[j] * frame[j + tau];
            }
            self.r[tau] = acc;

            // m(tau) = sum_{j=0}^{n-1-tau} x[j]^2 + sum_{j=tau}^{n-1} x[j]^2
            let first = self.prefix_sq[n - tau];
            let second = total_sq - self.prefix_sq[tau];
            let m = first + second;

            self.nsdf[tau] = if m > 0.0 { 2.0 * self.r[tau] / m } else { 0.0 };
        }
    }

    /// Collect the highest NSDF point of each positive region after the
    /// first negative-going zero crossing.
    fn pick_peaks(&mut self) {
        self.peaks.clear();
        let n = self.nsdf.len();
        let mut i = 1;
        // Skip the initial positive region at lag 0.
        while i < n && self.nsdf[i] > 0.0 {
            i += 1;
        }
        while i < n {
            // Skip a negative region.
            while i < n && self.nsdf[i] <= 0.0 {
                i += 1;
            }
            // Walk a positive region, tracking its maximum.
            let mut best = i;
            while i < n && self.nsdf[i] > 0.0 {
                if self.nsdf[i] > self.nsdf[best] {
                    best = i;
                }
                i += 1;
            }
            if best > 0 && best + 1 < n && self.nsdf[best] >= self.nsdf[best - 1] && self.nsdf[best] >= self.nsdf[best + 1] {
                self.peaks.push(best);
            }
        }
    }

    fn parabolic_refine(nsdf: &[f32], tau: usize) -> (f32, f32) {
        if tau == 0 || tau + 1 >= nsdf.len() {
            return (tau as f32, nsdf[tau]);
        }
        let (y1, y2, y3) = (nsdf[tau - 1], nsdf[tau], nsdf[tau + 1]);
        let denom = 2.0 * (2.0 * y2 - y1 - y3);
        if denom.abs() < 1e-12 {
            (tau as f32, y2)
        } else {
            let shift = ((y3 - y1) / denom).clamp(-0.5, 0.5);
            let refined_value = y2 - 0.25 * (y1 - y3) * shift;
            (tau as f32 + shift, refined_value)
        }
    }
}

impl PitchEngine for MpmEngine {
    fn find_pitch(&mut self, frame: &[f32]) -> PitchResult<(f32, f32)> {
        if frame.len() != self.frame_size {
            return Err(PitchError::FrameLengthMismatch {
                got: frame.len(),
                expected: self.frame_size,
            });
        }
        if !all_finite(frame) {
            return Ok((0.0, 0.0));
        }
        let rms = crate::rms(frame);
        if rms < 1e-3 {
            trace!("MPM: below RMS gate ({rms:.6})");
            return Ok((0.0, 0.0));
        }

        self.compute_nsdf(frame);
        debug_assert!(self.nsdf[0] >= 0.999, "NSDF(0) should be ~1 for non-silent frames");
        self.pick_peaks();

        if self.peaks.is_empty() {
            return Ok((0.0, 0.0));
        }

        let max_val = self.peaks.iter().map(|&p| self.nsdf[p]).fold(f32::MIN, f32::max);
        let chosen = self
            .peaks
            .iter()
            .copied()
            .find(|&p| self.nsdf[p] >= self.k * max_val)
            .unwrap_or_else(|| {
                *self
                    .peaks
                    .iter()
                    .max_by(|&&a, &&b| self.nsdf[a].partial_cmp(&self.nsdf[b]).unwrap())
                    .unwrap()
            });

        let (tau_refined, clarity_raw) = Self::parabolic_refine(&self.nsdf, chosen);
        if tau_refined <= 0.0 {
            return Ok((0.0, 0.0));
        }
        let hz = self.sample_rate as f32 / tau_refined;
        let clarity = clarity_raw.clamp(0.0, 1.0);

        if hz.is_finite() && hz > 0.0 && hz < self.sample_rate as f32 / 2.0 {
            Ok((hz, clarity))
        } else {
            Ok((0.0, 0.0))
        }
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }
}
