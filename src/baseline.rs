//! Baseline autocorrelation engine (C5d)
//!
//! Computes autocorrelation via FFT (Wiener-Khinchin: zero-pad, forward
//! FFT, multiply by the conjugate, inverse FFT) rather than a direct
//! O(N^2) loop.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::engine::{DetectorConfig, PitchEngine};
use crate::error::{PitchError, PitchResult};
use crate::all_finite;

pub struct BaselineEngine {
    sample_rate: u32,
    frame_size: usize,
    fft_len: usize,
    min_freq: f32,
    max_freq: f32,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    time_buf: Vec<f32>,
    freq_buf: Vec<Complex<f32>>,
    autocorr: Vec<f32>,
}

impl BaselineEngine {
    pub fn new(config: DetectorConfig) -> PitchResult<Self> {
        if config.sample_rate == 0 {
            return Err(PitchError::InvalidSampleRate(config.sample_rate));
        }
        if config.frame_size < 256 {
            return Err(PitchError::InvalidFrameSize(config.frame_size));
        }

        let fft_len = (2 * config.frame_size).next_power_of_two();
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        Ok(Self {
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            fft_len,
            min_freq: config.min_freq,
            max_freq: config.max_freq,
            time_buf: forward.make_input_vec(),
            freq_buf: forward.make_output_vec(),
            autocorr: vec![0.0; fft_len],
            forward,
            inverse,
        })
    }

    fn compute_autocorrelation(&mut self, frame: &[f32]) {
        self.time_buf.iter_mut().for_each(|s| *s = 0.0);
        self.time_buf[..frame.len()].copy_from_slice(frame);

        self.forward
            .process(&mut self.time_buf, &mut self.freq_buf)
            .expect("forward FFT on fixed-size buffers cannot fail");

        for c in self.freq_buf.iter_mut() {
            *c = *c * c.conj();
        }

        self.inverse
            .process(&mut self.freq_buf, &mut self.autocorr)
            .expect("inverse FFT on fixed-size buffers cannot fail");

        // realfft's inverse is unnormalized; divide by fft_len.
        let norm = 1.0 / self.fft_len as f32;
        self.autocorr.iter_mut().for_each(|s| *s *= norm);
    }
}

impl PitchEngine for BaselineEngine {
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
            return Ok((0.0, 0.0));
        }

        self.compute_autocorrelation(frame);
        let zero_lag = self.autocorr[0].max(1e-12);

        let tau_min = (self.sample_rate as f32 / self.max_freq).floor().max(1.0) as usize;
        let tau_max = ((self.sample_rate as f32 / self.min_freq).ceil() as usize).min(self.frame_size - 2);

        let mut best_tau = 0usize;
        let mut best_val = f32::MIN;
        for tau in tau_min..=tau_max.max(tau_min) {
            if tau + 1 >= self.autocorr.len() {
                break;
            }
            let v = self.autocorr[tau];
            if v > best_val && v >= self.autocorr[tau - 1] && v >= self.autocorr[tau + 1] {
                best_val = v;
                best_tau = tau;
            }
        }

        if best_tau == 0 {
            return Ok((0.0, 0.0));
        }

        let normalized = (best_val / zero_lag).clamp(0.0, 1.0);
        if normalized < 0.1 {
            return Ok((0.0, 0.0));
        }

        let (y1, y2, y3) = (
            self.autocorr[best_tau - 1],
            self.autocorr[best_tau],
            self.autocorr[best_tau + 1],
        );
        let denom = 2.0 * (2.0 * y2 - y1 - y3);
        let tau_refined = if denom.abs() > 1e-12 {
            best_tau as f32 + ((y3 - y1) / denom).clamp(-1.0, 1.0)
        } else {
            best_tau as f32
        };

        let hz = self.sample_rate as f32 / tau_refined;
        if hz.is_finite() && hz > 0.0 && hz < self.sample_rate as f32 / 2.0 {
            Ok((hz, normalized))
        } else {
            Ok((0.0, 0.0))
        }
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }
}
