//! Stateful windowed-sinc resampler (C1)
//!
//! Acts as an ideal low-pass anti-alias filter while decimating (or
//! interpolating) from an arbitrary device sample rate to the fixed
//! internal analysis rate. Streaming: feeding the same samples split across
//! arbitrary chunk boundaries produces, up to numerical error, the same
//! output as feeding them in one chunk.
//!
//! Windowed-sinc FIR design: sinc kernel, Blackman window, and an explicit
//! continuous input-time cursor rather than a fixed-coefficient filter, so
//! the resample ratio can be arbitrary and the cursor survives across
//! chunk boundaries.

use log::trace;

use crate::error::{PitchError, PitchResult};

/// Kernel half-width in input samples on each side of the cursor.
pub const KERNEL_RADIUS: usize = 32;

/// Stateful streaming windowed-sinc resampler.
///
/// Owns a history tail of the most recent `2*KERNEL_RADIUS` input samples
/// (for kernel look-back across chunk boundaries) and a continuous
/// input-time cursor. Neither allocates after construction.
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    ratio: f64,
    /// Normalized cutoff, `ratio / 2` when decimating, `0.5` when upsampling
    /// (never filter above the output Nyquist either).
    cutoff: f64,
    /// Last `2*KERNEL_RADIUS` samples of the extended stream seen so far.
    history: Vec<f32>,
    /// Continuous cursor into the input stream, in input samples.
    input_pos: f64,
    /// Scratch for the concatenation `history ++ chunk`; reused per call.
    extended: Vec<f32>,
    /// Scratch for the output chunk; reused and resized per call.
    out_scratch: Vec<f32>,
}

impl Resampler {
    /// Construct a resampler from `input_rate` Hz to `output_rate` Hz.
    pub fn new(input_rate: u32, output_rate: u32) -> PitchResult<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(PitchError::InvalidResampleRatio {
                input_rate,
                output_rate,
            });
        }
        let ratio = output_rate as f64 / input_rate as f64;
        let cutoff = ratio.min(1.0) / 2.0;
        Ok(Self {
            input_rate,
            output_rate,
            ratio,
            cutoff,
            history: vec![0.0; 2 * KERNEL_RADIUS],
            input_pos: 0.0,
            extended: Vec::new(),
            out_scratch: Vec::new(),
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Reset all state (history tail zeroed, cursor reset to 0). Use when
    /// restarting a stream without reconstructing the resampler.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.input_pos = 0.0;
    }

    /// Process one chunk of input samples, returning the resampled output.
    ///
    /// Empty input yields empty output. The concatenation of outputs across
    /// any chunking of the same input stream equals, up to numerical error,
    /// the output of processing the concatenated stream in one call.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }

        let k = KERNEL_RADIUS as i64;
        let history_len = self.history.len();

        self.extended.clear();
        self.extended.extend_from_slice(&self.history);
        self.extended.extend_from_slice(input);

        // `extended[history_len + j]` corresponds to input-time
        // `self.input_pos + j`, for j in [0, input.len()).
        let chunk_start = self.input_pos;
        let chunk_end = self.input_pos + input.len() as f64;

        // First output time at or after chunk_start, on the 1/ratio grid.
        let first_t = (chunk_start * self.ratio).ceil() / self.ratio;

        self.out_scratch.clear();
        let mut t = first_t;
        while t < chunk_end {
            let sample = self.kernel_sum(&self.extended, history_len, chunk_start, t, k);
            self.out_scratch.push(sample);
            t += 1.0 / self.ratio;
        }

        // Advance cursor and slide the history tail.
        self.input_pos += input.len() as f64;
        let total = self.extended.len();
        if total >= history_len {
            self.history.copy_from_slice(&self.extended[total - history_len..]);
        } else {
            // Fewer samples than the history length have ever been seen;
            // left-pad with the existing (zero-initialized) history.
            let pad = history_len - total;
            self.history.copy_within(total.., 0);
            self.history[..pad].fill(0.0);
            self.history[pad..].copy_from_slice(&self.extended);
        }

        trace!(
            "resampler: {} in -> {} out (ratio {:.4})",
            input.len(),
            self.out_scratch.len(),
            self.ratio
        );

        self.out_scratch.clone()
    }

    /// Evaluate the windowed-sinc kernel sum at input-time `t`.
    ///
    /// `extended[history_len + j]` holds the sample at input-time
    /// `chunk_start + j`; indices before `history_len` are the history tail
    /// (input-time `chunk_start - history_len + j`), and anything outside
    /// `extended`'s bounds contributes zero (implicit zero-padding).
    fn kernel_sum(
        &self,
        extended: &[f32],
        history_len: usize,
        chunk_start: f64,
        t: f64,
        k: i64,
    ) -> f32 {
        let lo = t.floor() as i64 - k;
        let hi = t.ceil() as i64 + k;
        let mut acc = 0.0f64;
        let mut idx = lo;
        while idx <= hi {
            // idx is an input-sample index relative to chunk_start.
            let rel = idx as f64 - chunk_start;
            let ext_index = rel + history_len as f64;
            if ext_index >= 0.0 {
                let ei = ext_index as usize;
                if ei < extended.len() {
                    let n = idx as f64 - t;
                    let w = blackman_window(n, k as f64);
                    if w != 0.0 {
                        let s = sinc(2.0 * self.cutoff * n);
                        acc += extended[ei] as f64 * s * w;
                    }
                }
            }
            idx += 1;
        }
        (acc * 2.0 * self.cutoff) as f32
    }
}

/// Normalized sinc: `sin(pi x) / (pi x)`, with `sinc(0) = 1`.
#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Blackman window, zero outside `|n| < radius`.
#[inline]
fn blackman_window(n: f64, radius: f64) -> f64 {
    if n.abs() >= radius {
        return 0.0;
    }
    let r = n / radius;
    0.42 + 0.5 * (std::f64::consts::PI * r).cos() + 0.08 * (2.0 * std::f64::consts::PI * r).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut r = Resampler::new(44_100, 24_000).unwrap();
        assert!(r.process(&[]).is_empty());
    }

    #[test]
    fn output_length_matches_ratio_within_one() {
        let mut r = Resampler::new(44_100, 10_000).unwrap();
        let input = sine(440.0, 44_100, 200);
        let out = r.process(&input);
        let expected = (200.0 * r.ratio()).floor() as usize;
        assert!(out.len() == expected || out.len() == expected + 1);
    }

    #[test]
    fn continuity_across_chunk_boundaries() {
        let input = sine(440.0, 44_100, 200);

        let mut single = Resampler::new(44_100, 10_000).unwrap();
        let out_single = single.process(&input);

        let mut chunked = Resampler::new(44_100, 10_000).unwrap();
        let mut out_chunked = chunked.process(&input[..100]);
        out_chunked.extend(chunked.process(&input[100..]));

        let total_expected = (200.0 * 10_000.0 / 44_100.0).floor() as i64;
        assert!((out_chunked.len() as i64 - total_expected).abs() <= 2);
        assert!((out_single.len() as i64 - out_chunked.len() as i64).abs() <= 2);
    }

    #[test]
    fn unity_gain_on_low_frequency_sine() {
        let rate = 44_100u32;
        let mut r = Resampler::new(rate, rate).unwrap();
        let input = sine(220.0, rate, 4096);
        let out = r.process(&input);
        let peak = out.iter().cloned().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 0.1, "peak={peak}");
    }

    #[test]
    fn blackman_window_zero_outside_radius() {
        assert_relative_eq!(blackman_window(32.0, 32.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(blackman_window(40.0, 32.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn sinc_zero_is_one() {
        assert_relative_eq!(sinc(0.0), 1.0, epsilon = 1e-9);
    }
}
