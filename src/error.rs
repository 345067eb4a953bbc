//! Error types for the pitch-analysis core

use thiserror::Error;

/// Errors raised by the pitch-analysis core.
///
/// Per-frame numerical edge cases (non-finite samples, silence, no
/// qualifying minimum/peak) are *not* represented here; engines recover
/// locally and return the `(0.0, 0.0)` sentinel. Only configuration and
/// input-shape mistakes are hard failures.
#[derive(Debug, Error)]
pub enum PitchError {
    /// Non-positive sample rate given at construction.
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Non-positive or otherwise invalid frame size.
    #[error("invalid frame size: {0}")]
    InvalidFrameSize(usize),

    /// `min_freq >= max_freq`, or either is non-positive.
    #[error("invalid frequency range: {min} - {max} Hz")]
    InvalidFrequencyRange { min: f32, max: f32 },

    /// A threshold or probability parameter fell outside its documented range.
    #[error("parameter {name} out of range: {value} (expected {expected})")]
    ParameterOutOfRange {
        name: &'static str,
        value: f32,
        expected: &'static str,
    },

    /// `find_pitch`/`push_and_detect` received a frame of the wrong length.
    #[error("frame length mismatch: got {got} samples, expected {expected}")]
    FrameLengthMismatch { got: usize, expected: usize },

    /// The resampler was asked to produce an output rate that does not make
    /// sense relative to the input rate (e.g. both zero).
    #[error("invalid resample ratio: {input_rate} Hz -> {output_rate} Hz")]
    InvalidResampleRatio { input_rate: u32, output_rate: u32 },
}

/// Result type used throughout the core.
pub type PitchResult<T> = Result<T, PitchError>;
