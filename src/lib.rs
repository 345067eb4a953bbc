//! tuner-core: real-time monophonic pitch-detection core
//!
//! Ingests a stream of audio samples at an arbitrary device rate,
//! conditions it (gain control, resampling), and emits per analysis frame
//! an estimated fundamental frequency and a clarity/voicing score.
//!
//! ## Pipeline
//!
//! ```text
//! device samples -> AGC (optional) -> Resampler -> ring buffer -> (primed) -> pitch engine -> (hz, clarity)
//! ```
//!
//! The graphical tuner, view-scroll smoothing, canvas rendering, persisted
//! UI settings, i18n, and the audio I/O runtime itself are deliberately out
//! of scope: this crate consumes mono `f32` samples and produces
//! `(frequency_hz, clarity)` pairs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tuner_core::{Resampler, AgcStage, AgcConfig, FrameRingBuffer, DetectorConfig, Algorithm, build_detector};
//!
//! let mut resampler = Resampler::new(44_100, 24_000)?;
//! let mut agc = AgcStage::new(AgcConfig::default());
//! let mut framer = FrameRingBuffer::new(2048);
//! let mut detector = build_detector(DetectorConfig { algorithm: Algorithm::Yin, ..Default::default() })?;
//!
//! for chunk in device_chunks {
//!     let gained = agc.apply_gain(&chunk, true);
//!     let resampled = resampler.process(&gained);
//!     if let Some(frame) = framer.push(&resampled) {
//!         let (hz, clarity) = detector.find_pitch(frame)?;
//!     }
//! }
//! # Ok::<(), tuner_core::PitchError>(())
//! ```

mod error;

pub mod agc;
pub mod baseline;
pub mod control;
pub mod engine;
pub mod framer;
pub mod mpm;
pub mod pipeline;
pub mod pyin;
pub mod resampler;
pub mod yin;

pub use agc::{AgcConfig, AgcStage, AgcStats};
pub use baseline::BaselineEngine;
pub use control::{AgcAck, AgcUpdate};
pub use engine::{build_detector, Algorithm, DetectorConfig, PitchEngine};
pub use error::{PitchError, PitchResult};
pub use framer::FrameRingBuffer;
pub use mpm::MpmEngine;
pub use pipeline::Pipeline;
pub use pyin::PyinEngine;
pub use resampler::Resampler;
pub use yin::YinEngine;

/// Internal analysis sample rate all pitch engines operate at by default.
pub const DEFAULT_ANALYSIS_RATE: u32 = 24_000;

/// Default analysis frame length in samples.
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// Convert a frequency in Hz to a (possibly fractional) MIDI note number.
#[inline]
pub fn freq_to_midi(freq_hz: f32) -> f32 {
    69.0 + 12.0 * (freq_hz / 440.0).log2()
}

/// Convert a (possibly fractional) MIDI note number to a frequency in Hz.
#[inline]
pub fn midi_to_freq(midi: f32) -> f32 {
    440.0 * 2.0f32.powf((midi - 69.0) / 12.0)
}

/// Signed distance between two frequencies in cents (100 cents/semitone).
#[inline]
pub fn freq_to_cents(from_hz: f32, to_hz: f32) -> f32 {
    1200.0 * (to_hz / from_hz).log2()
}

/// True if every sample in `frame` is finite (no NaN/Inf).
#[inline]
pub fn all_finite(frame: &[f32]) -> bool {
    frame.iter().all(|s| s.is_finite())
}

/// Root-mean-square of a frame, ignoring non-finite samples (treated as 0).
#[inline]
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame
        .iter()
        .map(|&s| if s.is_finite() { s * s } else { 0.0 })
        .sum();
    (sum_sq / frame.len() as f32).sqrt()
}
