//! End-to-end pipeline glue and the audio-callback/analysis-thread handoff.
//!
//! `Pipeline` wires AGC -> resampler -> framer -> detector the way a host
//! application would, single-threaded, for tests and simple integrations.
//! `ChunkSender`/`ChunkReceiver` provide the lock-free SPSC handoff needed
//! when AGC/resampling runs on a real-time audio callback and detection
//! runs on a separate analysis thread.

use log::info;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::instrument;

use crate::agc::{AgcConfig, AgcStage};
use crate::control::{AgcAck, AgcUpdate};
use crate::engine::{build_detector, Detector, DetectorConfig, PitchEngine};
use crate::error::PitchResult;
use crate::framer::FrameRingBuffer;
use crate::resampler::Resampler;

/// A single-threaded convenience pipeline: AGC -> resampler -> framer ->
/// detector.
pub struct Pipeline {
    agc: AgcStage,
    resampler: Resampler,
    framer: FrameRingBuffer,
    detector: Detector,
}

impl Pipeline {
    pub fn new(device_rate: u32, agc_config: AgcConfig, detector_config: DetectorConfig) -> PitchResult<Self> {
        let detector = build_detector(detector_config)?;
        let agc = AgcStage::new_at_rate(agc_config, device_rate);
        let resampler = Resampler::new(device_rate, detector_config.sample_rate)?;
        let framer = FrameRingBuffer::new(detector_config.frame_size);
        info!(
            "pipeline constructed: {device_rate} Hz -> {} Hz, frame {}",
            detector_config.sample_rate, detector_config.frame_size
        );
        Ok(Self {
            agc,
            resampler,
            framer,
            detector,
        })
    }

    /// Apply AGC to a chunk of device-rate samples.
    pub fn apply_gain(&mut self, samples: &[f32], enabled: bool) -> Vec<f32> {
        self.agc.apply_gain(samples, enabled)
    }

    /// Resample a chunk of (already gain-controlled) device-rate samples to
    /// the detector's analysis rate.
    pub fn process_chunk(&mut self, samples: &[f32]) -> Vec<f32> {
        self.resampler.process(samples)
    }

    /// Push a chunk of analysis-rate samples into the framer and, once
    /// primed, run the detector on the resulting frame.
    pub fn push_and_detect(&mut self, resampled: &[f32]) -> PitchResult<Option<(f32, f32)>> {
        match self.framer.push(resampled) {
            Some(frame) => Ok(Some(self.detector.find_pitch(frame)?)),
            None => Ok(None),
        }
    }

    /// One call doing AGC -> resample -> frame -> detect for a chunk of raw
    /// device-rate samples.
    #[instrument(skip(self, raw), fields(chunk_len = raw.len()))]
    pub fn process(&mut self, raw: &[f32], agc_enabled: bool) -> PitchResult<Option<(f32, f32)>> {
        let gained = self.apply_gain(raw, agc_enabled);
        let resampled = self.process_chunk(&gained);
        self.push_and_detect(&resampled)
    }

    /// Apply a partial AGC parameter update, returning the acknowledgment.
    pub fn update_agc(&mut self, update: &AgcUpdate) -> AgcAck {
        self.agc.update(update)
    }

    /// Reset detector HMM state and framer priming for a new stream.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.framer.reset();
        self.resampler.reset();
    }
}

/// Producer half of the lock-free audio-callback -> analysis-thread chunk
/// FIFO. Lives on the real-time callback thread.
pub struct ChunkSender {
    inner: HeapProducer<Vec<f32>>,
}

impl ChunkSender {
    /// Push one immutable chunk (by move) onto the queue. Returns the chunk
    /// back on failure (queue full) so the caller can decide how to react
    /// without the real-time thread blocking.
    pub fn send(&mut self, chunk: Vec<f32>) -> Result<(), Vec<f32>> {
        self.inner.push(chunk)
    }
}

/// Consumer half, lives on the analysis thread.
pub struct ChunkReceiver {
    inner: HeapConsumer<Vec<f32>>,
}

impl ChunkReceiver {
    /// Pop the oldest available chunk, if any, preserving emission order.
    pub fn recv(&mut self) -> Option<Vec<f32>> {
        self.inner.pop()
    }
}

/// Construct a bounded lock-free SPSC chunk channel with room for
/// `capacity` in-flight chunks.
pub fn chunk_channel(capacity: usize) -> (ChunkSender, ChunkReceiver) {
    let rb = HeapRb::<Vec<f32>>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (ChunkSender { inner: producer }, ChunkReceiver { inner: consumer })
}
