//! Automatic gain control stage (C2)
//!
//! A per-chunk envelope follower with per-sample gain smoothing, applied
//! ahead of the resampler. Attack/release coefficients are derived from a
//! time constant and the sample rate; gain then ramps toward a target
//! level in three stages: envelope tracking, target-gain computation, and
//! per-sample smoothing.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{PitchError, PitchResult};

const NOISE_FLOOR: f32 = 1e-10;
const ENVELOPE_MAX: f32 = 10.0;
const GAIN_SMOOTHING_MS: f32 = 5.0;

/// AGC configuration. All fields are clamped to documented ranges both on
/// construction and on partial update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgcConfig {
    /// Target RMS level the AGC converges the envelope toward.
    pub target_level: f32,
    /// Attack time constant in milliseconds (envelope rising).
    pub attack_time_ms: f32,
    /// Release time constant in milliseconds (envelope falling).
    pub release_time_ms: f32,
    /// Maximum gain the AGC may apply.
    pub max_gain: f32,
    /// Minimum gain the AGC may apply.
    pub min_gain: f32,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            target_level: 0.3,
            attack_time_ms: 3.0,
            release_time_ms: 100.0,
            max_gain: 10.0,
            min_gain: 0.1,
        }
    }
}

impl AgcConfig {
    fn clamp(mut self) -> Self {
        self.target_level = self.target_level.clamp(0.01, 1.0);
        self.attack_time_ms = self.attack_time_ms.max(0.5);
        self.release_time_ms = self.release_time_ms.max(1.0);
        self.max_gain = self.max_gain.max(0.01);
        self.min_gain = self.min_gain.max(0.01).min(self.max_gain);
        self
    }
}

/// Derive a one-pole smoothing coefficient from a time constant (seconds)
/// and a sample rate: `1 - exp(clamp(-2.2/(tau*fs), -50, -1e-3))`.
fn time_constant_coeff(tau_seconds: f32, sample_rate: f32) -> f32 {
    let exponent = (-2.2 / (tau_seconds * sample_rate)).clamp(-50.0, -1e-3);
    (1.0 - exponent.exp()).clamp(1e-3, 0.999)
}

/// Throttle-friendly statistics snapshot, mirrors the spec's "Statistics
/// message" control-channel payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgcStats {
    pub rms: f32,
    pub envelope: f32,
    pub gain: f32,
    pub target_gain: f32,
    pub gain_reduction_db: f32,
}

/// Per-chunk envelope follower with per-sample gain smoothing.
pub struct AgcStage {
    config: AgcConfig,
    sample_rate: f32,
    envelope: f32,
    current_gain: f32,
    target_gain: f32,
    prev_enabled: bool,
    attack_coeff: f32,
    release_coeff: f32,
    gain_coeff: f32,
}

impl AgcStage {
    /// Construct an AGC stage at the given sample rate (the rate at which
    /// `apply_gain` will be called, typically the device rate, ahead of
    /// resampling).
    pub fn new_at_rate(config: AgcConfig, sample_rate: u32) -> Self {
        let config = config.clamp();
        let sr = sample_rate as f32;
        Self {
            attack_coeff: time_constant_coeff(config.attack_time_ms / 1000.0, sr),
            release_coeff: time_constant_coeff(config.release_time_ms / 1000.0, sr),
            gain_coeff: time_constant_coeff(GAIN_SMOOTHING_MS / 1000.0, sr),
            config,
            sample_rate: sr,
            envelope: NOISE_FLOOR,
            current_gain: 1.0,
            target_gain: 1.0,
            prev_enabled: false,
        }
    }

    /// Construct an AGC stage assuming a 44.1 kHz device rate; prefer
    /// [`AgcStage::new_at_rate`] when the device rate is known.
    pub fn new(config: AgcConfig) -> Self {
        Self::new_at_rate(config, 44_100)
    }

    pub fn config(&self) -> AgcConfig {
        self.config
    }

    /// Apply a partial parameter update; unspecified fields are left
    /// unchanged. Returns the acknowledgment (current values after clamp).
    pub fn update(&mut self, update: &crate::control::AgcUpdate) -> crate::control::AgcAck {
        let mut cfg = self.config;
        if let Some(v) = update.target_level {
            cfg.target_level = v;
        }
        if let Some(v) = update.attack_time_ms {
            cfg.attack_time_ms = v;
        }
        if let Some(v) = update.release_time_ms {
            cfg.release_time_ms = v;
        }
        if let Some(v) = update.max_gain {
            cfg.max_gain = v;
        }
        if let Some(v) = update.min_gain {
            cfg.min_gain = v;
        }
        self.config = cfg.clamp();
        self.attack_coeff = time_constant_coeff(self.config.attack_time_ms / 1000.0, self.sample_rate);
        self.release_coeff = time_constant_coeff(self.config.release_time_ms / 1000.0, self.sample_rate);
        debug!("AGC parameters updated: {:?}", self.config);
        crate::control::AgcAck {
            parameters: self.config,
        }
    }

    /// Current smoothed gain.
    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }

    /// Current envelope estimate.
    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    /// Snapshot of the AGC's internal state, for a throttled statistics
    /// message to a host UI (out of scope here, but the data is real).
    pub fn stats(&self, last_rms: f32) -> AgcStats {
        let gain_reduction_db = 20.0 * self.current_gain.max(1e-12).log10();
        AgcStats {
            rms: last_rms,
            envelope: self.envelope,
            gain: self.current_gain,
            target_gain: self.target_gain,
            gain_reduction_db,
        }
    }

    /// Apply gain control to `samples`, returning a new same-length buffer.
    ///
    /// When `enabled` is false, this is a pure passthrough (still replacing
    /// non-finite/out-of-range samples with 0, per the shared input-value
    /// recovery policy). On the `false -> true` rising edge, `envelope` and
    /// `current_gain` are reset.
    pub fn apply_gain(&mut self, samples: &[f32], enabled: bool) -> Vec<f32> {
        if !self.prev_enabled && enabled {
            self.envelope = NOISE_FLOOR;
            self.current_gain = 1.0;
            trace!("AGC enabled: envelope and gain reset");
        }
        self.prev_enabled = enabled;

        if !enabled {
            return samples
                .iter()
                .map(|&s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
                .collect();
        }

        let n = samples.len().max(1) as f32;
        let (sum, sum_sq, count) = samples.iter().fold((0.0f32, 0.0f32, 0u32), |(s, sq, c), &x| {
            if x.is_finite() {
                (s + x, sq + x * x, c + 1)
            } else {
                (s, sq, c)
            }
        });
        let count_f = count.max(1) as f32;
        let mean = sum / count_f;
        let rms = (sum_sq / count_f - mean * mean).max(0.0).sqrt();
        let _ = n;

        let alpha = if rms > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = ((1.0 - alpha) * self.envelope + alpha * rms.max(NOISE_FLOOR))
            .clamp(NOISE_FLOOR, ENVELOPE_MAX);

        self.target_gain = if self.envelope > 1e-8 {
            (self.config.target_level / self.envelope).clamp(self.config.min_gain, self.config.max_gain)
        } else {
            1.0
        };

        let mut out = Vec::with_capacity(samples.len());
        for &s in samples {
            self.current_gain = (1.0 - self.gain_coeff) * self.current_gain + self.gain_coeff * self.target_gain;
            self.current_gain = self.current_gain.clamp(self.config.min_gain, self.config.max_gain);

            let y = if s.is_finite() && s.abs() < 10.0 {
                (s * self.current_gain).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            out.push(y);
        }

        trace!("AGC: rms={rms:.5} envelope={:.5} gain={:.3}", self.envelope, self.current_gain);
        out
    }
}

/// Validate a standalone config the way construction/update does, surfaced
/// as a hard error for callers that want to pre-validate before construction.
pub fn validate_config(config: &AgcConfig) -> PitchResult<()> {
    if !(0.01..=1.0).contains(&config.target_level) {
        return Err(PitchError::ParameterOutOfRange {
            name: "target_level",
            value: config.target_level,
            expected: "[0.01, 1.0]",
        });
    }
    if config.attack_time_ms < 0.5 {
        return Err(PitchError::ParameterOutOfRange {
            name: "attack_time_ms",
            value: config.attack_time_ms,
            expected: ">= 0.5",
        });
    }
    if config.release_time_ms < 1.0 {
        return Err(PitchError::ParameterOutOfRange {
            name: "release_time_ms",
            value: config.release_time_ms,
            expected: ">= 1.0",
        });
    }
    if config.min_gain <= 0.01 || config.max_gain <= 0.01 || config.min_gain > config.max_gain {
        return Err(PitchError::ParameterOutOfRange {
            name: "min_gain/max_gain",
            value: config.min_gain,
            expected: "0.01 < min_gain <= max_gain",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_disabled() {
        let mut agc = AgcStage::new(AgcConfig::default());
        let input = vec![0.1, -0.2, 0.3];
        let out = agc.apply_gain(&input, false);
        assert_eq!(out, input);
    }

    #[test]
    fn non_finite_becomes_zero() {
        let mut agc = AgcStage::new(AgcConfig::default());
        let input = vec![f32::NAN, f32::INFINITY, 0.2];
        let out = agc.apply_gain(&input, false);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 0.2);
    }

    #[test]
    fn never_exceeds_unity_output() {
        let mut agc = AgcStage::new(AgcConfig::default());
        let input: Vec<f32> = (0..44_100).map(|i| 0.9 * (i as f32 * 0.1).sin()).collect();
        let out = agc.apply_gain(&input, true);
        assert!(out.iter().all(|&s| s.abs() <= 1.0 + 1e-6));
    }

    #[test]
    fn converges_for_quiet_noise() {
        let mut agc = AgcStage::new_at_rate(AgcConfig::default(), 44_100);
        // 1 second of 0.05-amplitude deterministic pseudo-noise.
        let mut seed = 12345u32;
        let noise: Vec<f32> = (0..44_100)
            .map(|_| {
                seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                0.05 * (((seed >> 8) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0)
            })
            .collect();
        let out = agc.apply_gain(&noise, true);
        assert!(out.iter().all(|&s| s.abs() <= 1.0));
        assert!(agc.envelope() >= 1e-10 && agc.envelope() <= 10.0);
        assert!(agc.current_gain() >= agc.config.min_gain && agc.current_gain() <= agc.config.max_gain);
    }

    #[test]
    fn rising_edge_resets_state() {
        let mut agc = AgcStage::new(AgcConfig::default());
        let loud = vec![0.9; 1000];
        agc.apply_gain(&loud, true);
        agc.apply_gain(&loud, false);
        // Next enable should start from a reset envelope/gain, not the
        // previous converged state.
        agc.apply_gain(&[0.0; 1], true);
        assert!(agc.current_gain() <= agc.config.max_gain);
    }

    #[test]
    fn invalid_config_rejected() {
        let bad = AgcConfig {
            target_level: 5.0,
            ..Default::default()
        };
        assert!(validate_config(&bad).is_err());
    }
}
