//! Control-channel message types
//!
//! These are plain data, carried across a one-way channel from a control
//! thread to the audio-callback thread; application at the next callback
//! boundary is the caller's responsibility. No wire protocol is defined
//! here; these types derive `serde` so a host can serialize them if it
//! wants one, without the core crate mandating a transport.

use serde::{Deserialize, Serialize};

use crate::agc::AgcConfig;

/// A partial AGC parameter update: any subset of fields may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgcUpdate {
    pub target_level: Option<f32>,
    pub attack_time_ms: Option<f32>,
    pub release_time_ms: Option<f32>,
    pub max_gain: Option<f32>,
    pub min_gain: Option<f32>,
}

/// Acknowledgment sent back after applying an [`AgcUpdate`]: the full
/// current (clamped) parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgcAck {
    pub parameters: AgcConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_round_trips_through_json() {
        let update = AgcUpdate {
            target_level: Some(0.4),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        let back: AgcUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(update, back);
    }
}
