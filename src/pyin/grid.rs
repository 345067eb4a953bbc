//! pYIN pitch-state grid and transition matrix

use ndarray::Array2;

use crate::freq_to_midi;

/// One state in the pYIN hidden-Markov pitch grid: either the single
/// unvoiced state, or a voiced state pinned to a MIDI-cents grid point.
#[derive(Debug, Clone, Copy)]
pub struct PitchState {
    pub voiced: bool,
    /// MIDI note number (only meaningful when `voiced`).
    pub midi: f32,
    /// Frequency in Hz (only meaningful when `voiced`).
    pub freq: f32,
    /// `log2(freq)`, cached for the inner observation-likelihood loop.
    pub log2_freq: f32,
}

/// The ordered grid of states: index 0 is always the unvoiced state,
/// followed by voiced states ascending in frequency.
pub struct PitchGrid {
    pub states: Vec<PitchState>,
    pub voiced_indices: Vec<usize>,
    pub unvoiced_indices: Vec<usize>,
}

impl PitchGrid {
    /// Build the grid. Identical parameters always yield a byte-identical
    /// grid (pure function of `min_freq`, `max_freq`, `steps_per_semitone`).
    pub fn new(min_freq: f32, max_freq: f32, steps_per_semitone: u32) -> Self {
        let steps = steps_per_semitone.max(1) as f32;
        let min_midi = freq_to_midi(min_freq);
        let max_midi = freq_to_midi(max_freq);

        let mut states = vec![PitchState {
            voiced: false,
            midi: 0.0,
            freq: 0.0,
            log2_freq: 0.0,
        }];

        let start = (min_midi * steps).ceil() / steps;
        let mut midi = start;
        while midi <= max_midi {
            let freq = crate::midi_to_freq(midi);
            states.push(PitchState {
                voiced: true,
                midi,
                freq,
                log2_freq: freq.log2(),
            });
            midi += 1.0 / steps;
        }

        let voiced_indices: Vec<usize> = (1..states.len()).collect();
        let unvoiced_indices = vec![0usize];

        Self {
            states,
            voiced_indices,
            unvoiced_indices,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Build the dense `S x S` log-transition matrix.
///
/// Row-major contiguous storage via `ndarray::Array2`, rather than nested
/// per-state vectors.
pub fn build_transition_matrix(grid: &PitchGrid, sigma_trans_cents: f32, p_switch: f32) -> Array2<f64> {
    let s = grid.len();
    let mut raw = Array2::<f64>::zeros((s, s));

    for i in 0..s {
        let origin = &grid.states[i];
        let same_group: &[usize] = if origin.voiced {
            &grid.voiced_indices
        } else {
            &grid.unvoiced_indices
        };
        let opposite_group: &[usize] = if origin.voiced {
            &grid.unvoiced_indices
        } else {
            &grid.voiced_indices
        };

        let mut same_raw = vec![0.0f64; same_group.len()];
        let mut s_same = 0.0f64;
        for (k, &j) in same_group.iter().enumerate() {
            let p = if origin.voiced {
                let dest = &grid.states[j];
                let d_cents = 1200.0 * (dest.log2_freq - origin.log2_freq) as f64;
                (-(d_cents * d_cents) / (2.0 * (sigma_trans_cents as f64).powi(2))).exp()
            } else {
                1.0 / grid.unvoiced_indices.len() as f64
            };
            same_raw[k] = p;
            s_same += p;
        }

        for (k, &j) in same_group.iter().enumerate() {
            let p = if s_same > 0.0 {
                (1.0 - p_switch as f64) * same_raw[k] / s_same
            } else {
                0.0
            };
            raw[[i, j]] = p;
        }
        if !opposite_group.is_empty() {
            let p_each = p_switch as f64 / opposite_group.len() as f64;
            for &j in opposite_group {
                raw[[i, j]] = p_each;
            }
        }
    }

    raw.mapv(|p| p.max(1e-30).ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_starts_unvoiced() {
        let grid = PitchGrid::new(80.0, 800.0, 5);
        assert!(!grid.states[0].voiced);
        assert!(grid.states[1].voiced);
    }

    #[test]
    fn deterministic_across_constructions() {
        let a = PitchGrid::new(80.0, 800.0, 5);
        let b = PitchGrid::new(80.0, 800.0, 5);
        assert_eq!(a.len(), b.len());
        for (sa, sb) in a.states.iter().zip(b.states.iter()) {
            assert_eq!(sa.voiced, sb.voiced);
            assert_eq!(sa.midi.to_bits(), sb.midi.to_bits());
        }
    }

    #[test]
    fn rows_normalize_to_one() {
        let grid = PitchGrid::new(80.0, 400.0, 5);
        let log_t = build_transition_matrix(&grid, 25.0, 0.01);
        for i in 0..grid.len() {
            let row_sum: f64 = (0..grid.len()).map(|j| log_t[[i, j]].exp()).sum();
            assert!((row_sum - 1.0).abs() < 1e-2, "row {i} sums to {row_sum}");
        }
    }

    #[test]
    fn self_transition_dominates_neighboring_cents_bins() {
        // At sigma=25 cents and 5 steps/semitone (20-cent spacing), an
        // interior voiced row's normalized self-probability lands around
        // 0.3, not above 0.5 - the Gaussian is wide relative to the grid
        // spacing so mass spreads across several neighboring bins. Check
        // the weaker, actually-true property instead: the diagonal still
        // outweighs any single neighbor.
        let grid = PitchGrid::new(80.0, 400.0, 5);
        let log_t = build_transition_matrix(&grid, 25.0, 0.01);
        // Skip state 0 (unvoiced) and its immediate neighbor so every row
        // checked here has two genuine voiced neighbors on the grid.
        for i in 2..grid.len() - 1 {
            let diag = log_t[[i, i]].exp();
            let left = log_t[[i, i - 1]].exp();
            let right = log_t[[i, i + 1]].exp();
            assert!(diag > left && diag > right, "row {i}: diag={diag} left={left} right={right}");
        }
    }
}
