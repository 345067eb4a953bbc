//! pYIN log-domain HMM: observation likelihoods and Viterbi decoding

use ndarray::Array2;

use super::candidates::Candidate;
use super::grid::PitchGrid;

const SIGMA_OBS_CENTS: f32 = 50.0;

/// Compute the per-state observation log-likelihood for one frame's
/// candidates.
///
/// The unvoiced state's likelihood is `log(max(1e-15, 1 - voicing_mass))`;
/// each voiced state takes the *maximum* (not logsumexp, a deliberate
/// realtime-cost tradeoff per the spec) over candidates of
/// `log(p_c) + gaussian_log(cents(f_c, f_s), sigma_obs)`.
pub fn observation_log_likelihoods(grid: &PitchGrid, candidates: &[Candidate]) -> Vec<f64> {
    let voicing_mass: f32 = candidates.iter().map(|c| c.probability).sum::<f32>().min(1.0);
    let mut out = vec![f64::NEG_INFINITY; grid.len()];

    out[0] = ((1.0 - voicing_mass).max(1e-15) as f64).ln();

    for &vi in &grid.voiced_indices {
        let state = &grid.states[vi];
        let mut best = f64::NEG_INFINITY;
        for c in candidates {
            if c.probability <= 0.0 {
                continue;
            }
            let cents = 1200.0 * (c.freq.log2() - state.log2_freq) as f64;
            let gaussian = (cents * cents) * (-1.0 / (2.0 * (SIGMA_OBS_CENTS as f64).powi(2)));
            let ll = (c.probability as f64).ln() + gaussian;
            if ll > best {
                best = ll;
            }
        }
        out[vi] = best;
    }
    out
}

/// Stateful per-stream online Viterbi runtime. Never allocates in `step`;
/// the two log-probability buffers are swapped in place.
pub struct OnlineViterbi {
    log_v: Vec<f64>,
    next: Vec<f64>,
    initialized: bool,
}

impl OnlineViterbi {
    pub fn new(states: usize) -> Self {
        Self {
            log_v: vec![f64::NEG_INFINITY; states],
            next: vec![f64::NEG_INFINITY; states],
            initialized: false,
        }
    }

    /// Re-initialize as if the next frame were the first seen.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.log_v.iter_mut().for_each(|v| *v = f64::NEG_INFINITY);
    }

    /// Advance one frame given this frame's observation log-likelihoods
    /// and the transition matrix. Returns `(best_state, voiced_clarity)`.
    pub fn step(&mut self, grid: &PitchGrid, log_trans: &Array2<f64>, obs: &[f64]) -> (usize, f32) {
        let s = obs.len();
        if !self.initialized {
            let n_voiced = grid.voiced_indices.len().max(1) as f64;
            for i in 0..s {
                let prior = if grid.states[i].voiced {
                    (0.5 / n_voiced).ln()
                } else {
                    0.5f64.ln()
                };
                self.log_v[i] = prior + obs[i];
            }
            self.initialized = true;
        } else {
            for dest in 0..s {
                let mut best = f64::NEG_INFINITY;
                for prev in 0..s {
                    let cand = self.log_v[prev] + log_trans[[prev, dest]];
                    if cand > best {
                        best = cand;
                    }
                }
                self.next[dest] = best + obs[dest];
            }
            std::mem::swap(&mut self.log_v, &mut self.next);
        }

        // Shift for numerical stability; argmax is invariant under this.
        let max_v = self.log_v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max_v.is_finite() {
            self.log_v.iter_mut().for_each(|v| *v -= max_v);
        }

        let best_state = self
            .log_v
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0);

        let voiced_mass: f64 = grid.voiced_indices.iter().map(|&i| self.log_v[i].exp()).sum();
        let total_mass: f64 = self.log_v.iter().map(|v| v.exp()).sum();
        let clarity = if total_mass > 0.0 {
            (voiced_mass / total_mass) as f32
        } else {
            0.0
        };

        (best_state, clarity)
    }
}

/// Offline batch Viterbi over `F` frames: full forward pass with
/// backpointers, then traceback. Returns the most likely state index per
/// frame.
pub fn offline_viterbi(grid: &PitchGrid, log_trans: &Array2<f64>, observations: &[Vec<f64>]) -> Vec<usize> {
    let f = observations.len();
    if f == 0 {
        return Vec::new();
    }
    let s = grid.len();
    let mut log_v = vec![vec![f64::NEG_INFINITY; s]; f];
    let mut backptr = vec![vec![0usize; s]; f];

    let n_voiced = grid.voiced_indices.len().max(1) as f64;
    for i in 0..s {
        let prior = if grid.states[i].voiced {
            (0.5 / n_voiced).ln()
        } else {
            0.5f64.ln()
        };
        log_v[0][i] = prior + observations[0][i];
    }

    for t in 1..f {
        for dest in 0..s {
            let mut best = f64::NEG_INFINITY;
            let mut best_prev = 0usize;
            for prev in 0..s {
                let cand = log_v[t - 1][prev] + log_trans[[prev, dest]];
                if cand > best {
                    best = cand;
                    best_prev = prev;
                }
            }
            log_v[t][dest] = best + observations[t][dest];
            backptr[t][dest] = best_prev;
        }
        let max_v = log_v[t].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max_v.is_finite() {
            log_v[t].iter_mut().for_each(|v| *v -= max_v);
        }
    }

    let mut path = vec![0usize; f];
    path[f - 1] = log_v[f - 1]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);
    for t in (1..f).rev() {
        path[t - 1] = backptr[t][path[t]];
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyin::grid::build_transition_matrix;

    #[test]
    fn no_candidates_is_fully_unvoiced_observation() {
        let grid = PitchGrid::new(80.0, 400.0, 5);
        let obs = observation_log_likelihoods(&grid, &[]);
        assert!(obs[0] > obs[1]);
    }

    #[test]
    fn online_viterbi_never_produces_infinite_after_shift() {
        let grid = PitchGrid::new(80.0, 400.0, 5);
        let log_trans = build_transition_matrix(&grid, 25.0, 0.01);
        let mut vit = OnlineViterbi::new(grid.len());
        let candidates = vec![Candidate {
            freq: 220.0,
            probability: 0.9,
        }];
        let obs = observation_log_likelihoods(&grid, &candidates);
        let (_, clarity) = vit.step(&grid, &log_trans, &obs);
        assert!(vit.log_v.iter().all(|v| v.is_finite()));
        assert!((0.0..=1.0).contains(&clarity));
    }

    #[test]
    fn reset_reinitializes_next_step() {
        let grid = PitchGrid::new(80.0, 400.0, 5);
        let log_trans = build_transition_matrix(&grid, 25.0, 0.01);
        let mut vit = OnlineViterbi::new(grid.len());
        let candidates = vec![Candidate {
            freq: 220.0,
            probability: 0.9,
        }];
        let obs = observation_log_likelihoods(&grid, &candidates);
        vit.step(&grid, &log_trans, &obs);
        vit.reset();
        assert!(!vit.initialized);
    }
}
