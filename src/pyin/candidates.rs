//! pYIN candidate extraction: threshold-distribution weighting

/// Maximum number of local minima tracked per frame.
pub const MAX_TROUGHS: usize = 200;

/// A frequency candidate with its accumulated threshold-distribution
/// probability (not renormalized to sum to 1 across candidates).
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub freq: f32,
    pub probability: f32,
}

/// Beta(2, 18) CDF, closed form `1 - (1-x)^18 * (1 + 17x)`. A `(1 + 18x)`
/// variant shows up in some references but doesn't match the closed-form
/// derivative of the Beta(2, 18) density; `(1 + 17x)` is the correct one.
pub fn beta_2_18_cdf(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    1.0 - (1.0 - x).powi(18) * (1.0 + 17.0 * x)
}

/// Find all strict local minima of `cmndf` within `[tau_min, tau_max]`,
/// writing up to `MAX_TROUGHS` `(tau, value)` pairs in ascending lag order.
pub fn find_local_minima(cmndf: &[f32], tau_min: usize, tau_max: usize) -> Vec<(usize, f32)> {
    let mut troughs = Vec::with_capacity(MAX_TROUGHS);
    let lo = tau_min.max(1);
    let hi = tau_max.min(cmndf.len().saturating_sub(2));
    let mut tau = lo;
    while tau <= hi && troughs.len() < MAX_TROUGHS {
        if cmndf[tau] <= cmndf[tau - 1] && cmndf[tau] <= cmndf[tau + 1] {
            troughs.push((tau, cmndf[tau]));
        }
        tau += 1;
    }
    troughs
}

/// Stabilized parabolic refinement used for pYIN candidates: accept the
/// offset only when `|x0| < 1`.
fn stabilized_parabolic_refine(cmndf: &[f32], tau: usize) -> Option<f32> {
    if tau == 0 || tau + 1 >= cmndf.len() {
        return Some(tau as f32);
    }
    let (y1, y2, y3) = (cmndf[tau - 1], cmndf[tau], cmndf[tau + 1]);
    let a = y3 + y1 - 2.0 * y2;
    let b = (y3 - y1) / 2.0;
    if a != 0.0 && b.abs() < a.abs() {
        let x0 = -b / a;
        if x0.abs() < 1.0 {
            return Some(tau as f32 + x0);
        }
    }
    Some(tau as f32)
}

/// Integrate local minima over the discretized Beta(2,18) threshold
/// distribution, producing per-minimum accumulated probability, then emit
/// one frequency candidate per minimum with nonzero probability.
///
/// `bins` is the number of equal-width bins over `theta in (0, 1]` (50 for
/// the online path, 100 for batch).
pub fn extract_candidates(
    cmndf: &[f32],
    sample_rate: u32,
    tau_min: usize,
    tau_max: usize,
    bins: usize,
) -> Vec<Candidate> {
    let troughs = find_local_minima(cmndf, tau_min, tau_max);
    if troughs.is_empty() {
        return Vec::new();
    }

    let mut accumulated = vec![0.0f32; troughs.len()];
    const RHO: f32 = std::f32::consts::E.recip().powi(2); // e^-2

    let bins = bins.max(1);
    let mut prev_cdf = beta_2_18_cdf(0.0);
    for bin in 1..=bins {
        let theta_i = bin as f32 / bins as f32;
        let cdf_i = beta_2_18_cdf(theta_i);
        let w_i = cdf_i - prev_cdf;
        prev_cdf = cdf_i;
        if w_i <= 0.0 {
            continue;
        }

        let count = troughs.iter().filter(|&&(_, v)| v < theta_i).count();
        if count == 0 {
            continue;
        }

        // Boltzmann sub-weights: rho^j / sum_{k<count} rho^k, closed form
        // denominator (1 - rho^count) / (1 - rho).
        let denom = if (1.0 - RHO).abs() > 1e-9 {
            (1.0 - RHO.powi(count as i32)) / (1.0 - RHO)
        } else {
            count as f32
        };

        let mut j = 0usize;
        for (idx, &(_, v)) in troughs.iter().enumerate() {
            if v < theta_i {
                let weight = RHO.powi(j as i32) / denom;
                accumulated[idx] += w_i * weight;
                j += 1;
            }
        }
    }

    let mut candidates = Vec::with_capacity(troughs.len());
    for (idx, &(tau, _)) in troughs.iter().enumerate() {
        if accumulated[idx] > 0.0 {
            if let Some(tau_refined) = stabilized_parabolic_refine(cmndf, tau) {
                if tau_refined > 0.0 {
                    let freq = sample_rate as f32 / tau_refined;
                    if freq.is_finite() {
                        candidates.push(Candidate {
                            freq,
                            probability: accumulated[idx],
                        });
                    }
                }
            }
        }
    }
    candidates
}
