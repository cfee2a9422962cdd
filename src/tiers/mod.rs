//! Shared percentile and bootstrap-resampling helpers used by both the
//! availability (C5) and latency (C6) tier calculators.

pub mod availability;
pub mod latency;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Linear-interpolated percentile over an ascending-sorted slice. `p` is on
/// the 0..100 scale (so `p=0.1` means "the 0.1th percentile", i.e. the most
/// pessimistic 0.1% of the distribution).
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty(), "percentile of empty slice");
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let index = (p / 100.0) * (n - 1) as f64;
    let lower = index.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    let fraction = index - lower as f64;
    sorted[lower] * (1.0 - fraction) + sorted[upper] * fraction
}

/// A per-invocation bootstrap RNG. Deterministic when `seed` is given (so
/// calculator tests and per-service batch runs can be reproduced); a fresh
/// OS-seeded generator otherwise. Never a process-global RNG.
pub fn bootstrap_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(|| rand::rng().random());
    StdRng::seed_from_u64(seed)
}

/// 95% bootstrap confidence interval for `percentile(data, target_percentile)`,
/// resampling `data` with replacement `resamples` times. A single data
/// point short-circuits to `(point, point)`.
pub fn bootstrap_percentile_ci(
    data: &[f64],
    target_percentile: f64,
    resamples: usize,
    rng: &mut StdRng,
) -> (f64, f64) {
    if data.len() <= 1 {
        let point = data.first().copied().unwrap_or(0.0);
        return (point, point);
    }
    let n = data.len();
    let mut estimates = Vec::with_capacity(resamples);
    for _ in 0..resamples {
        let mut resample: Vec<f64> = (0..n).map(|_| data[rng.random_range(0..n)]).collect();
        resample.sort_by(f64::total_cmp);
        estimates.push(percentile(&resample, target_percentile));
    }
    estimates.sort_by(f64::total_cmp);
    (percentile(&estimates, 2.5), percentile(&estimates, 97.5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_single_point_short_circuits() {
        assert_eq!(percentile(&[0.9995], 0.1), 0.9995);
        assert_eq!(percentile(&[0.9995], 99.0), 0.9995);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&data, 0.0), 0.0);
        assert_eq!(percentile(&data, 100.0), 4.0);
        assert_eq!(percentile(&data, 50.0), 2.0);
    }

    #[test]
    fn bootstrap_ci_single_point_is_degenerate() {
        let mut rng = bootstrap_rng(Some(42));
        let (lo, hi) = bootstrap_percentile_ci(&[0.999], 1.0, 1000, &mut rng);
        assert_eq!(lo, 0.999);
        assert_eq!(hi, 0.999);
    }

    #[test]
    fn bootstrap_ci_is_deterministic_given_a_seed() {
        let data = vec![0.99, 0.995, 0.999, 0.9999, 0.998, 0.997];
        let mut rng_a = bootstrap_rng(Some(7));
        let mut rng_b = bootstrap_rng(Some(7));
        let a = bootstrap_percentile_ci(&data, 5.0, 200, &mut rng_a);
        let b = bootstrap_percentile_ci(&data, 5.0, 200, &mut rng_b);
        assert_eq!(a, b);
    }
}
