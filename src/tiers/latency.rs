//! Latency Tier Calculator (C6): percentile-based tier targets with a
//! noise margin, breach probability, and bootstrap confidence intervals
//! over the maxima of resampled percentile series.

use crate::error::EngineError;
use crate::models::{LatencySliData, RecommendationTier, TierLevel};

use super::{bootstrap_rng, percentile};

pub struct LatencyTierCalculator {
    pub noise_margin_default: f64,
    pub noise_margin_shared_infra: f64,
    pub bootstrap_resamples: usize,
}

impl LatencyTierCalculator {
    pub fn new(noise_margin_default: f64, noise_margin_shared_infra: f64, bootstrap_resamples: usize) -> Self {
        Self {
            noise_margin_default,
            noise_margin_shared_infra,
            bootstrap_resamples,
        }
    }

    /// Computes the three latency tiers from a non-empty sequence of
    /// per-window samples:
    /// Conservative = max(p999) * (1+m), Balanced = max(p99) * (1+m),
    /// Aggressive = max(p95) with no margin.
    pub fn compute_tiers(
        &self,
        sli_data: &[LatencySliData],
        shared_infrastructure: bool,
        seed: Option<u64>,
    ) -> Result<Vec<RecommendationTier>, EngineError> {
        if sli_data.is_empty() {
            return Err(EngineError::invalid("sli_data cannot be empty"));
        }

        let margin = if shared_infrastructure {
            self.noise_margin_shared_infra
        } else {
            self.noise_margin_default
        };

        let p95_values: Vec<f64> = sli_data.iter().map(|d| d.p95_ms).collect();
        let p99_values: Vec<f64> = sli_data.iter().map(|d| d.p99_ms).collect();
        let p999_values: Vec<f64> = sli_data.iter().map(|d| d.p999_ms).collect();

        let mut rng = bootstrap_rng(seed);

        let conservative_target = max_of(&p999_values) * (1.0 + margin);
        let conservative_breach = breach_probability(&p999_values, conservative_target);
        let conservative_ci = bootstrap_max_ci(&p999_values, self.bootstrap_resamples, &mut rng);

        let balanced_target = max_of(&p99_values) * (1.0 + margin);
        let balanced_breach = breach_probability(&p99_values, balanced_target);
        let balanced_ci = bootstrap_max_ci(&p99_values, self.bootstrap_resamples, &mut rng);

        let aggressive_target = max_of(&p95_values);
        let aggressive_breach = breach_probability(&p95_values, aggressive_target);
        let aggressive_ci = bootstrap_max_ci(&p95_values, self.bootstrap_resamples, &mut rng);

        Ok(vec![
            RecommendationTier {
                level: TierLevel::Conservative,
                target: conservative_target,
                error_budget_monthly_minutes: None,
                breach_probability: conservative_breach,
                confidence_interval: Some(conservative_ci),
                percentile: Some("p999"),
                target_ms: Some(conservative_target as i64),
            },
            RecommendationTier {
                level: TierLevel::Balanced,
                target: balanced_target,
                error_budget_monthly_minutes: None,
                breach_probability: balanced_breach,
                confidence_interval: Some(balanced_ci),
                percentile: Some("p99"),
                target_ms: Some(balanced_target as i64),
            },
            RecommendationTier {
                level: TierLevel::Aggressive,
                target: aggressive_target,
                error_budget_monthly_minutes: None,
                breach_probability: aggressive_breach,
                confidence_interval: Some(aggressive_ci),
                percentile: Some("p95"),
                target_ms: Some(aggressive_target as i64),
            },
        ])
    }
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::MIN, f64::max)
}

/// Fraction of samples whose value exceeds the tier target.
fn breach_probability(values: &[f64], target: f64) -> f64 {
    let breaches = values.iter().filter(|&&v| v > target).count();
    breaches as f64 / values.len() as f64
}

/// Bootstrap CI over the *maxima* of resamples, matching the "Conservative =
/// max(p999)" construction: each resample draws `n` values with replacement
/// and takes their max, then the 2.5/97.5 percentiles of those maxima form
/// the interval. A single data point is degenerate.
fn bootstrap_max_ci(
    values: &[f64],
    resamples: usize,
    rng: &mut rand::rngs::StdRng,
) -> (f64, f64) {
    use rand::Rng;

    if values.len() <= 1 {
        let point = values.first().copied().unwrap_or(0.0);
        return (point, point);
    }
    let n = values.len();
    let mut maxima = Vec::with_capacity(resamples);
    for _ in 0..resamples {
        let resample_max = (0..n)
            .map(|_| values[rng.random_range(0..n)])
            .fold(f64::MIN, f64::max);
        maxima.push(resample_max);
    }
    maxima.sort_by(f64::total_cmp);
    (percentile(&maxima, 2.5), percentile(&maxima, 97.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn sample(p50: f64, p95: f64, p99: f64, p999: f64) -> LatencySliData {
        let now = Utc::now();
        LatencySliData::new(p50, p95, p99, p999, now - Duration::days(1), now, 1000).unwrap()
    }

    #[test]
    fn matches_spec_worked_example() {
        let calc = LatencyTierCalculator::new(0.05, 0.10, 1000);
        let data = vec![sample(100.0, 200.0, 250.0, 300.0)];
        let tiers = calc.compute_tiers(&data, false, Some(11)).unwrap();

        let conservative = tiers.iter().find(|t| t.level == TierLevel::Conservative).unwrap();
        let balanced = tiers.iter().find(|t| t.level == TierLevel::Balanced).unwrap();
        let aggressive = tiers.iter().find(|t| t.level == TierLevel::Aggressive).unwrap();

        assert!((conservative.target - 315.0).abs() < 1e-9);
        assert!((balanced.target - 262.5).abs() < 1e-9);
        assert!((aggressive.target - 200.0).abs() < 1e-9);
        assert_eq!(conservative.percentile, Some("p999"));
        // Single sample short-circuits the CI to (point, point) over the raw
        // p999 values; the margin only applies to `target`, not the CI.
        assert_eq!(conservative.confidence_interval, Some((300.0, 300.0)));
    }

    #[test]
    fn shared_infrastructure_uses_the_wider_margin() {
        let calc = LatencyTierCalculator::new(0.05, 0.10, 1000);
        let data = vec![sample(100.0, 200.0, 250.0, 300.0)];
        let tiers = calc.compute_tiers(&data, true, Some(1)).unwrap();
        let conservative = tiers.iter().find(|t| t.level == TierLevel::Conservative).unwrap();
        assert!((conservative.target - 330.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_is_rejected() {
        let calc = LatencyTierCalculator::new(0.05, 0.10, 1000);
        assert!(calc.compute_tiers(&[], false, None).is_err());
    }
}
