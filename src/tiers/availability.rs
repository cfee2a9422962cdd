//! Availability Tier Calculator (C5): percentile-based tier targets capped
//! by the composite dependency bound, breach probability, error budget, and
//! bootstrap confidence intervals.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::models::{RecommendationTier, TierLevel};

use super::{bootstrap_percentile_ci, bootstrap_rng, percentile};

const MONTHLY_MINUTES: f64 = 43_200.0;

/// Percentile basis (0..100 scale) for each tier.
const CONSERVATIVE_PCT: f64 = 0.1;
const BALANCED_PCT: f64 = 1.0;
const AGGRESSIVE_PCT: f64 = 5.0;

pub struct AvailabilityTierCalculator {
    pub bootstrap_resamples: usize,
}

impl AvailabilityTierCalculator {
    pub fn new(bootstrap_resamples: usize) -> Self {
        Self { bootstrap_resamples }
    }

    /// Computes the three availability tiers. `rolling_availabilities` is
    /// the per-bucket empirical distribution; `composite_bound` caps
    /// Conservative and Balanced but not Aggressive.
    pub fn compute_tiers(
        &self,
        rolling_availabilities: &[f64],
        composite_bound: f64,
        seed: Option<u64>,
    ) -> Result<HashMap<TierLevel, RecommendationTier>, EngineError> {
        if rolling_availabilities.is_empty() {
            return Err(EngineError::invalid("rolling_availabilities cannot be empty"));
        }
        if rolling_availabilities.iter().any(|a| !(0.0..=1.0).contains(a)) {
            return Err(EngineError::invalid(
                "all rolling availabilities must be in [0,1]",
            ));
        }
        if !(0.0..=1.0).contains(&composite_bound) {
            return Err(EngineError::invalid(format!(
                "composite_bound must be in [0,1], got {composite_bound}"
            )));
        }

        let mut sorted: Vec<f64> = rolling_availabilities.to_vec();
        sorted.sort_by(f64::total_cmp);

        let conservative_raw = percentile(&sorted, CONSERVATIVE_PCT);
        let balanced_raw = percentile(&sorted, BALANCED_PCT);
        let aggressive_raw = percentile(&sorted, AGGRESSIVE_PCT);

        let conservative_target = conservative_raw.min(composite_bound);
        let balanced_target = balanced_raw.min(composite_bound);
        let aggressive_target = aggressive_raw; // not capped

        let mut rng = bootstrap_rng(seed);
        let mut tiers = HashMap::new();
        for (level, target_ratio, ci_pct) in [
            (TierLevel::Conservative, conservative_target, CONSERVATIVE_PCT),
            (TierLevel::Balanced, balanced_target, BALANCED_PCT),
            (TierLevel::Aggressive, aggressive_target, AGGRESSIVE_PCT),
        ] {
            let breach_probability = breach_probability(target_ratio, rolling_availabilities);
            let (ci_lo, ci_hi) = bootstrap_percentile_ci(
                rolling_availabilities,
                ci_pct,
                self.bootstrap_resamples,
                &mut rng,
            );
            let target_pct = target_ratio * 100.0;
            tiers.insert(
                level,
                RecommendationTier {
                    level,
                    target: target_pct,
                    error_budget_monthly_minutes: Some(error_budget_minutes(target_pct)?),
                    breach_probability,
                    confidence_interval: Some((ci_lo * 100.0, ci_hi * 100.0)),
                    percentile: None,
                    target_ms: None,
                },
            );
        }

        Ok(tiers)
    }
}

/// Fraction of buckets strictly below `target`.
fn breach_probability(target: f64, rolling_availabilities: &[f64]) -> f64 {
    let breaches = rolling_availabilities.iter().filter(|&&a| a < target).count();
    breaches as f64 / rolling_availabilities.len() as f64
}

/// `(100 - target%) / 100 * 43200`, a 30-day accounting month.
pub fn error_budget_minutes(target_percentage: f64) -> Result<f64, EngineError> {
    if !(0.0..=100.0).contains(&target_percentage) {
        return Err(EngineError::invalid(format!(
            "target_percentage must be in [0,100], got {target_percentage}"
        )));
    }
    Ok((100.0 - target_percentage) / 100.0 * MONTHLY_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bucket_all_tiers_equal_and_ci_is_a_point() {
        let calc = AvailabilityTierCalculator::new(1000);
        let tiers = calc.compute_tiers(&[0.999], 0.999, Some(1)).unwrap();
        let targets: Vec<f64> = tiers.values().map(|t| t.target).collect();
        assert!(targets.iter().all(|&t| (t - 99.9).abs() < 1e-9));
        for tier in tiers.values() {
            let (lo, hi) = tier.confidence_interval.unwrap();
            assert!((lo - hi).abs() < 1e-9);
        }
    }

    #[test]
    fn dependency_cap_applies_to_conservative_and_balanced_only() {
        let calc = AvailabilityTierCalculator::new(1000);
        let mut data = vec![0.999; 20];
        data.extend([0.995, 0.990, 0.985]);
        data.extend(vec![0.998; 7]);
        let tiers = calc.compute_tiers(&data, 0.997, Some(7)).unwrap();

        let conservative = tiers[&TierLevel::Conservative].target;
        let balanced = tiers[&TierLevel::Balanced].target;
        let aggressive = tiers[&TierLevel::Aggressive].target;

        assert!(conservative <= 99.7 + 1e-9);
        assert!(balanced <= 99.7 + 1e-9);
        assert!(conservative <= balanced);
        assert!(balanced <= aggressive + 1e-9);

        let breach_c = tiers[&TierLevel::Conservative].breach_probability;
        let breach_b = tiers[&TierLevel::Balanced].breach_probability;
        let breach_a = tiers[&TierLevel::Aggressive].breach_probability;
        assert!(breach_c <= breach_b + 1e-9);
        assert!(breach_b <= breach_a + 1e-9);
    }

    #[test]
    fn all_ones_capped_at_composite_bound() {
        let calc = AvailabilityTierCalculator::new(1000);
        let data = vec![1.0; 30];
        let tiers = calc.compute_tiers(&data, 0.999, Some(3)).unwrap();
        assert!((tiers[&TierLevel::Conservative].target - 99.9).abs() < 1e-9);
        assert!((tiers[&TierLevel::Balanced].target - 99.9).abs() < 1e-9);
        assert!((tiers[&TierLevel::Aggressive].target - 100.0).abs() < 1e-9);
    }

    #[test]
    fn error_budget_minutes_matches_spec_example() {
        assert!((error_budget_minutes(99.9).unwrap() - 43.2).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        let calc = AvailabilityTierCalculator::new(1000);
        assert!(calc.compute_tiers(&[], 0.9, None).is_err());
        assert!(calc.compute_tiers(&[1.5], 0.9, None).is_err());
        assert!(calc.compute_tiers(&[0.9], 1.5, None).is_err());
    }
}
