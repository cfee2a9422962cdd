//! Attribution Engine (C7): weighted, normalized feature contributions per
//! SLI type, using fixed heuristic weights. These weights are immutable and
//! loaded once; safe to share across every pipeline invocation.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::models::{FeatureAttribution, SliType};

const AVAILABILITY_WEIGHTS: &[(&str, f64)] = &[
    ("historical_availability_mean", 0.40),
    ("downstream_dependency_risk", 0.30),
    ("external_api_reliability", 0.15),
    ("deployment_frequency", 0.15),
];

const LATENCY_WEIGHTS: &[(&str, f64)] = &[
    ("p99_latency_historical", 0.50),
    ("call_chain_depth", 0.22),
    ("noisy_neighbor_margin", 0.15),
    ("traffic_seasonality", 0.13),
];

fn weight_table(sli_type: SliType) -> &'static [(&'static str, f64)] {
    match sli_type {
        SliType::Availability => AVAILABILITY_WEIGHTS,
        SliType::Latency => LATENCY_WEIGHTS,
    }
}

/// Computes weighted feature attributions for `feature_values`, whose keys
/// must exactly match the weight table for `sli_type`.
/// Returns attributions sorted by `|contribution|` descending; their sum is
/// within floating-point tolerance of 1.0.
pub fn compute_attribution(
    sli_type: SliType,
    feature_values: &HashMap<String, f64>,
) -> Result<Vec<FeatureAttribution>, EngineError> {
    let weights = weight_table(sli_type);
    let weight_keys: std::collections::HashSet<&str> = weights.iter().map(|(k, _)| *k).collect();
    let feature_keys: std::collections::HashSet<&str> =
        feature_values.keys().map(String::as_str).collect();

    if weight_keys != feature_keys {
        let missing: Vec<&str> = weight_keys.difference(&feature_keys).copied().collect();
        let extra: Vec<&str> = feature_keys.difference(&weight_keys).copied().collect();
        let mut parts = Vec::new();
        if !missing.is_empty() {
            let mut missing = missing;
            missing.sort_unstable();
            parts.push(format!("missing features: {missing:?}"));
        }
        if !extra.is_empty() {
            let mut extra = extra;
            extra.sort_unstable();
            parts.push(format!("unknown features: {extra:?}"));
        }
        return Err(EngineError::invalid(format!(
            "feature keys must match weight keys. {}",
            parts.join(", ")
        )));
    }

    let mut raw: HashMap<&str, f64> = HashMap::new();
    for (feature, weight) in weights {
        raw.insert(feature, feature_values[*feature] * weight);
    }
    let total: f64 = raw.values().sum();

    let mut attributions: Vec<FeatureAttribution> = weights
        .iter()
        .map(|(feature, _)| {
            let contribution = if total == 0.0 {
                1.0 / weights.len() as f64
            } else {
                raw[feature] / total
            };
            FeatureAttribution {
                feature: feature.to_string(),
                contribution,
                description: format!("{feature}: {:.4}", feature_values[*feature]),
            }
        })
        .collect();

    attributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    Ok(attributions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contributions_sum_to_one_and_are_sorted_descending() {
        let mut features = HashMap::new();
        features.insert("historical_availability_mean".to_string(), 0.995);
        features.insert("downstream_dependency_risk".to_string(), 0.02);
        features.insert("external_api_reliability".to_string(), 0.999);
        features.insert("deployment_frequency".to_string(), 0.5);

        let attributions = compute_attribution(SliType::Availability, &features).unwrap();
        assert_eq!(attributions.len(), 4);

        let sum: f64 = attributions.iter().map(|a| a.contribution).sum();
        assert!((sum - 1.0).abs() < 1e-9);

        for pair in attributions.windows(2) {
            assert!(pair[0].contribution.abs() >= pair[1].contribution.abs());
        }
    }

    #[test]
    fn all_zero_features_distribute_uniformly() {
        let mut features = HashMap::new();
        features.insert("p99_latency_historical".to_string(), 0.0);
        features.insert("call_chain_depth".to_string(), 0.0);
        features.insert("noisy_neighbor_margin".to_string(), 0.0);
        features.insert("traffic_seasonality".to_string(), 0.0);

        let attributions = compute_attribution(SliType::Latency, &features).unwrap();
        for attribution in &attributions {
            assert!((attribution.contribution - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn mismatched_keys_are_rejected() {
        let mut features = HashMap::new();
        features.insert("historical_availability_mean".to_string(), 0.9);
        features.insert("downstream_dependency_risk".to_string(), 0.1);
        features.insert("external_api_reliability".to_string(), 0.9);
        features.insert("bogus_feature".to_string(), 1.0);

        let err = compute_attribution(SliType::Availability, &features).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing") || message.contains("unknown"));
    }
}
