use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `slo_recommender.toml`. Every tunable here
/// has a documented default, so an empty or missing config file still
/// reproduces the intended behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub cold_start: ColdStartConfig,
    pub graph: GraphConfig,
    pub batch: BatchConfig,
    pub latency: LatencyConfig,
    pub bootstrap: BootstrapConfig,
    pub lifecycle: LifecycleConfig,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            cold_start: ColdStartConfig::default(),
            graph: GraphConfig::default(),
            batch: BatchConfig::default(),
            latency: LatencyConfig::default(),
            bootstrap: BootstrapConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColdStartConfig {
    /// Below this data-completeness ratio, the pipeline falls back to the
    /// extended lookback window.
    pub completeness_threshold: f64,
    pub extended_lookback_days: u32,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            completeness_threshold: 0.90,
            extended_lookback_days: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Depth of the downstream traversal the pipeline feeds into the
    /// composite availability calculator.
    pub dependency_max_depth: u32,
    /// Edges not observed within this many hours are marked stale by C1's
    /// sweep.
    pub staleness_threshold_hours: i64,
    /// Cadence of the staleness sweep, in hours.
    pub staleness_sweep_interval_hours: i64,
    /// Cadence of the circular-dependency detection sweep, in hours.
    pub cycle_detection_interval_hours: i64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            dependency_max_depth: 3,
            staleness_threshold_hours: 168,
            staleness_sweep_interval_hours: 24,
            cycle_detection_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum in-flight per-service pipelines.
    pub max_concurrency: usize,
    /// Cadence of the scheduled batch run, in hours.
    pub run_interval_hours: i64,
    pub default_lookback_days: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            run_interval_hours: 24,
            default_lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub noise_margin_default: f64,
    pub noise_margin_shared_infra: f64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            noise_margin_default: 0.05,
            noise_margin_shared_infra: 0.10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub resamples: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self { resamples: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub recommendation_ttl_hours: i64,
    pub expiry_sweep_interval_hours: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            recommendation_ttl_hours: 24,
            expiry_sweep_interval_hours: 24,
        }
    }
}

impl RecommendationConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: RecommendationConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = RecommendationConfig::default();
        assert_eq!(cfg.cold_start.completeness_threshold, 0.90);
        assert_eq!(cfg.cold_start.extended_lookback_days, 90);
        assert_eq!(cfg.graph.dependency_max_depth, 3);
        assert_eq!(cfg.batch.max_concurrency, 20);
        assert_eq!(cfg.bootstrap.resamples, 1000);
        assert_eq!(cfg.lifecycle.recommendation_ttl_hours, 24);
        assert_eq!(cfg.graph.staleness_threshold_hours, 168);
        assert_eq!(cfg.graph.cycle_detection_interval_hours, 24);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = RecommendationConfig::load("/nonexistent/path/slo.toml").unwrap();
        assert_eq!(cfg.batch.max_concurrency, 20);
    }
}
