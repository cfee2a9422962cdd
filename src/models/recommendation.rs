use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliType {
    Availability,
    Latency,
}

impl SliType {
    pub fn metric_name(&self) -> &'static str {
        match self {
            SliType::Availability => "error_rate",
            SliType::Latency => "p99_response_time_ms",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierLevel {
    Conservative,
    Balanced,
    Aggressive,
}

pub const TIER_LEVELS: [TierLevel; 3] =
    [TierLevel::Conservative, TierLevel::Balanced, TierLevel::Aggressive];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Active,
    Superseded,
    Expired,
}

/// One tier of a recommendation. `target` is a percentage for
/// availability, milliseconds for latency; `percentile`/`target_ms` are only
/// populated for latency tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationTier {
    pub level: TierLevel,
    pub target: f64,
    pub error_budget_monthly_minutes: Option<f64>,
    pub breach_probability: f64,
    pub confidence_interval: Option<(f64, f64)>,
    pub percentile: Option<&'static str>,
    pub target_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub feature: String,
    pub contribution: f64,
    pub description: String,
}

/// Optional dependency-impact block, only populated for availability
/// recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyImpact {
    pub composite_bound: f64,
    pub bottleneck_description: String,
    pub hard_sync_dependency_count: usize,
    pub soft_or_degraded_count: usize,
    pub per_dependency_contributions: HashMap<Uuid, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,
    pub attributions: Vec<FeatureAttribution>,
    pub dependency_impact: Option<DependencyImpact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQuality {
    pub completeness: f64,
    pub gaps: Vec<String>,
    pub confidence_note: String,
    pub cold_start: bool,
    pub actual_lookback_days: u32,
}

/// A generated recommendation. At most one `Active` row exists
/// per `(service_internal_id, sli_type)` at any quiescent moment — enforced
/// by the repository's supersede-then-save transaction (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloRecommendation {
    pub id: Uuid,
    pub service_internal_id: Uuid,
    pub sli_type: SliType,
    pub metric_name: String,
    pub tiers: HashMap<TierLevel, RecommendationTier>,
    pub explanation: Explanation,
    pub data_quality: DataQuality,
    pub lookback_start: DateTime<Utc>,
    pub lookback_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: RecommendationStatus,
}

impl SloRecommendation {
    pub fn new(
        service_internal_id: Uuid,
        sli_type: SliType,
        tiers: HashMap<TierLevel, RecommendationTier>,
        explanation: Explanation,
        data_quality: DataQuality,
        lookback_start: DateTime<Utc>,
        lookback_end: DateTime<Utc>,
        ttl_hours: i64,
    ) -> Self {
        let generated_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service_internal_id,
            sli_type,
            metric_name: sli_type.metric_name().to_string(),
            tiers,
            explanation,
            data_quality,
            lookback_start,
            lookback_end,
            generated_at,
            expires_at: generated_at + Duration::hours(ttl_hours),
            status: RecommendationStatus::Active,
        }
    }
}
