//! Pipeline Orchestrator (C9): the per-service recommendation pipeline.
//! Wires the graph store (C1), telemetry port (C3), composite availability
//! (C4), tier calculators (C5/C6), attribution (C7), and repository (C8)
//! into a single twelve-step sequence: resolve the lookback window, fetch
//! telemetry, compose dependency-bound availability, compute tiers, attribute
//! drivers, and persist, plus a cached-active-recommendation short-circuit
//! that `force=true` bypasses.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::attribution::compute_attribution;
use crate::composite::{compute_composite_bound, DependencyAvailability};
use crate::config::RecommendationConfig;
use crate::error::EngineError;
use crate::graph_store::{GraphStore, TraversalDirection};
use crate::models::{
    DataQuality, DependencyCriticality, DependencyImpact, Explanation, RecommendationTier, SliType,
    SloRecommendation, TierLevel,
};
use crate::repository::RecommendationRepository;
use crate::telemetry::TelemetryPort;
use crate::tiers::availability::AvailabilityTierCalculator;
use crate::tiers::latency::LatencyTierCalculator;

/// Availability assumed for a hard dependency this pipeline couldn't query
/// telemetry for.
const DEFAULT_DEPENDENCY_AVAILABILITY: f64 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliSelector {
    All,
    Availability,
    Latency,
}

impl SliSelector {
    fn includes(self, sli_type: SliType) -> bool {
        match (self, sli_type) {
            (SliSelector::All, _) => true,
            (SliSelector::Availability, SliType::Availability) => true,
            (SliSelector::Latency, SliType::Latency) => true,
            _ => false,
        }
    }
}

pub struct PipelineOrchestrator {
    graph: Arc<GraphStore>,
    repository: Arc<RecommendationRepository>,
    telemetry: Arc<dyn TelemetryPort>,
    config: RecommendationConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        graph: Arc<GraphStore>,
        repository: Arc<RecommendationRepository>,
        telemetry: Arc<dyn TelemetryPort>,
        config: RecommendationConfig,
    ) -> Self {
        Self { graph, repository, telemetry, config }
    }

    /// Generates (or returns cached) recommendations for `business_id`.
    /// `requested_lookback_days` must fall in `[7,365]`; `seed` pins the
    /// bootstrap RNG for reproducible output, e.g. in batch runs keyed by
    /// service id.
    pub async fn generate(
        &self,
        business_id: &str,
        selector: SliSelector,
        force: bool,
        requested_lookback_days: u32,
        seed: Option<u64>,
    ) -> Result<Vec<SloRecommendation>, EngineError> {
        if !(7..=365).contains(&requested_lookback_days) {
            return Err(EngineError::invalid(format!(
                "lookback_days must be in [7,365], got {requested_lookback_days}"
            )));
        }

        let service = self
            .graph
            .get_service(business_id)?
            .ok_or_else(|| EngineError::NotFound(format!("service '{business_id}' not found")))?;

        let (lookback_days, cold_start) =
            self.determine_lookback_window(business_id, requested_lookback_days).await?;
        let window_end = Utc::now();
        let window_start = window_end - Duration::days(lookback_days as i64);

        let mut results = Vec::new();

        if selector.includes(SliType::Availability) {
            if let Some(cached) = self.cached_active(service.internal_id, SliType::Availability, force)? {
                results.push(cached);
            } else if let Some(rec) = self
                .generate_availability(&service, business_id, lookback_days, cold_start, window_start, window_end, seed)
                .await?
            {
                self.repository.save(&rec)?;
                results.push(rec);
            } else {
                tracing::warn!(service_id = business_id, "no availability telemetry, skipping");
            }
        }

        if selector.includes(SliType::Latency) {
            if let Some(cached) = self.cached_active(service.internal_id, SliType::Latency, force)? {
                results.push(cached);
            } else if let Some(rec) = self
                .generate_latency(&service, business_id, lookback_days, cold_start, window_start, window_end, seed)
                .await?
            {
                self.repository.save(&rec)?;
                results.push(rec);
            } else {
                tracing::warn!(service_id = business_id, "no latency telemetry, skipping");
            }
        }

        Ok(results)
    }

    fn cached_active(
        &self,
        service_internal_id: Uuid,
        sli_type: SliType,
        force: bool,
    ) -> Result<Option<SloRecommendation>, EngineError> {
        if force {
            return Ok(None);
        }
        let Some(active) = self.repository.get_active(service_internal_id, sli_type)? else {
            return Ok(None);
        };
        if active.expires_at > Utc::now() {
            Ok(Some(active))
        } else {
            Ok(None)
        }
    }

    /// Data completeness at the requested lookback; if it's below threshold,
    /// falls back to the extended lookback window.
    async fn determine_lookback_window(&self, business_id: &str, requested: u32) -> Result<(u32, bool), EngineError> {
        let completeness = self.telemetry.data_completeness(business_id, requested).await?;
        if completeness >= self.config.cold_start.completeness_threshold {
            return Ok((requested, false));
        }
        tracing::warn!(
            service_id = business_id,
            completeness,
            "insufficient data completeness, extending lookback"
        );
        Ok((self.config.cold_start.extended_lookback_days, true))
    }

    async fn generate_availability(
        &self,
        service: &crate::models::Service,
        business_id: &str,
        lookback_days: u32,
        cold_start: bool,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        seed: Option<u64>,
    ) -> Result<Option<SloRecommendation>, EngineError> {
        let Some(avail_sli) = self.telemetry.availability_sli(business_id, lookback_days).await? else {
            return Ok(None);
        };

        let mut rolling_avail = self.telemetry.rolling_availability(business_id, lookback_days, 24).await?;
        if rolling_avail.is_empty() {
            rolling_avail.push(avail_sli.ratio());
        }

        let (nodes, edges) = self.graph.traverse(
            business_id,
            TraversalDirection::Downstream,
            self.config.graph.dependency_max_depth,
            false,
        )?;

        let hard_deps: Vec<_> = edges
            .iter()
            .filter(|e| e.criticality == DependencyCriticality::Hard && e.communication_mode == crate::models::CommunicationMode::Sync)
            .collect();
        let soft_dep_count = edges
            .iter()
            .filter(|e| matches!(e.criticality, DependencyCriticality::Soft | DependencyCriticality::Degraded))
            .count();

        let mut dep_availabilities = Vec::with_capacity(hard_deps.len());
        for dep in &hard_deps {
            let Some(target) = nodes.iter().find(|n| n.internal_id == dep.target_id) else {
                continue;
            };
            let dep_availability = match self.telemetry.availability_sli(&target.business_id, lookback_days).await? {
                Some(sli) => sli.ratio(),
                None => DEFAULT_DEPENDENCY_AVAILABILITY,
            };
            dep_availabilities.push(DependencyAvailability {
                service_id: target.internal_id,
                service_name: target.business_id.clone(),
                availability: dep_availability,
                is_hard: true,
                is_redundant_group: false,
            });
        }

        let composite_result = compute_composite_bound(avail_sli.ratio(), &dep_availabilities)?;

        let calculator = AvailabilityTierCalculator::new(self.config.bootstrap.resamples);
        let tiers = calculator.compute_tiers(&rolling_avail, composite_result.composite_bound, seed)?;
        let balanced_target = tiers[&TierLevel::Balanced].target;

        let external_api_reliability = dep_availabilities
            .iter()
            .map(|d| d.availability)
            .min_by(f64::total_cmp)
            .unwrap_or(1.0);
        let mut feature_values = HashMap::new();
        feature_values.insert("historical_availability_mean".to_string(), avail_sli.ratio());
        feature_values.insert("downstream_dependency_risk".to_string(), 1.0 - composite_result.composite_bound);
        feature_values.insert("external_api_reliability".to_string(), external_api_reliability);
        feature_values.insert("deployment_frequency".to_string(), 0.5);
        let attributions = compute_attribution(SliType::Availability, &feature_values)?;

        let summary = availability_summary(
            business_id,
            avail_sli.ratio(),
            balanced_target,
            composite_result.composite_bound,
            hard_deps.len(),
            lookback_days,
        );

        let explanation = Explanation {
            summary,
            attributions,
            dependency_impact: Some(DependencyImpact {
                composite_bound: composite_result.composite_bound,
                bottleneck_description: composite_result.bottleneck_description,
                hard_sync_dependency_count: hard_deps.len(),
                soft_or_degraded_count: soft_dep_count,
                per_dependency_contributions: composite_result.per_dependency_contributions,
            }),
        };

        let completeness = self.telemetry.data_completeness(business_id, lookback_days).await?;
        let data_quality = DataQuality {
            completeness,
            gaps: Vec::new(),
            confidence_note: confidence_note(completeness, cold_start, lookback_days),
            cold_start,
            actual_lookback_days: lookback_days,
        };

        Ok(Some(SloRecommendation::new(
            service.internal_id,
            SliType::Availability,
            tiers,
            explanation,
            data_quality,
            window_start,
            window_end,
            self.config.lifecycle.recommendation_ttl_hours,
        )))
    }

    async fn generate_latency(
        &self,
        service: &crate::models::Service,
        business_id: &str,
        lookback_days: u32,
        cold_start: bool,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        seed: Option<u64>,
    ) -> Result<Option<SloRecommendation>, EngineError> {
        let Some(latency_sli) = self.telemetry.latency_sli(business_id, lookback_days).await? else {
            return Ok(None);
        };

        let calculator = LatencyTierCalculator::new(
            self.config.latency.noise_margin_default,
            self.config.latency.noise_margin_shared_infra,
            self.config.bootstrap.resamples,
        );
        let tiers_list = calculator.compute_tiers(&[latency_sli], false, seed)?;
        let balanced_target_ms = tiers_list
            .iter()
            .find(|t| t.level == TierLevel::Balanced)
            .and_then(|t| t.target_ms)
            .unwrap_or(0);
        let tiers: HashMap<TierLevel, RecommendationTier> =
            tiers_list.into_iter().map(|t| (t.level, t)).collect();

        let mut feature_values = HashMap::new();
        feature_values.insert("p99_latency_historical".to_string(), latency_sli.p99_ms);
        feature_values.insert("call_chain_depth".to_string(), 3.0);
        feature_values.insert("noisy_neighbor_margin".to_string(), 0.05);
        feature_values.insert("traffic_seasonality".to_string(), 0.5);
        let attributions = compute_attribution(SliType::Latency, &feature_values)?;

        let summary = latency_summary(business_id, latency_sli.p99_ms, balanced_target_ms, lookback_days);

        let explanation = Explanation { summary, attributions, dependency_impact: None };

        let completeness = self.telemetry.data_completeness(business_id, lookback_days).await?;
        let data_quality = DataQuality {
            completeness,
            gaps: Vec::new(),
            confidence_note: confidence_note(completeness, cold_start, lookback_days),
            cold_start,
            actual_lookback_days: lookback_days,
        };

        Ok(Some(SloRecommendation::new(
            service.internal_id,
            SliType::Latency,
            tiers,
            explanation,
            data_quality,
            window_start,
            window_end,
            self.config.lifecycle.recommendation_ttl_hours,
        )))
    }
}

fn availability_summary(
    business_id: &str,
    actual_availability: f64,
    balanced_target: f64,
    composite_bound: f64,
    hard_dep_count: usize,
    lookback_days: u32,
) -> String {
    let margin = (actual_availability * 100.0) - balanced_target;
    let mut summary = format!(
        "{business_id} achieved {:.2}% availability over {lookback_days} days. The Balanced target of \
         {balanced_target:.1}% provides a {:.2}% {}.",
        actual_availability * 100.0,
        margin.abs(),
        if margin > 0.0 { "margin" } else { "deficit" }
    );
    if hard_dep_count > 0 {
        summary.push_str(&format!(
            " Composite availability bound is {:.2}% given {hard_dep_count} hard {}.",
            composite_bound * 100.0,
            if hard_dep_count == 1 { "dependency" } else { "dependencies" }
        ));
    }
    summary
}

fn latency_summary(business_id: &str, p99_latency: f64, balanced_target_ms: i64, lookback_days: u32) -> String {
    let headroom_pct = ((balanced_target_ms as f64 - p99_latency) / p99_latency) * 100.0;
    format!(
        "{business_id}: end-to-end p99 latency measured at {p99_latency:.0}ms over {lookback_days} days. \
         Balanced target of {balanced_target_ms}ms provides {:.1}% headroom.",
        headroom_pct.abs()
    )
}

fn confidence_note(completeness: f64, cold_start: bool, lookback_days: u32) -> String {
    if cold_start {
        format!("Extended lookback to {lookback_days} days due to sparse data. Data completeness: {:.0}%.", completeness * 100.0)
    } else {
        format!("Standard {lookback_days}-day lookback. Data completeness: {:.0}%.", completeness * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Criticality, ServiceType, ServiceUpsert};
    use crate::telemetry::mock::SeededMockTelemetryPort;

    fn orchestrator() -> PipelineOrchestrator {
        let graph = Arc::new(GraphStore::open_in_memory().unwrap());
        let repository = Arc::new(RecommendationRepository::open_in_memory().unwrap());
        let telemetry: Arc<dyn TelemetryPort> = Arc::new(SeededMockTelemetryPort::new());
        PipelineOrchestrator::new(graph, repository, telemetry, RecommendationConfig::default())
    }

    #[tokio::test]
    async fn generates_both_slis_for_a_known_service() {
        let orchestrator = orchestrator();
        orchestrator
            .graph
            .upsert_services(&[ServiceUpsert {
                business_id: "auth-service".to_string(),
                criticality: Criticality::High,
                owning_team: None,
                service_type: ServiceType::Internal,
                published_sla: None,
                metadata: Default::default(),
                discovered: false,
            }])
            .unwrap();

        let recs = orchestrator.generate("auth-service", SliSelector::All, false, 30, Some(1)).await.unwrap();
        assert_eq!(recs.len(), 2);
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let orchestrator = orchestrator();
        let err = orchestrator.generate("ghost-service", SliSelector::All, false, 30, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_call_returns_cached_recommendation_until_forced() {
        let orchestrator = orchestrator();
        orchestrator
            .graph
            .upsert_services(&[ServiceUpsert {
                business_id: "payment-service".to_string(),
                criticality: Criticality::Critical,
                owning_team: None,
                service_type: ServiceType::Internal,
                published_sla: None,
                metadata: Default::default(),
                discovered: false,
            }])
            .unwrap();

        let first = orchestrator
            .generate("payment-service", SliSelector::Availability, false, 30, Some(1))
            .await
            .unwrap();
        let second = orchestrator
            .generate("payment-service", SliSelector::Availability, false, 30, Some(2))
            .await
            .unwrap();
        assert_eq!(first[0].id, second[0].id);

        let forced = orchestrator
            .generate("payment-service", SliSelector::Availability, true, 30, Some(3))
            .await
            .unwrap();
        assert_ne!(forced[0].id, second[0].id);
    }
}
