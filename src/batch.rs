//! Batch Orchestrator (C10): computes recommendations for every known
//! service on a schedule, bounded to a fixed number of concurrent pipeline
//! runs. Iterates all services, runs the per-service pipeline, and reports
//! a success/failure summary without letting one service's error abort the
//! run.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::EngineError;
use crate::graph_store::GraphStore;
use crate::pipeline::{PipelineOrchestrator, SliSelector};

const LIST_SERVICES_PAGE_CAP: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub business_id: String,
    pub error_message: String,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total_services: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub duration_seconds: f64,
    pub failures: Vec<BatchFailure>,
}

pub struct BatchOrchestrator {
    pipeline: Arc<PipelineOrchestrator>,
    graph: Arc<GraphStore>,
    max_concurrency: usize,
}

impl BatchOrchestrator {
    pub fn new(pipeline: Arc<PipelineOrchestrator>, graph: Arc<GraphStore>, max_concurrency: usize) -> Self {
        Self { pipeline, graph, max_concurrency }
    }

    /// Runs the full batch over every eligible service.
    /// `sli_type_filter` and `lookback_days` are forwarded to each
    /// per-service pipeline invocation; when `exclude_discovered_only` is
    /// set, auto-discovered services (never manually registered, never
    /// carrying their own telemetry contract) are counted as skipped rather
    /// than scored. Every service gets its own seeded pipeline invocation
    /// (seed derived from the business id, so re-running the batch over
    /// unchanged telemetry reproduces the same bootstrap CIs); one
    /// service's failure doesn't stop the others.
    pub async fn run(
        &self,
        sli_type_filter: SliSelector,
        lookback_days: u32,
        exclude_discovered_only: bool,
    ) -> Result<BatchResult, EngineError> {
        let started = Instant::now();
        let all_services = self.graph.list_services(0, LIST_SERVICES_PAGE_CAP)?;

        let (eligible, skipped_count) = if exclude_discovered_only {
            let mut eligible = Vec::with_capacity(all_services.len());
            let mut skipped = 0usize;
            for service in all_services {
                if service.discovered {
                    skipped += 1;
                } else {
                    eligible.push(service);
                }
            }
            (eligible, skipped)
        } else {
            (all_services, 0usize)
        };

        let total_services = eligible.len() + skipped_count;
        tracing::info!(total_services, skipped_count, "starting batch recommendation run");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for service in eligible {
            let semaphore = semaphore.clone();
            let pipeline = self.pipeline.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let seed = deterministic_seed(&service.business_id);
                let outcome = pipeline
                    .generate(&service.business_id, sli_type_filter, false, lookback_days, Some(seed))
                    .await;
                (service.business_id, outcome)
            });
        }

        let mut successful_count = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((business_id, Ok(recs))) => {
                    tracing::info!(service_id = business_id.as_str(), count = recs.len(), "recommendations generated");
                    successful_count += 1;
                }
                Ok((business_id, Err(e))) => {
                    tracing::warn!(service_id = business_id.as_str(), error = %e, "batch pipeline failed for service");
                    failures.push(BatchFailure { business_id, error_message: e.to_string() });
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "batch task panicked");
                    failures.push(BatchFailure {
                        business_id: "<unknown>".to_string(),
                        error_message: join_err.to_string(),
                    });
                }
            }
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            total_services,
            successful_count,
            failed_count = failures.len(),
            skipped_count,
            duration_seconds,
            "batch recommendation run completed"
        );

        Ok(BatchResult {
            total_services,
            successful_count,
            failed_count: failures.len(),
            skipped_count,
            duration_seconds,
            failures,
        })
    }
}

fn deterministic_seed(business_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    business_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecommendationConfig;
    use crate::models::{Criticality, ServiceType, ServiceUpsert};
    use crate::repository::RecommendationRepository;
    use crate::telemetry::mock::SeededMockTelemetryPort;
    use crate::telemetry::TelemetryPort;
    use std::sync::Arc as StdArc;

    fn orchestrator() -> (BatchOrchestrator, StdArc<GraphStore>) {
        orchestrator_with_telemetry(StdArc::new(SeededMockTelemetryPort::new()))
    }

    fn orchestrator_with_telemetry(telemetry: StdArc<dyn TelemetryPort>) -> (BatchOrchestrator, StdArc<GraphStore>) {
        let graph = StdArc::new(GraphStore::open_in_memory().unwrap());
        let repository = StdArc::new(RecommendationRepository::open_in_memory().unwrap());
        let pipeline = StdArc::new(PipelineOrchestrator::new(
            graph.clone(),
            repository,
            telemetry,
            RecommendationConfig::default(),
        ));
        (BatchOrchestrator::new(pipeline, graph.clone(), 20), graph)
    }

    fn register(graph: &GraphStore, business_id: &str, discovered: bool) {
        graph
            .upsert_services(&[ServiceUpsert {
                business_id: business_id.to_string(),
                criticality: Criticality::Medium,
                owning_team: None,
                service_type: ServiceType::Internal,
                published_sla: None,
                metadata: Default::default(),
                discovered,
            }])
            .unwrap();
    }

    #[tokio::test]
    async fn runs_every_registered_service_and_reports_success() {
        let (batch, graph) = orchestrator();
        register(&graph, "auth-service", false);
        register(&graph, "payment-service", false);

        let result = batch.run(SliSelector::All, 30, true).await.unwrap();
        assert_eq!(result.total_services, 2);
        assert_eq!(result.successful_count, 2);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.skipped_count, 0);
    }

    #[tokio::test]
    async fn excludes_discovered_only_services_when_requested() {
        let (batch, graph) = orchestrator();
        register(&graph, "auth-service", false);
        register(&graph, "shadow-service", true);

        let result = batch.run(SliSelector::All, 30, true).await.unwrap();
        assert_eq!(result.total_services, 2);
        assert_eq!(result.successful_count, 1);
        assert_eq!(result.skipped_count, 1);
    }

    #[tokio::test]
    async fn one_failing_service_does_not_abort_the_batch() {
        let telemetry: StdArc<dyn TelemetryPort> =
            StdArc::new(SeededMockTelemetryPort::new().with_failure("payment-service"));
        let (batch, graph) = orchestrator_with_telemetry(telemetry);
        register(&graph, "auth-service", false);
        register(&graph, "payment-service", false);
        register(&graph, "notification-service", false);

        let result = batch.run(SliSelector::All, 30, true).await.unwrap();
        assert_eq!(result.total_services, 3);
        assert_eq!(result.successful_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.skipped_count, 0);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].business_id, "payment-service");
    }
}
