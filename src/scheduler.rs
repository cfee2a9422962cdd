//! Background scheduling loops: three independent `tokio::spawn` tickers,
//! each repeatedly `interval.tick().await`-ing and logging failures without
//! ever stopping the loop.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::batch::BatchOrchestrator;
use crate::graph_store::GraphStore;
use crate::pipeline::SliSelector;
use crate::repository::RecommendationRepository;

/// Runs the batch orchestrator every `interval_hours`, scoring both SLI
/// types over `lookback_days` and skipping auto-discovered-only services.
pub fn spawn_batch_scheduler(batch: Arc<BatchOrchestrator>, interval_hours: i64, lookback_days: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_hours.max(1) as u64 * 3600));
        loop {
            interval.tick().await;
            match batch.run(SliSelector::All, lookback_days, true).await {
                Ok(result) => tracing::info!(
                    total = result.total_services,
                    successful = result.successful_count,
                    failed = result.failed_count,
                    skipped = result.skipped_count,
                    duration_seconds = result.duration_seconds,
                    "scheduled batch run completed"
                ),
                Err(e) => tracing::error!(error = %e, "batch scheduler run failed"),
            }
        }
    });
}

/// Marks dependency edges stale past the configured threshold, every
/// `interval_hours`.
pub fn spawn_staleness_sweeper(graph: Arc<GraphStore>, threshold_hours: i64, interval_hours: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_hours.max(1) as u64 * 3600));
        loop {
            interval.tick().await;
            match graph.mark_stale(threshold_hours) {
                Ok(count) if count > 0 => tracing::info!(count, "staleness sweep marked edges stale"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "staleness sweep failed"),
            }
        }
    });
}

/// Transitions `Active` recommendations past their TTL to `Expired`, every
/// `interval_hours`.
pub fn spawn_expiry_sweeper(repository: Arc<RecommendationRepository>, interval_hours: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_hours.max(1) as u64 * 3600));
        loop {
            interval.tick().await;
            match repository.expire_stale() {
                Ok(count) if count > 0 => tracing::info!(count, "expiry sweep transitioned recommendations"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
            }
        }
    });
}

/// Runs the cycle detector (C2) over the live graph and records an open
/// alert per distinct cycle found, every `interval_hours`.
pub fn spawn_cycle_detection_sweeper(graph: Arc<GraphStore>, interval_hours: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_hours.max(1) as u64 * 3600));
        loop {
            interval.tick().await;
            match graph.detect_and_record_cycles() {
                Ok(alerts) if !alerts.is_empty() => {
                    tracing::warn!(count = alerts.len(), "cycle detection sweep recorded circular dependency alerts")
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "cycle detection sweep failed"),
            }
        }
    });
}
