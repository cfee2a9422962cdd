//! Standalone one-shot batch runner: invokes the batch orchestrator once and
//! exits, for use from an external scheduler (cron, a Kubernetes CronJob)
//! that doesn't want the long-lived HTTP server. The server binary also runs
//! the same batch on its own `tokio::spawn` ticker (`main.rs`); this binary
//! is for ad-hoc or externally-scheduled runs.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use slo_recommender::config::RecommendationConfig;
use slo_recommender::graph_store::GraphStore;
use slo_recommender::pipeline::SliSelector;
use slo_recommender::repository::RecommendationRepository;
use slo_recommender::telemetry::clickhouse::ClickHouseTelemetryPort;
use slo_recommender::telemetry::mock::SeededMockTelemetryPort;
use slo_recommender::telemetry::TelemetryPort;
use slo_recommender::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slo_recommender=info")))
        .init();

    match run().await {
        Ok(failed) if failed == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "batch runner aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<usize> {
    let config_path = std::env::var("SLO_CONFIG").unwrap_or_else(|_| "slo_recommender.toml".to_string());
    let config = RecommendationConfig::load(&config_path)?;

    let graph_db_path = std::env::var("SLO_GRAPH_DB").unwrap_or_else(|_| "./slo_graph.db".to_string());
    let graph = Arc::new(GraphStore::open(&graph_db_path)?);

    let reco_db_path = std::env::var("SLO_RECOMMENDATIONS_DB").unwrap_or_else(|_| "./slo_recommendations.db".to_string());
    let repository = Arc::new(RecommendationRepository::open(&reco_db_path)?);

    let telemetry: Arc<dyn TelemetryPort> = if std::env::var("SLO_USE_MOCK_TELEMETRY").is_ok() {
        Arc::new(SeededMockTelemetryPort::new())
    } else {
        let clickhouse_url =
            std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
        let clickhouse_db =
            std::env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "observability".to_string());
        let clickhouse_user = std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
        let clickhouse_password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();
        let ch = clickhouse::Client::default()
            .with_url(&clickhouse_url)
            .with_database(&clickhouse_db)
            .with_user(&clickhouse_user)
            .with_password(&clickhouse_password);
        Arc::new(ClickHouseTelemetryPort::new(ch))
    };

    let lookback_days = config.batch.default_lookback_days;
    let state = AppState::new(graph, repository, telemetry, config);

    let result = state.batch.run(SliSelector::All, lookback_days, true).await?;

    tracing::info!(
        total = result.total_services,
        successful = result.successful_count,
        failed = result.failed_count,
        skipped = result.skipped_count,
        duration_seconds = result.duration_seconds,
        "batch run finished"
    );
    for failure in &result.failures {
        tracing::warn!(service_id = failure.business_id.as_str(), error = failure.error_message.as_str(), "service failed");
    }

    Ok(result.failed_count)
}
