use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, routing::post, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slo_recommender::config::RecommendationConfig;
use slo_recommender::graph_store::GraphStore;
use slo_recommender::handlers;
use slo_recommender::repository::RecommendationRepository;
use slo_recommender::scheduler;
use slo_recommender::telemetry::clickhouse::ClickHouseTelemetryPort;
use slo_recommender::telemetry::mock::SeededMockTelemetryPort;
use slo_recommender::telemetry::TelemetryPort;
use slo_recommender::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("slo_recommender=debug,tower_http=debug")
        }))
        .init();

    let config_path = std::env::var("SLO_CONFIG").unwrap_or_else(|_| "slo_recommender.toml".to_string());
    let config = RecommendationConfig::load(&config_path)?;

    let graph_db_path = std::env::var("SLO_GRAPH_DB").unwrap_or_else(|_| "./slo_graph.db".to_string());
    let graph = Arc::new(GraphStore::open(&graph_db_path)?);
    tracing::info!("graph store opened at {graph_db_path}");

    let reco_db_path = std::env::var("SLO_RECOMMENDATIONS_DB").unwrap_or_else(|_| "./slo_recommendations.db".to_string());
    let repository = Arc::new(RecommendationRepository::open(&reco_db_path)?);
    tracing::info!("recommendation repository opened at {reco_db_path}");

    let telemetry: Arc<dyn TelemetryPort> = if std::env::var("SLO_USE_MOCK_TELEMETRY").is_ok() {
        tracing::warn!("using seeded mock telemetry port; not for production use");
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

    let state = AppState::new(graph.clone(), repository.clone(), telemetry, config.clone());

    scheduler::spawn_batch_scheduler(
        state.batch.clone(),
        config.batch.run_interval_hours,
        config.batch.default_lookback_days,
    );
    scheduler::spawn_staleness_sweeper(
        graph.clone(),
        config.graph.staleness_threshold_hours,
        config.graph.staleness_sweep_interval_hours,
    );
    scheduler::spawn_expiry_sweeper(repository.clone(), config.lifecycle.expiry_sweep_interval_hours);
    scheduler::spawn_cycle_detection_sweeper(graph.clone(), config.graph.cycle_detection_interval_hours);

    let app = Router::new()
        // Graph (C1)
        .route(
            "/api/v1/services",
            get(handlers::services::list_services).post(handlers::services::upsert_services),
        )
        .route("/api/v1/services/{business_id}", get(handlers::services::get_service))
        .route("/api/v1/services/{business_id}/graph", get(handlers::services::service_graph))
        .route("/api/v1/dependencies", post(handlers::services::upsert_edges))
        // Circular dependency alerts
        .route("/api/v1/alerts", get(handlers::services::list_alerts))
        .route("/api/v1/alerts/{id}/acknowledge", post(handlers::services::acknowledge_alert))
        .route("/api/v1/alerts/{id}/resolve", post(handlers::services::resolve_alert))
        // Recommendations (C8/C9/C10)
        .route("/api/v1/recommendations/generate", post(handlers::recommendations::generate))
        .route("/api/v1/recommendations/batch", post(handlers::recommendations::run_batch))
        .route(
            "/api/v1/recommendations/{service_business_id}",
            get(handlers::recommendations::get_active),
        )
        // Health
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("slo-recommender listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
