pub mod attribution;
pub mod batch;
pub mod composite;
pub mod config;
pub mod cycle_detector;
pub mod error;
pub mod graph_store;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod scheduler;
pub mod telemetry;
pub mod tiers;

use std::sync::Arc;

use batch::BatchOrchestrator;
use config::RecommendationConfig;
use graph_store::GraphStore;
use pipeline::PipelineOrchestrator;
use repository::RecommendationRepository;
use telemetry::TelemetryPort;

/// Shared application state handed to every axum handler: one `Arc` per
/// shared collaborator, cheap to `Clone` per request.
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<GraphStore>,
    pub repository: Arc<RecommendationRepository>,
    pub pipeline: Arc<PipelineOrchestrator>,
    pub batch: Arc<BatchOrchestrator>,
    pub config: Arc<RecommendationConfig>,
}

impl AppState {
    pub fn new(
        graph: Arc<GraphStore>,
        repository: Arc<RecommendationRepository>,
        telemetry: Arc<dyn TelemetryPort>,
        config: RecommendationConfig,
    ) -> Self {
        let config = Arc::new(config);
        let pipeline = Arc::new(PipelineOrchestrator::new(
            graph.clone(),
            repository.clone(),
            telemetry,
            (*config).clone(),
        ));
        let batch = Arc::new(BatchOrchestrator::new(
            pipeline.clone(),
            graph.clone(),
            config.batch.max_concurrency,
        ));
        Self { graph, repository, pipeline, batch, config }
    }
}
