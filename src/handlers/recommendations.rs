//! Thin axum surface over the pipeline (C9) and batch (C10) orchestrators:
//! request validation, status-code mapping, and JSON (de)serialization only,
//! no auth, no rate limiting, no RFC-7807 envelope.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{status_code, EngineError};
use crate::models::{DataQuality, Explanation, RecommendationTier, SliType, SloRecommendation, TierLevel};
use crate::pipeline::SliSelector;
use crate::AppState;

fn map_err(e: EngineError) -> (StatusCode, String) {
    (status_code(&e), e.to_string())
}

fn parse_sli_type_filter(raw: &str) -> Result<SliSelector, (StatusCode, String)> {
    match raw {
        "availability" => Ok(SliSelector::Availability),
        "latency" => Ok(SliSelector::Latency),
        "all" => Ok(SliSelector::All),
        other => Err((StatusCode::BAD_REQUEST, format!("invalid sli_type '{other}'"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub service_business_id: String,
    #[serde(default = "default_sli_type")]
    pub sli_type: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default)]
    pub force_regenerate: bool,
}

fn default_sli_type() -> String {
    "all".to_string()
}

fn default_lookback_days() -> u32 {
    30
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub service_business_id: String,
    pub generated_at: DateTime<Utc>,
    pub lookback_window: LookbackWindow,
    pub recommendations: Vec<RecommendationDto>,
}

#[derive(Debug, Serialize)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationDto {
    pub sli_type: SliType,
    pub metric: String,
    pub tiers: TiersDto,
    pub explanation: Explanation,
    pub data_quality: DataQuality,
}

#[derive(Debug, Serialize)]
pub struct TiersDto {
    pub conservative: Option<RecommendationTier>,
    pub balanced: Option<RecommendationTier>,
    pub aggressive: Option<RecommendationTier>,
}

fn to_dto(rec: SloRecommendation) -> RecommendationDto {
    let mut tiers = rec.tiers;
    RecommendationDto {
        sli_type: rec.sli_type,
        metric: rec.metric_name,
        tiers: TiersDto {
            conservative: tiers.remove(&TierLevel::Conservative),
            balanced: tiers.remove(&TierLevel::Balanced),
            aggressive: tiers.remove(&TierLevel::Aggressive),
        },
        explanation: rec.explanation,
        data_quality: rec.data_quality,
    }
}

/// `POST /api/v1/recommendations/generate`. Runs the pipeline
/// (or returns the cached active recommendation unless `force_regenerate`).
pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let selector = parse_sli_type_filter(&req.sli_type)?;
    let window_end = Utc::now();
    let recs = state
        .pipeline
        .generate(&req.service_business_id, selector, req.force_regenerate, req.lookback_days, None)
        .await
        .map_err(map_err)?;

    let window_start = recs
        .first()
        .map(|r| r.lookback_start)
        .unwrap_or(window_end - chrono::Duration::days(req.lookback_days as i64));

    let response = GenerateResponse {
        service_business_id: req.service_business_id,
        generated_at: window_end,
        lookback_window: LookbackWindow { start: window_start, end: window_end },
        recommendations: recs.into_iter().map(to_dto).collect(),
    };
    Ok(Json(response))
}

/// `GET /api/v1/recommendations/{service_business_id}`: a pure
/// cached-retrieval read, never invoking the pipeline. Returns whichever
/// active, non-expired recommendations already exist for the service.
pub async fn get_active(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = state
        .graph
        .get_service(&business_id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("service '{business_id}' not found")))?;

    let now = Utc::now();
    let mut recs = Vec::new();
    for sli_type in [SliType::Availability, SliType::Latency] {
        if let Some(rec) = state.repository.get_active(service.internal_id, sli_type).map_err(map_err)? {
            if rec.expires_at > now {
                recs.push(rec);
            }
        }
    }

    let response = GenerateResponse {
        service_business_id: business_id,
        generated_at: now,
        lookback_window: LookbackWindow {
            start: recs.first().map(|r| r.lookback_start).unwrap_or(now),
            end: recs.first().map(|r| r.lookback_end).unwrap_or(now),
        },
        recommendations: recs.into_iter().map(to_dto).collect(),
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default = "default_sli_type")]
    pub sli_type: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_true")]
    pub exclude_discovered_only: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_seconds: f64,
    pub failures: Vec<BatchFailureDto>,
}

#[derive(Debug, Serialize)]
pub struct BatchFailureDto {
    pub service_business_id: String,
    pub error: String,
}

/// `POST /api/v1/recommendations/batch`: triggers one batch
/// run on demand, in addition to the scheduled background tick.
pub async fn run_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let selector = parse_sli_type_filter(&req.sli_type)?;
    let result = state
        .batch
        .run(selector, req.lookback_days, req.exclude_discovered_only)
        .await
        .map_err(map_err)?;

    Ok(Json(BatchSummary {
        total: result.total_services,
        successful: result.successful_count,
        failed: result.failed_count,
        skipped: result.skipped_count,
        duration_seconds: result.duration_seconds,
        failures: result
            .failures
            .into_iter()
            .map(|f| BatchFailureDto { service_business_id: f.business_id, error: f.error_message })
            .collect(),
    }))
}
