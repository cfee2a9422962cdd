use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::error::status_code;
use crate::graph_store::TraversalDirection;
use crate::models::{AlertStatus, EdgeUpsert, ServiceUpsert};
use crate::AppState;

fn map_err(e: crate::error::EngineError) -> (StatusCode, String) {
    (status_code(&e), e.to_string())
}

pub async fn upsert_services(
    State(state): State<AppState>,
    Json(batch): Json<Vec<ServiceUpsert>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let services = state.graph.upsert_services(&batch).map_err(map_err)?;
    Ok(Json(serde_json::json!({ "services": services })))
}

#[derive(Debug, Deserialize)]
pub struct ListServicesParams {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

pub async fn list_services(
    State(state): State<AppState>,
    Query(params): Query<ListServicesParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let services = state.graph.list_services(params.skip, params.limit).map_err(map_err)?;
    Ok(Json(serde_json::json!({ "services": services })))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = state
        .graph
        .get_service(&business_id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("service '{business_id}' not found")))?;
    Ok(Json(service))
}

pub async fn upsert_edges(
    State(state): State<AppState>,
    Json(batch): Json<Vec<EdgeUpsert>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let edges = state.graph.upsert_edges(&batch).map_err(map_err)?;
    Ok(Json(serde_json::json!({ "dependencies": edges })))
}

#[derive(Debug, Deserialize)]
pub struct GraphParams {
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub include_stale: bool,
}

fn default_direction() -> String {
    "downstream".to_string()
}

fn default_max_depth() -> u32 {
    3
}

pub async fn service_graph(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Query(params): Query<GraphParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let direction = match params.direction.as_str() {
        "downstream" => TraversalDirection::Downstream,
        "upstream" => TraversalDirection::Upstream,
        "both" => TraversalDirection::Both,
        other => return Err((StatusCode::BAD_REQUEST, format!("invalid direction '{other}'"))),
    };
    let (nodes, edges) = state
        .graph
        .traverse(&business_id, direction, params.max_depth, params.include_stale)
        .map_err(map_err)?;
    Ok(Json(serde_json::json!({ "nodes": nodes, "edges": edges })))
}

#[derive(Debug, Deserialize)]
pub struct ListAlertsParams {
    pub status: Option<String>,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListAlertsParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = match params.status.as_deref() {
        None => None,
        Some("open") => Some(AlertStatus::Open),
        Some("acknowledged") => Some(AlertStatus::Acknowledged),
        Some("resolved") => Some(AlertStatus::Resolved),
        Some(other) => return Err((StatusCode::BAD_REQUEST, format!("invalid status '{other}'"))),
    };
    let alerts = state.graph.list_alerts(status).map_err(map_err)?;
    Ok(Json(serde_json::json!({ "alerts": alerts })))
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeAlertRequest {
    pub acknowledger: String,
}

pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<AcknowledgeAlertRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let alert = state.graph.acknowledge_alert(id, &req.acknowledger).map_err(map_err)?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct ResolveAlertRequest {
    pub resolution_note: String,
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ResolveAlertRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let alert = state.graph.resolve_alert(id, &req.resolution_note).map_err(map_err)?;
    Ok(Json(alert))
}
