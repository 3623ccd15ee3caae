use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::application::monitoring::{HealthReport, NetworkView, ResourcesView};
use crate::application::MonitoringService;
use crate::domain::{
    DockerContainer, ListeningPort, MetricKind, MetricsSnapshot, StorageDrive, SystemInfo,
    SystemService, UnknownMetricKind,
};
use crate::interface::ws::WsSettings;

/// Errors surfaced by the query routes
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    UnknownKind(#[from] UnknownMetricKind),

    #[error("metric kind `{0}` keeps no history")]
    NoHistory(MetricKind),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::UnknownKind(_) | AppError::NoHistory(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitoring_service: Arc<MonitoringService>,
    pub ws: Arc<WsSettings>,
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.monitoring_service.health())
}

/// Handler for GET /api/system/info
pub async fn system_info_handler(State(state): State<AppState>) -> Json<Option<SystemInfo>> {
    Json(state.monitoring_service.system_info())
}

/// Handler for GET /api/system/resources
pub async fn resources_handler(State(state): State<AppState>) -> Json<ResourcesView> {
    Json(state.monitoring_service.resources())
}

/// Handler for GET /api/docker/containers
pub async fn containers_handler(State(state): State<AppState>) -> Json<Vec<DockerContainer>> {
    Json(state.monitoring_service.containers())
}

/// Handler for GET /api/network/interfaces
pub async fn network_handler(State(state): State<AppState>) -> Json<NetworkView> {
    Json(state.monitoring_service.network())
}

/// Handler for GET /api/storage/drives
pub async fn drives_handler(State(state): State<AppState>) -> Json<Vec<StorageDrive>> {
    Json(state.monitoring_service.drives())
}

/// Handler for GET /api/services
pub async fn services_handler(State(state): State<AppState>) -> Json<Vec<SystemService>> {
    Json(state.monitoring_service.services())
}

/// Handler for GET /api/ports
pub async fn ports_handler(State(state): State<AppState>) -> Json<Vec<ListeningPort>> {
    Json(state.monitoring_service.ports())
}

/// Handler for GET /api/snapshot
pub async fn snapshot_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.monitoring_service.snapshot())
}

/// Handler for GET /api/metrics/{kind}
pub async fn metric_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Value>, AppError> {
    let kind: MetricKind = kind.parse()?;
    Ok(Json(state.monitoring_service.current(kind).unwrap_or(Value::Null)))
}

/// Handler for GET /api/metrics/{kind}/history
pub async fn metric_history_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Value>, AppError> {
    let kind: MetricKind = kind.parse()?;
    state
        .monitoring_service
        .history(kind)
        .map(Json)
        .ok_or(AppError::NoHistory(kind))
}
