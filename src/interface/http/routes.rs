use std::path::Path;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::interface::ws::ws_handler;

use super::handlers::{
    containers_handler, drives_handler, health_handler, metric_handler, metric_history_handler,
    network_handler, ports_handler, resources_handler, services_handler, snapshot_handler,
    system_info_handler, AppState,
};

pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // API routes
        .route("/api/system/info", get(system_info_handler))
        .route("/api/system/resources", get(resources_handler))
        .route("/api/docker/containers", get(containers_handler))
        .route("/api/network/interfaces", get(network_handler))
        .route("/api/storage/drives", get(drives_handler))
        .route("/api/services", get(services_handler))
        .route("/api/ports", get(ports_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/metrics/{kind}", get(metric_handler))
        .route("/api/metrics/{kind}/history", get(metric_history_handler))
        // Streaming
        .route("/ws", get(ws_handler))
        // Built dashboard
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::store::InMemoryMetricsRepository;
    use crate::application::{
        Broadcaster, ConnectionLimits, ConnectionTracker, MessageRateLimiter, MonitoringService,
        RateLimit,
    };
    use crate::domain::{CpuMetrics, MemoryMetrics};
    use crate::interface::ws::WsSettings;
    use crate::ports::MetricStore;

    fn app() -> (Router, Arc<InMemoryMetricsRepository>) {
        let store = Arc::new(InMemoryMetricsRepository::new(10));
        let state = AppState {
            monitoring_service: Arc::new(MonitoringService::new(store.clone(), Broadcaster::new())),
            ws: Arc::new(WsSettings {
                tracker: Arc::new(ConnectionTracker::new(ConnectionLimits::default())),
                rate_limiter: Arc::new(MessageRateLimiter::new(RateLimit::default())),
                max_message_size: 1024,
                max_payload: 1024 * 1024,
                trust_proxy: false,
            }),
        };
        (create_router(state, Path::new("frontend-dist")), store)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app();
        let (status, body) = get_json(router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["liveSubscriberCount"], 0);
    }

    #[tokio::test]
    async fn test_absent_values_before_first_sample() {
        let (router, _) = app();

        let (_, info) = get_json(router.clone(), "/api/system/info").await;
        assert!(info.is_null());

        let (_, containers) = get_json(router.clone(), "/api/docker/containers").await;
        assert_eq!(containers, serde_json::json!([]));

        let (_, snapshot) = get_json(router, "/api/snapshot").await;
        assert!(snapshot["cpu"].is_null());
        assert_eq!(snapshot["ports"], serde_json::json!([]));
        assert_eq!(snapshot["networkHistory"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_resources_include_history() {
        let (router, store) = app();
        store.set_cpu(CpuMetrics::new(12.5, 4, 2, "Test CPU", 2.4));
        store.set_memory(MemoryMetrics::from_bytes(1 << 30, 4 << 30, 3 << 30));

        let (status, body) = get_json(router, "/api/system/resources").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cpu"]["usage"], 12.5);
        assert_eq!(body["memory"]["usage"], 25.0);
        assert_eq!(body["cpuHistory"][0]["data"], 12.5);
    }

    #[tokio::test]
    async fn test_generic_metric_routes() {
        let (router, store) = app();
        store.set_cpu(CpuMetrics::new(50.0, 4, 2, "Test CPU", 2.4));

        let (status, body) = get_json(router.clone(), "/api/metrics/cpu").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cores"], 4);

        let (status, body) = get_json(router.clone(), "/api/metrics/cpu/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = get_json(router.clone(), "/api/metrics/memory").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());

        let (status, _) = get_json(router.clone(), "/api/metrics/gpu").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get_json(router, "/api/metrics/docker/history").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("docker"));
    }
}
