use crate::collectors::{collect_stats, CollectError, GpuCapability, HostProbe};
use crate::state::{HealthStatus, StatsSnapshot};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct HttpAppState {
    pub host: Arc<dyn HostProbe>,
    pub gpu: GpuCapability,
    pub disk_path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Hard collection failure, returned as `500 {"detail": ...}`.
#[derive(Debug)]
pub struct ApiError(CollectError);

impl From<CollectError> for ApiError {
    fn from(err: CollectError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "ошибка сбора метрик");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn build_router(state: HttpAppState) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        // Mirrors origin, methods and headers; "*" cannot be combined with credentials.
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthStatus::healthy())
}

async fn stats_handler(
    State(state): State<HttpAppState>,
) -> Result<Json<StatsSnapshot>, ApiError> {
    let snapshot = tokio::task::spawn_blocking(move || {
        collect_stats(state.host.as_ref(), &state.gpu, &state.disk_path)
    })
    .await
    .map_err(|err| CollectError::Task(err.to_string()))??;
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{FakeGpu, FakeHost};
    use crate::collectors::{SensorError, SensorGroup};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(host: FakeHost, gpu: GpuCapability) -> Router {
        build_router(HttpAppState {
            host: Arc::new(host),
            gpu,
            disk_path: Arc::new(PathBuf::from("/")),
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_returns_healthy() {
        let app = app(FakeHost::default(), GpuCapability::unavailable());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), br#"{"status":"healthy"}"#);
    }

    #[tokio::test]
    async fn stats_returns_rounded_snapshot() {
        let (status, body) =
            get_json(app(FakeHost::default(), GpuCapability::unavailable()), "/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cpu_usage"], 42.4);
        assert_eq!(body["memory_usage"], 67.9);
        assert_eq!(body["disk_usage"], 55.0);
        // cumulative megabytes, not a rate
        assert_eq!(body["network_speed"], 3.0);
        for key in ["cpu_usage", "memory_usage", "disk_usage"] {
            let v = body[key].as_f64().unwrap();
            assert!((0.0..=100.0).contains(&v), "{key} out of range: {v}");
        }
    }

    #[tokio::test]
    async fn stats_keeps_null_fields_in_shape() {
        let (_, body) =
            get_json(app(FakeHost::default(), GpuCapability::unavailable()), "/stats").await;
        let obj = body.as_object().unwrap();
        for key in [
            "cpu_temp",
            "gpu_temp",
            "gpu_utilization",
            "gpu_memory_utilization",
        ] {
            assert!(obj.contains_key(key), "{key} missing");
            assert!(obj[key].is_null(), "{key} should be null");
        }
    }

    #[tokio::test]
    async fn stats_reports_coretemp_mean() {
        let host = FakeHost {
            sensors: Ok(vec![SensorGroup {
                name: "coretemp".to_string(),
                readings: vec![45.123, 47.877],
            }]),
            ..FakeHost::default()
        };
        let (_, body) = get_json(app(host, GpuCapability::unavailable()), "/stats").await;
        assert_eq!(body["cpu_temp"], 46.5);
    }

    #[tokio::test]
    async fn stats_reports_gpu_when_available() {
        let gpu = GpuCapability::available(Arc::new(FakeGpu::default()), 0);
        let (_, body) = get_json(app(FakeHost::default(), gpu), "/stats").await;
        assert_eq!(body["gpu_temp"], 64.3);
        assert_eq!(body["gpu_utilization"], 37.0);
        assert_eq!(body["gpu_memory_utilization"], 37.5);
    }

    #[tokio::test]
    async fn stats_drops_partial_gpu_record() {
        let gpu = GpuCapability::available(Arc::new(FakeGpu::failing_from(1)), 0);
        let (status, body) = get_json(app(FakeHost::default(), gpu), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["gpu_temp"].is_null());
        assert!(body["gpu_utilization"].is_null());
        assert!(body["gpu_memory_utilization"].is_null());
    }

    #[tokio::test]
    async fn stats_disk_failure_returns_500_detail() {
        let host = FakeHost {
            disk: Err("No such file or directory (os error 2)".to_string()),
            sensors: Err(SensorError::Unsupported),
            ..FakeHost::default()
        };
        let (status, body) = get_json(app(host, GpuCapability::unavailable()), "/stats").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let obj = body.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        let detail = obj["detail"].as_str().unwrap();
        assert!(detail.contains("No such file or directory (os error 2)"), "{detail}");
        assert!(detail.contains('/'), "{detail}");
    }

    #[tokio::test]
    async fn cors_mirrors_origin_with_credentials() {
        let app = app(FakeHost::default(), GpuCapability::unavailable());
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/stats")
                    .header(header::ORIGIN, "http://dashboard.local:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-custom")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://dashboard.local:3000"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-custom");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = app(FakeHost::default(), GpuCapability::unavailable());
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
