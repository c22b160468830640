use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::core::{BreathingMonitor, MonitorStats};
use crate::state::{RateEstimate, RateStatus};
use crate::telemetry::{self, MetricEvent, TelemetrySnapshot};

use super::metrics::render_prometheus_metrics;
use super::sse;

/// Handler state: the monitor under inspection plus the access token.
#[derive(Clone)]
pub struct DebugHttpState {
    monitor: Arc<BreathingMonitor>,
    token: Arc<str>,
}

impl DebugHttpState {
    pub fn new(monitor: Arc<BreathingMonitor>, token: impl Into<Arc<str>>) -> Self {
        Self {
            monitor,
            token: token.into(),
        }
    }

    fn authorize(&self, headers: &HeaderMap, query: &TokenQuery) -> Result<(), HttpServerError> {
        match extract_token(headers, query.token.as_deref()) {
            Some(provided) if provided == *self.token => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
    Internal(String),
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token".to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `degraded` once any diagnostic error is in the telemetry history
    pub status: &'static str,
    pub running: bool,
    pub generation: u64,
    pub uptime_ms: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub rate_bpm: f64,
    pub status: RateStatus,
    pub estimate: RateEstimate,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub monitor: MonitorStats,
    pub diagnostics: TelemetrySnapshot,
}

pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rate", get(rate))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        .route("/rate-stream", get(rate_stream))
        .route("/control/reset", post(control_reset))
        .with_state(state)
}

pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding debug HTTP listener on {addr}"))?;
    axum::serve(listener, build_router(state))
        .await
        .context("serving debug HTTP router")
}

pub async fn health(
    State(state): State<DebugHttpState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<HealthResponse>, HttpServerError> {
    state.authorize(&headers, &query)?;

    let last_error = telemetry::hub()
        .snapshot()
        .recent
        .iter()
        .rev()
        .find_map(|event| match event {
            MetricEvent::Error { code, context } => Some(format!("{code:?}: {context}")),
            _ => None,
        });
    let stats = state.monitor.stats();

    Ok(Json(HealthResponse {
        status: if last_error.is_none() { "ok" } else { "degraded" },
        running: stats.running,
        generation: stats.generation,
        uptime_ms: stats.uptime_ms,
        last_error,
    }))
}

pub async fn rate(
    State(state): State<DebugHttpState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<RateResponse>, HttpServerError> {
    state.authorize(&headers, &query)?;

    let estimate = state.monitor.latest_estimate();
    Ok(Json(RateResponse {
        rate_bpm: estimate.rate_bpm,
        status: estimate.status,
        estimate,
    }))
}

pub async fn stats(
    State(state): State<DebugHttpState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, HttpServerError> {
    state.authorize(&headers, &query)?;

    Ok(Json(StatsResponse {
        monitor: state.monitor.stats(),
        diagnostics: telemetry::hub().snapshot(),
    }))
}

pub async fn metrics(
    State(state): State<DebugHttpState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Response<Body>, HttpServerError> {
    state.authorize(&headers, &query)?;

    let body = render_prometheus_metrics(
        &state.monitor.stats(),
        &state.monitor.latest_estimate(),
        &telemetry::hub().snapshot(),
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        )
        .body(Body::from(body))
        .map_err(|err| HttpServerError::Internal(err.to_string()))
}

pub async fn rate_stream(
    State(state): State<DebugHttpState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<sse::EstimateStream, HttpServerError> {
    state.authorize(&headers, &query)?;
    Ok(sse::estimates(&state.monitor))
}

pub async fn control_reset(
    State(state): State<DebugHttpState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<RateEstimate>, HttpServerError> {
    state.authorize(&headers, &query)?;

    state.monitor.reset();
    Ok(Json(state.monitor.latest_estimate()))
}

/// Token from `?token=`, then `x-debug-token`, then a Bearer authorization header.
fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    static DEBUG_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-debug-token");

    if let Some(token) = query_token {
        return Some(token.to_string());
    }
    let header = |name: &HeaderName| headers.get(name).and_then(|value| value.to_str().ok());

    header(&DEBUG_TOKEN_HEADER)
        .map(str::to_string)
        .or_else(|| {
            header(&AUTHORIZATION)
                .and_then(|raw| raw.strip_prefix("Bearer "))
                .map(str::to_string)
        })
}

#[cfg(all(test, feature = "debug_http"))]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const TOKEN: &str = "smoke-token";

    fn router_for(monitor: Arc<BreathingMonitor>) -> Router {
        build_router(DebugHttpState::new(monitor, TOKEN))
    }

    async fn send(
        router: Router,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, String) {
        let mut request = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn get_json(uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let router = router_for(Arc::new(BreathingMonitor::new()));
        let (status, body) = send(router, "GET", uri, headers).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    #[tokio::test]
    async fn health_requires_token() {
        let (status, json) = get_json("/health", &[]).await;

        println!("[HTTP Smoke] /health (no token) => {json}");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "missing or invalid token");
    }

    #[tokio::test]
    async fn health_reports_idle_monitor() {
        let (status, json) = get_json(&format!("/health?token={TOKEN}"), &[]).await;

        println!("[HTTP Smoke] /health => {json}");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["running"], false);
        assert!(json["status"] == "ok" || json["status"] == "degraded");
    }

    #[tokio::test]
    async fn rate_accepts_bearer_token() {
        let bearer = format!("Bearer {TOKEN}");
        let (status, json) = get_json("/rate", &[("authorization", bearer.as_str())]).await;

        println!("[HTTP Smoke] /rate => {json}");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "no_data");
        assert_eq!(json["rate_bpm"], 0.0);
    }

    #[tokio::test]
    async fn stats_accepts_header_token() {
        let (status, json) = get_json("/stats", &[("x-debug-token", TOKEN)]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["monitor"]["frames_received"], 0);
        assert!(json["diagnostics"]["recent"].is_array());
    }

    #[tokio::test]
    async fn metrics_are_prometheus_text() {
        let router = router_for(Arc::new(BreathingMonitor::new()));
        let (status, body) = send(router, "GET", &format!("/metrics?token={TOKEN}"), &[]).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE breathing_rate_bpm gauge"));
        assert!(body.contains("breathing_running 0"));
    }

    #[tokio::test]
    async fn control_reset_bumps_generation() {
        let monitor = Arc::new(BreathingMonitor::new());
        let before = monitor.stats().generation;
        let router = router_for(Arc::clone(&monitor));

        let (status, body) =
            send(router, "POST", &format!("/control/reset?token={TOKEN}"), &[]).await;
        let json: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "no_data");
        assert_eq!(monitor.stats().generation, before + 1);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let (status, _) = get_json("/rate?token=nope", &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
