pub mod chaos;
pub mod errors;

use axum::extract::{Json, MatchedPath, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::Rng;
use std::net::Ipv4Addr;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use chaoslib::util;

use crate::metrics::Metrics;
use crate::web::errors::ProblemDetail;

/// Exit code to use if the server fails to start
pub static EXIT_FAILURE: i32 = 1;

pub static APPLICATION_NAME: &str = "The Resilience Pilot";

pub static APPLICATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Metrics label for requests which matched no route, so that arbitrary
/// paths do not each get their own series.
pub static UNMATCHED_ENDPOINT: &str = "unmatched";

/// Whether `/health` is currently failing on purpose.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChaosMode {
    pub enabled: bool,
    /// Chance, in `[0, 1]`, that a health check fails.
    pub probability: f64,
}

#[derive(Clone)]
pub struct AppState {
    pub started: Instant,
    pub chaos: Arc<RwLock<ChaosMode>>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            started: Instant::now(),
            chaos: Arc::new(RwLock::new(ChaosMode::default())),
            metrics: Metrics::new()?,
        })
    }
}

pub async fn serve(address: Ipv4Addr, port: u16) {
    let state = match AppState::new() {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(?error, "could not create metrics, terminating...");
            process::exit(EXIT_FAILURE);
        }
    };

    if let Err(error) = run(state, address, port).await {
        tracing::error!(?error, "could not serve application, terminating...");
        process::exit(EXIT_FAILURE);
    }
}

async fn run(state: AppState, address: Ipv4Addr, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((address, port)).await?;
    tracing::info!(%address, port, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(chaoslib::wait_for_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/simulate-crash", post(chaos::simulate_crash))
        .layer(middleware::from_fn_with_state(state.clone(), instrument))
        .with_state(state)
}

///////////////////////////////////////////////////////////////////////////////

/// Application information.
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "application": APPLICATION_NAME,
        "version": APPLICATION_VERSION,
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "chaos": "/simulate-crash",
        },
    }))
}

/// Liveness and readiness check.  Fails at random in degraded mode.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started.elapsed();
    state.metrics.set_uptime(uptime);

    let chaos = *state.chaos.read().await;
    if chaos.enabled && rand::thread_rng().gen::<f64>() < chaos.probability {
        tracing::warn!(probability = chaos.probability, "failing health check");
        return ProblemDetail::service_degraded().into_response();
    }

    let uptime_secs = (uptime.as_secs_f64() * 100.0).round() / 100.0;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "uptime": uptime_secs,
            "uptime_formatted": util::format_duration(uptime),
            "chaos_mode": chaos.enabled,
        })),
    )
        .into_response()
}

/// Prometheus scrape target.
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_uptime(state.started.elapsed());

    match state.metrics.export() {
        Ok(text) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(error) => {
            tracing::error!(?error, "could not export metrics");
            ProblemDetail::internal_server_error(&error.to_string()).into_response()
        }
    }
}

/// Count and time every request.
async fn instrument(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ENDPOINT, MatchedPath::as_str)
        .to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    state
        .metrics
        .observe_request(&method, &endpoint, status, start.elapsed());
    tracing::info!(%method, %endpoint, status, "handled request");

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Method;
    use serde_json::Value;
    use tower::ServiceExt;

    pub async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let app = router(AppState::new().unwrap());
        let (status, body) = call(&app, Method::GET, "/").await;

        assert_eq!(StatusCode::OK, status);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(APPLICATION_NAME, json["application"]);
        assert_eq!("/simulate-crash", json["endpoints"]["chaos"]);
    }

    #[tokio::test]
    async fn health_is_healthy_by_default() {
        let app = router(AppState::new().unwrap());
        let (status, body) = call(&app, Method::GET, "/health").await;

        assert_eq!(StatusCode::OK, status);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!("healthy", json["status"]);
        assert_eq!("0s", json["uptime_formatted"]);
        assert_eq!(false, json["chaos_mode"]);
    }

    #[tokio::test]
    async fn health_fails_under_certain_chaos() {
        let state = AppState::new().unwrap();
        *state.chaos.write().await = ChaosMode {
            enabled: true,
            probability: 1.0,
        };
        let app = router(state);
        let (status, body) = call(&app, Method::GET, "/health").await;

        assert_eq!(StatusCode::SERVICE_UNAVAILABLE, status);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!("service-degraded", json["type"]);
        assert_eq!(503, json["status"]);
    }

    #[tokio::test]
    async fn health_survives_impossible_chaos() {
        let state = AppState::new().unwrap();
        *state.chaos.write().await = ChaosMode {
            enabled: true,
            probability: 0.0,
        };
        let app = router(state);

        for _ in 0..10 {
            let (status, body) = call(&app, Method::GET, "/health").await;
            assert_eq!(StatusCode::OK, status);
            let json: Value = serde_json::from_str(&body).unwrap();
            assert_eq!(true, json["chaos_mode"]);
        }
    }

    #[tokio::test]
    async fn requests_show_up_in_metrics() {
        let app = router(AppState::new().unwrap());
        call(&app, Method::GET, "/health").await;
        call(&app, Method::GET, "/health").await;
        call(&app, Method::GET, "/nope").await;
        call(&app, Method::GET, "/nope/again").await;
        let (status, body) = call(&app, Method::GET, "/metrics").await;

        assert_eq!(StatusCode::OK, status);
        assert!(body.contains(
            r#"http_requests_total{endpoint="/health",method="GET",status="200"} 2"#
        ));
        assert!(body.contains(
            r#"http_requests_total{endpoint="unmatched",method="GET",status="404"} 2"#
        ));
        assert!(body.contains("http_request_duration_seconds_bucket"));
        assert!(body.contains("app_uptime_seconds"));
        assert!(!body.contains("/nope"));
    }
}
