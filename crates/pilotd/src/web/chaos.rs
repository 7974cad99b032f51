use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::web::errors::ProblemDetail;
use crate::web::{AppState, ChaosMode};

#[derive(Debug, Deserialize)]
pub struct CrashParams {
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_probability")]
    probability: f64,
}

fn default_mode() -> String {
    "immediate".to_owned()
}

fn default_probability() -> f64 {
    1.0
}

/// Break the service on request:
///
/// - `immediate` fails this request with a 500.
/// - `degraded` makes `/health` fail with the given probability.
/// - `reset` makes `/health` reliable again.
pub async fn simulate_crash(
    State(state): State<AppState>,
    Query(params): Query<CrashParams>,
) -> impl IntoResponse {
    match params.mode.as_str() {
        "immediate" => {
            tracing::warn!("injecting immediate crash");
            ProblemDetail::chaos_injected().into_response()
        }
        "degraded" => {
            let probability = params.probability.clamp(0.0, 1.0);
            *state.chaos.write().await = ChaosMode {
                enabled: true,
                probability,
            };
            tracing::warn!(probability, "enabled degraded mode");

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "chaos_enabled",
                    "mode": "degraded",
                    "failure_probability": probability,
                    "message": format!("Health endpoint will fail {}% of the time", probability * 100.0),
                })),
            )
                .into_response()
        }
        "reset" => {
            *state.chaos.write().await = ChaosMode::default();
            tracing::info!("disabled chaos mode");

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "chaos_disabled",
                    "message": "Service restored to healthy state",
                })),
            )
                .into_response()
        }
        other => ProblemDetail::unknown_mode(other).into_response(),
    }
}
