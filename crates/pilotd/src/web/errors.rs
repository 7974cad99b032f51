use axum::extract::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// An RFC7807 "problem detail" object.
#[derive(Debug, Serialize)]
pub struct ProblemDetail {
    #[serde(rename = "type")]
    ptype: String,
    title: String,
    detail: String,
    status: u16,
}

impl ProblemDetail {
    pub fn internal_server_error(detail: &str) -> (StatusCode, Json<Self>) {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal-server-error",
            "Something went badly wrong, check the logs.",
            detail.to_owned(),
        )
    }

    pub fn chaos_injected() -> (StatusCode, Json<Self>) {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "chaos-injected",
            "Chaos injected.",
            "This is an intentional crash for testing.".to_owned(),
        )
    }

    pub fn service_degraded() -> (StatusCode, Json<Self>) {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "service-degraded",
            "The service is degraded.",
            "Degraded chaos mode is active, health checks fail at random.".to_owned(),
        )
    }

    pub fn unknown_mode(mode: &str) -> (StatusCode, Json<Self>) {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unknown-mode",
            "The given chaos mode does not exist.",
            format!("Unknown mode '{mode}', use 'immediate', 'degraded', or 'reset'."),
        )
    }

    fn new(status: StatusCode, ptype: &str, title: &str, detail: String) -> (StatusCode, Json<Self>) {
        let pd = Self {
            ptype: ptype.to_owned(),
            title: title.to_owned(),
            detail,
            status: status.as_u16(),
        };

        (status, Json(pd))
    }
}
