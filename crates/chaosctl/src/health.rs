use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;

/// GET the health endpoint.  `Ok` holds a description of a healthy
/// response, `Err` a description of what was wrong.
pub async fn check(url: &Url, timeout: Duration) -> Result<String, String> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| format!("could not build HTTP client: {error}"))?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|error| format!("could not reach {url}: {error}"))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| format!("could not read response from {url}: {error}"))?;

    tracing::info!(%url, %status, "checked health endpoint");
    judge(status, &body)
}

///////////////////////////////////////////////////////////////////////////////

/// A healthy response is a 200 whose JSON body has `"status": "healthy"`.
fn judge(status: StatusCode, body: &str) -> Result<String, String> {
    if status != StatusCode::OK {
        return Err(format!("got {status}"));
    }

    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return Err("response is not JSON".to_owned());
    };

    match json.get("status").and_then(Value::as_str) {
        Some("healthy") => match json.get("uptime_formatted").and_then(Value::as_str) {
            Some(uptime) => Ok(format!("healthy, up {uptime}")),
            None => Ok("healthy".to_owned()),
        },
        Some(other) => Err(format!("reports status '{other}'")),
        None => Err("response has no status".to_owned()),
    }
}
