//! Google REST plumbing shared by the Sheets, Drive and Calendar clients.

pub mod auth;

pub use auth::{ServiceAccount, ServiceAccountKey, StaticToken, TokenSource, http_client};

/// Read the error body of a failed Google API response into a short reason.
pub(crate) async fn failure_reason(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    format!("{status}: {message}")
}
