//! Shared reqwest helpers.

use std::time::Duration;

use cf_core::{Error, Result};

/// Longest response body kept in a diagnostic.
const MAX_BODY_CHARS: usize = 2_048;

/// Build a client with a default per-request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("clipforge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest send failure onto the transport error class.
pub fn transport(context: &str, err: reqwest::Error) -> Error {
    let detail = if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    Error::Transport(format!("{context}: {detail}"))
}

/// Read a response body for diagnostics, truncated.
pub async fn body_text(resp: reqwest::Response) -> String {
    match resp.text().await {
        Ok(text) if text.chars().count() > MAX_BODY_CHARS => {
            let mut truncated: String = text.chars().take(MAX_BODY_CHARS).collect();
            truncated.push_str("...");
            truncated
        }
        Ok(text) => text,
        Err(e) => format!("<unreadable body: {e}>"),
    }
}
