//! Shared HTTP plumbing for network adapters

use std::time::Duration;

use reqwest::StatusCode;

use super::traits::SourceError;

/// Browser-like User-Agent. Several of these endpoints reject requests
/// that identify as a programmatic client.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Build the shared client for an adapter with a per-request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {e}")))
}

/// Map a transport-level failure onto the source error taxonomy.
pub fn map_transport_error(error: reqwest::Error, timeout: Duration) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout(timeout)
    } else {
        SourceError::Unavailable(error.to_string())
    }
}

/// Map a non-success HTTP status onto the source error taxonomy.
pub fn map_status(status: StatusCode, ticker: &str) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(ticker.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Auth(format!("HTTP {status} for {ticker}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            SourceError::RateLimited(format!("HTTP 429 for {ticker}"))
        }
        other => SourceError::Unavailable(format!("HTTP {other} for {ticker}")),
    }
}

/// A body that is blank or header-only carries no rows.
pub fn require_rows(body: &str, ticker: &str) -> Result<(), SourceError> {
    let lines = body.lines().filter(|l| !l.trim().is_empty()).count();
    if lines < 2 {
        return Err(SourceError::NoData(format!(
            "{ticker}: response carried {lines} line(s)"
        )));
    }
    Ok(())
}
