//! Source adapter trait definitions
//!
//! Each external source (Stooq, Yahoo, Alpha Vantage, the browser
//! scraper, the manual-drop directory) implements the single `fetch`
//! capability and emits the same payload shape: raw bytes plus a
//! declared dialect hint.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::{ErrorCategory, ErrorClassification};
use crate::schema::Dialect;
use crate::symbol::{DateRange, TickerSymbol};

/// Source error types
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum SourceError {
    /// Network or HTTP failure reaching the source
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Missing or rejected credential
    #[error("authentication error: {0}")]
    Auth(String),

    /// Quota exceeded at the source or locally
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Request did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The source does not know this ticker
    #[error("ticker not found: {0}")]
    NotFound(String),

    /// Successful response carrying no usable rows
    #[error("no data: {0}")]
    NoData(String),

    /// Payload did not match any known dialect, or required fields were
    /// missing after column mapping
    #[error("parse error: {0}")]
    Parse(String),

    /// The run was cancelled while the call was in flight
    #[error("cancelled")]
    Cancelled,
}

impl ErrorClassification for SourceError {
    fn category(&self) -> ErrorCategory {
        match self {
            SourceError::Unavailable(_) => ErrorCategory::Transient,
            SourceError::Timeout(_) => ErrorCategory::Transient,
            SourceError::RateLimited(_) => ErrorCategory::ResourceExhausted,
            SourceError::Auth(_) => ErrorCategory::Configuration,
            SourceError::NotFound(_) => ErrorCategory::Permanent,
            SourceError::NoData(_) => ErrorCategory::Permanent,
            SourceError::Parse(_) => ErrorCategory::Permanent,
            SourceError::Cancelled => ErrorCategory::Permanent,
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Identity of a configured source, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Stooq,
    Yahoo,
    #[serde(rename = "alphavantage")]
    AlphaVantage,
    Browser,
    ManualDrop,
    Mock,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Stooq => "stooq",
            SourceKind::Yahoo => "yahoo",
            SourceKind::AlphaVantage => "alphavantage",
            SourceKind::Browser => "browser",
            SourceKind::ManualDrop => "manual_drop",
            SourceKind::Mock => "mock",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetch request for one ticker over one date range.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub ticker: TickerSymbol,
    pub range: DateRange,
}

impl FetchRequest {
    pub fn new(ticker: TickerSymbol, range: DateRange) -> Self {
        Self { ticker, range }
    }
}

/// Raw bytes from a source, tagged with origin and dialect hint.
///
/// Producer-owned; consumed exactly once by the normalizer.
#[derive(Debug, Clone)]
pub struct RawPayload {
    /// Which source produced the bytes
    pub source: SourceKind,
    /// The source's declared column convention; `Unknown` means the
    /// normalizer should detect it from the header
    pub dialect: Dialect,
    /// The payload body, typically CSV text
    pub bytes: Vec<u8>,
}

impl RawPayload {
    pub fn new(source: SourceKind, dialect: Dialect, bytes: Vec<u8>) -> Self {
        Self {
            source,
            dialect,
            bytes,
        }
    }
}

/// Base trait for all source adapters
///
/// Side effects are confined to network I/O or local file reads. The
/// shutdown receiver carries the run-wide cancellation signal; in-flight
/// calls must observe it and abort promptly, releasing any exclusive
/// resource they hold.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter talks to
    fn kind(&self) -> SourceKind;

    /// Fetch raw rows for a ticker and date range, or fail with a typed
    /// error. Never panics on bad remote data.
    async fn fetch(
        &self,
        request: &FetchRequest,
        shutdown: broadcast::Receiver<()>,
    ) -> SourceResult<RawPayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(SourceError::Unavailable("down".into()).is_transient());
        assert!(SourceError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(SourceError::RateLimited("quota".into()).is_transient());

        assert!(SourceError::Auth("no key".into()).category() == ErrorCategory::Configuration);
        assert!(!SourceError::Auth("no key".into()).is_transient());
        assert!(SourceError::NotFound("XXXX.JK".into()).is_permanent());
        assert!(SourceError::Parse("bad header".into()).is_permanent());
        assert!(SourceError::NoData("empty body".into()).is_permanent());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(SourceKind::Stooq.as_str(), "stooq");
        assert_eq!(SourceKind::ManualDrop.to_string(), "manual_drop");
    }
}
