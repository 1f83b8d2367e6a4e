//! Yahoo Finance direct-download adapter
//!
//! Uses the CSV download endpoint behind the "Download" button on the
//! quote history page, not the JSON API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::sync::broadcast;
use tracing::debug;

use super::http::{build_client, map_status, map_transport_error, require_rows};
use super::traits::{FetchRequest, RawPayload, SourceAdapter, SourceError, SourceKind, SourceResult};
use crate::schema::Dialect;

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/download";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Yahoo Finance CSV download adapter
pub struct YahooAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl YahooAdapter {
    pub fn new(timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: YAHOO_BASE_URL.to_string(),
            timeout,
        })
    }

    pub fn with_defaults() -> SourceResult<Self> {
        Self::new(DEFAULT_TIMEOUT)
    }

    /// Unix-timestamp window: start-of-day on the first date through
    /// end-of-day on the last (the endpoint treats `period2` as
    /// exclusive).
    fn period_params(request: &FetchRequest) -> (i64, i64) {
        let midnight = NaiveTime::MIN;
        let start = request.range.start.and_time(midnight).and_utc().timestamp();
        let end = request
            .range
            .end
            .succ_opt()
            .unwrap_or(request.range.end)
            .and_time(midnight)
            .and_utc()
            .timestamp();
        (start, end)
    }

    fn request_url(&self, request: &FetchRequest) -> String {
        let (period1, period2) = Self::period_params(request);
        format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=history&includeAdjustedClose=true",
            self.base_url,
            request.ticker.as_str(),
            period1,
            period2,
        )
    }

    async fn download(&self, request: &FetchRequest) -> SourceResult<Vec<u8>> {
        let url = self.request_url(request);
        let ticker = request.ticker.as_str();
        debug!(%ticker, %url, "requesting yahoo daily data");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(map_status(response.status(), ticker));
        }

        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;
        require_rows(&body, ticker)?;

        Ok(body.into_bytes())
    }
}

#[async_trait]
impl SourceAdapter for YahooAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Yahoo
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SourceResult<RawPayload> {
        let bytes = tokio::select! {
            result = self.download(request) => result?,
            _ = shutdown.recv() => return Err(SourceError::Cancelled),
        };

        Ok(RawPayload::new(SourceKind::Yahoo, Dialect::Yahoo, bytes))
    }
}
