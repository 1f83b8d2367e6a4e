//! Stooq.com daily-data adapter
//!
//! Stooq serves free historical CSV over a plain GET endpoint. Jakarta
//! tickers use the `.id` country suffix there (`BBCA.JK` -> `bbca.id`).

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::http::{build_client, map_status, map_transport_error, require_rows};
use super::traits::{FetchRequest, RawPayload, SourceAdapter, SourceError, SourceKind, SourceResult};
use crate::schema::Dialect;
use crate::symbol::TickerSymbol;

const STOOQ_BASE_URL: &str = "https://stooq.com/q/d/l/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Stooq CSV download adapter
pub struct StooqAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl StooqAdapter {
    pub fn new(timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: STOOQ_BASE_URL.to_string(),
            timeout,
        })
    }

    pub fn with_defaults() -> SourceResult<Self> {
        Self::new(DEFAULT_TIMEOUT)
    }

    /// Stooq's symbol form: lowercase code with the `.id` country suffix
    /// for Jakarta-listed tickers; other markets keep their own suffix.
    fn stooq_symbol(ticker: &TickerSymbol) -> String {
        if ticker.suffix() == "JK" {
            format!("{}.id", ticker.code().to_lowercase())
        } else {
            ticker.as_str().to_lowercase()
        }
    }

    fn request_url(&self, request: &FetchRequest) -> String {
        format!(
            "{}?s={}&i=d&d1={}&d2={}",
            self.base_url,
            Self::stooq_symbol(&request.ticker),
            request.range.start.format("%Y%m%d"),
            request.range.end.format("%Y%m%d"),
        )
    }

    async fn download(&self, request: &FetchRequest) -> SourceResult<Vec<u8>> {
        let url = self.request_url(request);
        let ticker = request.ticker.as_str();
        debug!(%ticker, %url, "requesting stooq daily data");

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

        // Stooq answers 200 with a plain "No data" body for unknown or
        // delisted symbols.
        if body.trim().eq_ignore_ascii_case("no data") {
            return Err(SourceError::NoData(format!("{ticker}: stooq has no data")));
        }
        require_rows(&body, ticker)?;

        Ok(body.into_bytes())
    }
}

#[async_trait]
impl SourceAdapter for StooqAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Stooq
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

        Ok(RawPayload::new(SourceKind::Stooq, Dialect::Stooq, bytes))
    }
}
