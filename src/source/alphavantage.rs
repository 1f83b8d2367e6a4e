//! Alpha Vantage API adapter
//!
//! Free-tier API (5 calls/minute, 500/day) serving daily series as CSV.
//! The endpoint reports most failures as a 200 response with a JSON or
//! prose body instead of an HTTP error, so the body is inspected before
//! it is accepted as a payload.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::http::{build_client, map_status, map_transport_error};
use super::traits::{FetchRequest, RawPayload, SourceAdapter, SourceError, SourceKind, SourceResult};
use crate::schema::Dialect;

const ALPHAVANTAGE_BASE_URL: &str = "https://www.alphavantage.co/query";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Alpha Vantage daily time-series adapter
pub struct AlphaVantageAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl AlphaVantageAdapter {
    pub fn new(api_key: Option<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: ALPHAVANTAGE_BASE_URL.to_string(),
            api_key,
            timeout,
        })
    }

    pub fn with_defaults(api_key: Option<String>) -> SourceResult<Self> {
        Self::new(api_key, DEFAULT_TIMEOUT)
    }

    fn request_url(&self, request: &FetchRequest, api_key: &str) -> String {
        format!(
            "{}?function=TIME_SERIES_DAILY&symbol={}&apikey={}&outputsize=full&datatype=csv",
            self.base_url,
            request.ticker.as_str(),
            api_key,
        )
    }

    /// Classify a 200-status body. CSV starting with a `timestamp`
    /// header is data; everything else is one of the provider's
    /// soft-failure messages.
    fn classify_body(body: &str, ticker: &str) -> SourceResult<()> {
        let lowered = body.to_lowercase();

        if lowered.starts_with("timestamp") {
            if body.lines().filter(|l| !l.trim().is_empty()).count() < 2 {
                return Err(SourceError::NoData(format!(
                    "{ticker}: alphavantage returned a header with no rows"
                )));
            }
            return Ok(());
        }

        if lowered.contains("rate limit") || lowered.contains("call frequency") {
            return Err(SourceError::RateLimited(format!(
                "{ticker}: alphavantage call frequency exceeded"
            )));
        }
        if lowered.contains("apikey") || lowered.contains("api key") {
            return Err(SourceError::Auth(format!(
                "{ticker}: alphavantage rejected the API key"
            )));
        }
        if lowered.contains("premium") {
            return Err(SourceError::Auth(format!(
                "{ticker}: endpoint requires a premium alphavantage tier"
            )));
        }
        if lowered.contains("invalid api call") || lowered.contains("error message") {
            return Err(SourceError::NotFound(ticker.to_string()));
        }

        Err(SourceError::Parse(format!(
            "{ticker}: unrecognized alphavantage response body"
        )))
    }

    async fn download(&self, request: &FetchRequest) -> SourceResult<Vec<u8>> {
        let ticker = request.ticker.as_str();
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::Auth("no alphavantage API key configured".to_string()))?;

        let url = self.request_url(request, api_key);
        debug!(%ticker, "requesting alphavantage daily series");

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
        Self::classify_body(&body, ticker)?;

        Ok(body.into_bytes())
    }
}

#[async_trait]
impl SourceAdapter for AlphaVantageAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::AlphaVantage
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

        Ok(RawPayload::new(
            SourceKind::AlphaVantage,
            Dialect::AlphaVantage,
            bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{DateRange, TickerSymbol};
    use chrono::NaiveDate;

    fn request() -> FetchRequest {
        FetchRequest::new(
            TickerSymbol::parse("TLKM.JK").unwrap(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 28).unwrap(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_api_key_is_an_auth_error() {
        let adapter = AlphaVantageAdapter::with_defaults(None).unwrap();
        let (_tx, rx) = broadcast::channel(1);

        let result = adapter.fetch(&request(), rx).await;
        assert!(matches!(result, Err(SourceError::Auth(_))));
    }

    #[test]
    fn builds_query_url() {
        let adapter = AlphaVantageAdapter::with_defaults(Some("SECRET".into())).unwrap();
        let url = adapter.request_url(&request(), "SECRET");
        assert_eq!(
            url,
            "https://www.alphavantage.co/query?function=TIME_SERIES_DAILY&symbol=TLKM.JK&apikey=SECRET&outputsize=full&datatype=csv"
        );
    }

    #[test]
    fn classifies_soft_failure_bodies() {
        let t = "TLKM.JK";

        let csv = "timestamp,open,high,low,close,volume\n2024-01-02,1,2,0.5,1,10\n";
        assert!(AlphaVantageAdapter::classify_body(csv, t).is_ok());

        let header_only = "timestamp,open,high,low,close,volume\n";
        assert!(matches!(
            AlphaVantageAdapter::classify_body(header_only, t),
            Err(SourceError::NoData(_))
        ));

        let limited = r#"{"Note": "Thank you! Our standard API rate limit is 25 requests per day."}"#;
        assert!(matches!(
            AlphaVantageAdapter::classify_body(limited, t),
            Err(SourceError::RateLimited(_))
        ));

        let bad_key = r#"{"Error Message": "the parameter apikey is invalid or missing"}"#;
        assert!(matches!(
            AlphaVantageAdapter::classify_body(bad_key, t),
            Err(SourceError::Auth(_))
        ));

        let premium = r#"{"Information": "This is a premium endpoint"}"#;
        assert!(matches!(
            AlphaVantageAdapter::classify_body(premium, t),
            Err(SourceError::Auth(_))
        ));

        let unknown_symbol = r#"{"Error Message": "Invalid API call for symbol ZZZZ"}"#;
        assert!(matches!(
            AlphaVantageAdapter::classify_body(unknown_symbol, t),
            Err(SourceError::NotFound(_))
        ));
    }
}
