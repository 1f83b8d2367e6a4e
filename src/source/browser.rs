//! Browser-automation adapter
//!
//! Last-resort scraper for when the download endpoints are blocked:
//! drives a WebDriver-compatible headless browser (chromedriver) over
//! its HTTP wire protocol, loads the Yahoo Finance history page, and
//! extracts the quote table as CSV.
//!
//! The browser session is an exclusive, stateful resource. All tickers
//! fetched through this adapter are serialized behind one lock, and the
//! remote session is deleted on every exit path, including cancellation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use super::http::map_transport_error;
use super::traits::{FetchRequest, RawPayload, SourceAdapter, SourceError, SourceKind, SourceResult};
use crate::schema::Dialect;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Script run inside the page to turn the history table into CSV.
/// Quotes and thousands separators are stripped from the cells; the
/// header row is emitted first so the payload parses like a download.
const EXTRACT_TABLE_SCRIPT: &str = r#"
const table = document.querySelector('table[data-testid="history-table"], table');
if (!table) { return ''; }
const rows = [];
for (const tr of table.querySelectorAll('tr')) {
    const cells = [...tr.querySelectorAll('th,td')].map(
        c => c.textContent.trim().replace(/,/g, '').replace(/"/g, '')
    );
    if (cells.length > 1) { rows.push(cells.join(',')); }
}
return rows.join('\n');
"#;

/// WebDriver-protocol browser adapter
pub struct BrowserAdapter {
    client: reqwest::Client,
    /// chromedriver / geckodriver endpoint, e.g. `http://localhost:9515`
    webdriver_url: String,
    /// History-page template; `{ticker}` is substituted
    page_template: String,
    timeout: Duration,
    /// Serializes all tickers through the single automation session
    session_lock: Mutex<()>,
}

impl BrowserAdapter {
    pub fn new(webdriver_url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            webdriver_url: webdriver_url.into(),
            page_template: "https://finance.yahoo.com/quote/{ticker}/history".to_string(),
            timeout,
            session_lock: Mutex::new(()),
        })
    }

    pub fn with_defaults(webdriver_url: impl Into<String>) -> SourceResult<Self> {
        Self::new(webdriver_url, DEFAULT_TIMEOUT)
    }

    fn page_url(&self, request: &FetchRequest) -> String {
        self.page_template
            .replace("{ticker}", request.ticker.as_str())
    }

    async fn post(&self, path: &str, body: Value) -> SourceResult<Value> {
        let url = format!("{}{}", self.webdriver_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "webdriver {path} answered HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("webdriver {path}: {e}")))
    }

    /// Start a headless session and return its id.
    async fn create_session(&self) -> SourceResult<String> {
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--headless=new", "--no-sandbox", "--disable-dev-shm-usage"]
                    }
                }
            }
        });

        let response = self.post("/session", body).await?;
        response["value"]["sessionId"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                SourceError::Unavailable("webdriver did not return a session id".to_string())
            })
    }

    /// Tear the session down. Failures are logged, never propagated:
    /// teardown must not mask the fetch outcome.
    async fn delete_session(&self, session_id: &str) {
        let url = format!("{}/session/{}", self.webdriver_url, session_id);
        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(session_id, "browser session closed");
            }
            Ok(response) => {
                warn!(session_id, status = %response.status(), "browser session teardown failed");
            }
            Err(error) => {
                warn!(session_id, %error, "browser session teardown failed");
            }
        }
    }

    async fn scrape(&self, session_id: &str, request: &FetchRequest) -> SourceResult<Vec<u8>> {
        let ticker = request.ticker.as_str();
        let page = self.page_url(request);
        debug!(%ticker, %page, "navigating browser session");

        self.post(
            &format!("/session/{session_id}/url"),
            json!({ "url": page }),
        )
        .await?;

        // The history table renders client-side; give it a moment.
        tokio::time::sleep(Duration::from_secs(3)).await;

        let response = self
            .post(
                &format!("/session/{session_id}/execute/sync"),
                json!({ "script": EXTRACT_TABLE_SCRIPT, "args": [] }),
            )
            .await?;

        let csv = response["value"].as_str().unwrap_or_default();
        if csv.lines().filter(|l| !l.trim().is_empty()).count() < 2 {
            return Err(SourceError::NoData(format!(
                "{ticker}: history table was empty or missing"
            )));
        }

        Ok(csv.as_bytes().to_vec())
    }
}

#[async_trait]
impl SourceAdapter for BrowserAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Browser
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SourceResult<RawPayload> {
        // One ticker at a time through the automation session.
        let _exclusive = self.session_lock.lock().await;

        let session_id = tokio::select! {
            result = self.create_session() => result?,
            _ = shutdown.recv() => return Err(SourceError::Cancelled),
        };

        let outcome = tokio::select! {
            result = self.scrape(&session_id, request) => result,
            _ = shutdown.recv() => Err(SourceError::Cancelled),
        };

        // Teardown runs on success, failure, and cancellation alike.
        self.delete_session(&session_id).await;

        let bytes = outcome?;
        Ok(RawPayload::new(SourceKind::Browser, Dialect::Yahoo, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{DateRange, TickerSymbol};
    use chrono::NaiveDate;

    #[test]
    fn substitutes_ticker_into_page_url() {
        let adapter = BrowserAdapter::with_defaults("http://localhost:9515").unwrap();
        let request = FetchRequest::new(
            TickerSymbol::parse("BUMI.JK").unwrap(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap(),
        );

        assert_eq!(
            adapter.page_url(&request),
            "https://finance.yahoo.com/quote/BUMI.JK/history"
        );
    }

    #[tokio::test]
    async fn unreachable_webdriver_is_unavailable() {
        // Port 9 (discard) is never a webdriver.
        let adapter =
            BrowserAdapter::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let request = FetchRequest::new(
            TickerSymbol::parse("BUMI.JK").unwrap(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap(),
        );
        let (_tx, rx) = broadcast::channel(1);

        let result = adapter.fetch(&request, rx).await;
        assert!(matches!(
            result,
            Err(SourceError::Unavailable(_) | SourceError::Timeout(_))
        ));
    }
}
