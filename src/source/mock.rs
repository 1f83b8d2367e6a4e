//! Mock source adapter for testing
//!
//! Scripted per-ticker outcomes plus call counting, so fallback-order
//! and attempt-log behavior can be asserted without any network.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::traits::{FetchRequest, RawPayload, SourceAdapter, SourceError, SourceKind, SourceResult};
use crate::schema::Dialect;

/// Mock adapter with scripted responses.
///
/// Impersonates any `SourceKind` so a test chain can look like the real
/// one (`[stooq, yahoo, manual_drop]`). Unscripted tickers fail with
/// `NotFound`.
pub struct MockAdapter {
    kind: SourceKind,
    dialect: Dialect,
    responses: Mutex<HashMap<String, SourceResult<Vec<u8>>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockAdapter {
    /// Create a mock impersonating the given source.
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            dialect: Dialect::Stooq,
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Set the dialect declared on successful payloads.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Script a successful CSV body for a ticker.
    pub fn succeed_for(self, ticker: &str, csv: &str) -> Self {
        self.responses
            .lock()
            .insert(ticker.to_string(), Ok(csv.as_bytes().to_vec()));
        self
    }

    /// Script a failure for a ticker.
    pub fn fail_for(self, ticker: &str, error: SourceError) -> Self {
        self.responses.lock().insert(ticker.to_string(), Err(error));
        self
    }

    /// How many times `fetch` ran for a ticker.
    pub fn calls_for(&self, ticker: &str) -> u32 {
        self.calls.lock().get(ticker).copied().unwrap_or(0)
    }

    /// How many times `fetch` ran in total.
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        _shutdown: broadcast::Receiver<()>,
    ) -> SourceResult<RawPayload> {
        let ticker = request.ticker.as_str().to_string();
        *self.calls.lock().entry(ticker.clone()).or_insert(0) += 1;

        match self.responses.lock().get(&ticker) {
            Some(Ok(bytes)) => Ok(RawPayload::new(self.kind, self.dialect, bytes.clone())),
            Some(Err(error)) => Err(error.clone()),
            None => Err(SourceError::NotFound(ticker)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{DateRange, TickerSymbol};
    use chrono::NaiveDate;

    fn request(ticker: &str) -> FetchRequest {
        FetchRequest::new(
            TickerSymbol::parse(ticker).unwrap(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn scripted_outcomes_and_call_counts() {
        let adapter = MockAdapter::new(SourceKind::Stooq)
            .succeed_for("BBCA.JK", "Date,Open,High,Low,Close,Volume\n2024-01-02,1,2,0.5,1,10\n")
            .fail_for("GOTO.JK", SourceError::RateLimited("scripted".into()));
        let (tx, _rx) = broadcast::channel::<()>(1);

        let ok = adapter.fetch(&request("BBCA.JK"), tx.subscribe()).await;
        assert!(ok.is_ok());
        assert_eq!(ok.unwrap().source, SourceKind::Stooq);

        let limited = adapter.fetch(&request("GOTO.JK"), tx.subscribe()).await;
        assert!(matches!(limited, Err(SourceError::RateLimited(_))));

        let missing = adapter.fetch(&request("TLKM.JK"), tx.subscribe()).await;
        assert!(matches!(missing, Err(SourceError::NotFound(_))));

        assert_eq!(adapter.calls_for("BBCA.JK"), 1);
        assert_eq!(adapter.calls_for("GOTO.JK"), 1);
        assert_eq!(adapter.total_calls(), 3);
    }
}
