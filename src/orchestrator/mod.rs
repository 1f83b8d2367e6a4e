//! Fallback acquisition orchestration
//!
//! Drives an ordered chain of rate-limited, retry-wrapped source
//! adapters per ticker until one yields usable data or the chain is
//! exhausted. Distinct tickers run on a bounded worker pool; within one
//! ticker the chain is strictly sequential, because advancing depends
//! on the previous attempt's outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::normalize::SchemaNormalizer;
use crate::schema::CanonicalSeries;
use crate::source::{FetchRequest, SourceAdapter, SourceError, SourceKind};
use crate::symbol::{DateRange, TickerSymbol};
use crate::throttle::{RetryPolicy, SourceLimiter};
use crate::validation::{QualityReport, QualityValidator};

/// One adapter in the fallback chain with its throttling.
///
/// The limiter is shared by every worker fetching through this adapter;
/// the retry policy wraps each individual call.
pub struct ChainEntry {
    pub adapter: Arc<dyn SourceAdapter>,
    pub limiter: Arc<SourceLimiter>,
    pub retry: RetryPolicy,
}

impl ChainEntry {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        limiter: Arc<SourceLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            adapter,
            limiter,
            retry,
        }
    }
}

/// Per-ticker acquisition state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    /// Not yet started
    Pending,
    /// Currently trying the adapter at this chain position
    Trying(usize),
    /// An adapter returned at least one parseable record
    Success { source: SourceKind },
    /// Every configured adapter failed or returned zero records
    Exhausted,
    /// The run was cancelled before a terminal state was reached
    Cancelled,
}

/// Outcome of a single adapter try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    SourceUnavailable,
    AuthError,
    RateLimited,
    Timeout,
    NotFound,
    NoData,
    ParseError,
    Cancelled,
}

impl AttemptOutcome {
    fn from_error(error: &SourceError) -> Self {
        match error {
            SourceError::Unavailable(_) => AttemptOutcome::SourceUnavailable,
            SourceError::Auth(_) => AttemptOutcome::AuthError,
            SourceError::RateLimited(_) => AttemptOutcome::RateLimited,
            SourceError::Timeout(_) => AttemptOutcome::Timeout,
            SourceError::NotFound(_) => AttemptOutcome::NotFound,
            SourceError::NoData(_) => AttemptOutcome::NoData,
            SourceError::Parse(_) => AttemptOutcome::ParseError,
            SourceError::Cancelled => AttemptOutcome::Cancelled,
        }
    }
}

/// Audit record for one adapter try; append-only within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquisitionAttempt {
    pub ticker: String,
    pub source: SourceKind,
    pub outcome: AttemptOutcome,
    pub records: usize,
}

/// Final result for one ticker.
#[derive(Debug)]
pub struct TickerResult {
    pub ticker: TickerSymbol,
    pub state: TickerState,
    pub attempts: Vec<AcquisitionAttempt>,
    pub series: Option<CanonicalSeries>,
    pub report: Option<QualityReport>,
}

impl TickerResult {
    /// The adapter that supplied the data, if any.
    pub fn source(&self) -> Option<SourceKind> {
        match self.state {
            TickerState::Success { source } => Some(source),
            _ => None,
        }
    }
}

/// Everything produced by one orchestrator run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub range: DateRange,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<TickerResult>,
    /// True when the run was cut short by the shutdown signal
    pub interrupted: bool,
}

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Distinct tickers processed in parallel
    pub max_workers: usize,
    /// Longest a single attempt may wait on a rate-limit token
    pub token_wait_limit: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            token_wait_limit: Duration::from_secs(120),
        }
    }
}

/// Handle for signalling cancellation into a running orchestrator.
#[derive(Clone)]
pub struct ShutdownHandle {
    cancelled: Arc<AtomicBool>,
    shutdown: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Signal every in-flight attempt to abort promptly.
    pub fn trigger(&self) {
        // The flag covers attempts that have not subscribed yet; the
        // channel wakes the ones suspended on I/O or backoff. A send
        // with no listeners just means nothing is in flight.
        self.cancelled.store(true, Ordering::Release);
        let _ = self.shutdown.send(());
    }
}

struct Inner {
    chain: Vec<ChainEntry>,
    normalizer: SchemaNormalizer,
    validator: QualityValidator,
    config: OrchestratorConfig,
    cancelled: Arc<AtomicBool>,
    shutdown: broadcast::Sender<()>,
}

/// Drives the fallback chain for a set of tickers.
pub struct FallbackOrchestrator {
    inner: Arc<Inner>,
}

impl FallbackOrchestrator {
    pub fn new(
        chain: Vec<ChainEntry>,
        validator: QualityValidator,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                chain,
                normalizer: SchemaNormalizer::new(),
                validator,
                config,
                cancelled: Arc::new(AtomicBool::new(false)),
                shutdown,
            }),
        }
    }

    /// Handle for external cancellation of the current run.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            cancelled: self.inner.cancelled.clone(),
            shutdown: self.inner.shutdown.clone(),
        }
    }

    /// Acquire, normalize, and validate every ticker.
    ///
    /// Cross-ticker ordering is unspecified; results come back keyed by
    /// ticker in input order. Exhaustion of one ticker never affects
    /// the others.
    pub async fn run(&self, tickers: Vec<TickerSymbol>, range: DateRange) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            tickers = tickers.len(),
            %range,
            workers = self.inner.config.max_workers,
            "starting acquisition run"
        );

        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_workers.max(1)));
        let mut join_set: JoinSet<(usize, TickerResult)> = JoinSet::new();

        for (position, ticker) in tickers.into_iter().enumerate() {
            let inner = self.inner.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => inner.acquire_ticker(ticker, range).await,
                    // The semaphore is never closed while the run is
                    // alive; treat closure as cancellation regardless.
                    Err(_) => TickerResult {
                        ticker,
                        state: TickerState::Cancelled,
                        attempts: Vec::new(),
                        series: None,
                        report: None,
                    },
                };
                (position, result)
            });
        }

        let mut indexed: Vec<(usize, TickerResult)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(join_error) => error!(%join_error, "ticker worker panicked"),
            }
        }
        indexed.sort_by_key(|(position, _)| *position);
        let results: Vec<TickerResult> = indexed.into_iter().map(|(_, r)| r).collect();

        let interrupted = results
            .iter()
            .any(|r| r.state == TickerState::Cancelled);

        let finished_at = Utc::now();
        info!(
            %run_id,
            succeeded = results.iter().filter(|r| r.source().is_some()).count(),
            exhausted = results
                .iter()
                .filter(|r| r.state == TickerState::Exhausted)
                .count(),
            interrupted,
            "acquisition run finished"
        );

        RunOutcome {
            run_id,
            range,
            started_at,
            finished_at,
            results,
            interrupted,
        }
    }
}

impl Inner {
    /// Walk the fallback chain for one ticker: strictly sequential, in
    /// configured priority order, stopping at the first success.
    async fn acquire_ticker(&self, ticker: TickerSymbol, range: DateRange) -> TickerResult {
        let request = FetchRequest::new(ticker.clone(), range);
        let mut attempts: Vec<AcquisitionAttempt> = Vec::new();
        let mut state = TickerState::Pending;
        let mut shutdown_rx = self.shutdown.subscribe();

        for (index, entry) in self.chain.iter().enumerate() {
            if self.cancelled.load(Ordering::Acquire) || shutdown_rx.try_recv().is_ok() {
                state = TickerState::Cancelled;
                break;
            }

            state = TickerState::Trying(index);
            let source = entry.adapter.kind();

            match self.try_source(entry, &request, &mut shutdown_rx).await {
                Ok((series, rows_dropped)) => {
                    info!(
                        ticker = %ticker,
                        %source,
                        records = series.len(),
                        rows_dropped,
                        "acquisition succeeded"
                    );
                    attempts.push(AcquisitionAttempt {
                        ticker: ticker.to_string(),
                        source,
                        outcome: AttemptOutcome::Success,
                        records: series.len(),
                    });

                    let report = self.validator.validate_now(&series);
                    return TickerResult {
                        ticker,
                        state: TickerState::Success { source },
                        attempts,
                        series: Some(series),
                        report: Some(report),
                    };
                }
                Err(error) => {
                    let outcome = AttemptOutcome::from_error(&error);
                    warn!(ticker = %ticker, %source, %error, "source attempt failed");
                    attempts.push(AcquisitionAttempt {
                        ticker: ticker.to_string(),
                        source,
                        outcome,
                        records: 0,
                    });

                    if matches!(error, SourceError::Cancelled) {
                        state = TickerState::Cancelled;
                        break;
                    }
                    // Any other failure advances the chain.
                }
            }
        }

        if !matches!(state, TickerState::Cancelled) {
            warn!(ticker = %ticker, "all sources exhausted, routing to manual acquisition");
            state = TickerState::Exhausted;
        }

        TickerResult {
            ticker,
            state,
            attempts,
            series: None,
            report: None,
        }
    }

    /// One adapter try: rate-limit token, retry-wrapped fetch, then
    /// normalization. A success with zero parseable records is `NoData`
    /// so the chain advances.
    async fn try_source(
        &self,
        entry: &ChainEntry,
        request: &FetchRequest,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<(CanonicalSeries, usize), SourceError> {
        let deadline = tokio::time::Instant::now() + self.config.token_wait_limit;
        tokio::select! {
            acquired = entry.limiter.acquire(Some(deadline)) => {
                if acquired.is_err() {
                    return Err(SourceError::RateLimited(format!(
                        "no token within {:?}",
                        self.config.token_wait_limit
                    )));
                }
            }
            _ = shutdown_rx.recv() => return Err(SourceError::Cancelled),
        }

        let adapter = &entry.adapter;
        let shutdown = &self.shutdown;
        let payload = entry
            .retry
            .run(shutdown_rx, || adapter.fetch(request, shutdown.subscribe()))
            .await?;

        let normalized = self.normalizer.normalize(&payload, request)?;
        if normalized.series.is_empty() {
            return Err(SourceError::NoData(format!(
                "{}: no rows within {} after normalization",
                request.ticker, request.range
            )));
        }

        Ok((normalized.series, normalized.rows_dropped))
    }
}
