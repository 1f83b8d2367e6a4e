//! # Data Acquisition
//!
//! Multi-source acquisition of daily OHLCV bars with fallback,
//! normalization, and quality certification.
//!
//! ## Features
//!
//! - **Fallback acquisition**: an ordered chain of source adapters
//!   (Stooq, Yahoo, Alpha Vantage, browser automation, manual drop) is
//!   tried per ticker under per-source rate limits and retry budgets
//! - **Schema normalization**: dialect detection and column aliasing
//!   map every source's native CSV shape onto one canonical schema
//! - **Quality gates**: completeness, consistency, timeliness, and
//!   accuracy checks certify each series before downstream use
//!
//! ## Architecture
//!
//! The orchestrator walks the chain strictly in priority order per
//! ticker and uses at most one source's data per ticker per run.
//! Distinct tickers run on a bounded worker pool. A ticker whose chain
//! is exhausted is routed to a manual acquisition path with
//! source-specific retrieval guidance; it never fails the run.

pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod schema;
pub mod source;
pub mod symbol;
pub mod throttle;
pub mod validation;

// Re-export commonly used types
pub use config::Settings;
pub use normalize::{Normalized, SchemaNormalizer};
pub use orchestrator::{
    AcquisitionAttempt, AttemptOutcome, ChainEntry, FallbackOrchestrator, OrchestratorConfig,
    RunOutcome, TickerResult, TickerState,
};
pub use report::{Reporter, RunSummary};
pub use schema::{CanonicalBar, CanonicalSeries, Dialect};
pub use source::{
    FetchRequest, RawPayload, SourceAdapter, SourceError, SourceKind, SourceResult,
};
pub use symbol::{DateRange, TickerSymbol};
pub use throttle::{RetryPolicy, SourceLimiter};
pub use validation::{OverallStatus, QualityReport, QualityThresholds, QualityValidator};
