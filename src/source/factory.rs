//! Chain factory
//!
//! Builds the fallback chain (adapter + shared limiter + retry policy,
//! in configured priority order) from application settings.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::{
    AlphaVantageAdapter, BrowserAdapter, ManualDropAdapter, SourceAdapter, SourceKind,
    StooqAdapter, YahooAdapter,
};
use crate::config::Settings;
use crate::orchestrator::ChainEntry;
use crate::throttle::{LimiterError, RetryPolicy, SourceLimiter};

/// Errors building the chain
#[derive(Error, Debug)]
pub enum FactoryError {
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error("failed to construct {kind} adapter: {reason}")]
    Adapter { kind: SourceKind, reason: String },

    #[error("{0} cannot appear in a production chain")]
    Unsupported(SourceKind),

    #[error("no enabled sources in the configured priority order")]
    EmptyChain,
}

/// Build the fallback chain from settings.
///
/// Sources appear in the configured priority order; disabled sources
/// are skipped with a log line so the effective chain is visible.
pub fn build_chain(settings: &Settings) -> Result<Vec<ChainEntry>, FactoryError> {
    let sources = &settings.sources;
    let mut chain = Vec::new();

    for kind in &sources.priority {
        let entry = match kind {
            SourceKind::Stooq => {
                if !sources.stooq.enabled {
                    skip(*kind);
                    continue;
                }
                let adapter = StooqAdapter::new(Duration::from_secs(sources.stooq.timeout_secs))
                    .map_err(|e| adapter_error(*kind, e))?;
                make_entry(
                    Arc::new(adapter),
                    sources.stooq.rate_limit.build()?,
                    sources.stooq.retry.build(),
                )
            }
            SourceKind::Yahoo => {
                if !sources.yahoo.enabled {
                    skip(*kind);
                    continue;
                }
                let adapter = YahooAdapter::new(Duration::from_secs(sources.yahoo.timeout_secs))
                    .map_err(|e| adapter_error(*kind, e))?;
                make_entry(
                    Arc::new(adapter),
                    sources.yahoo.rate_limit.build()?,
                    sources.yahoo.retry.build(),
                )
            }
            SourceKind::AlphaVantage => {
                if !sources.alphavantage.enabled {
                    skip(*kind);
                    continue;
                }
                if sources.alphavantage.api_key.is_none() {
                    warn!("alphavantage has no API key configured; its attempts will fail with an auth error");
                }
                let adapter = AlphaVantageAdapter::new(
                    sources.alphavantage.api_key.clone(),
                    Duration::from_secs(sources.alphavantage.timeout_secs),
                )
                .map_err(|e| adapter_error(*kind, e))?;
                make_entry(
                    Arc::new(adapter),
                    sources.alphavantage.rate_limit.build()?,
                    sources.alphavantage.retry.build(),
                )
            }
            SourceKind::Browser => {
                if !sources.browser.enabled {
                    skip(*kind);
                    continue;
                }
                let adapter = BrowserAdapter::new(
                    sources.browser.webdriver_url.clone(),
                    Duration::from_secs(sources.browser.timeout_secs),
                )
                .map_err(|e| adapter_error(*kind, e))?;
                make_entry(
                    Arc::new(adapter),
                    sources.browser.rate_limit.build()?,
                    sources.browser.retry.build(),
                )
            }
            SourceKind::ManualDrop => {
                if !sources.manual_drop.enabled {
                    skip(*kind);
                    continue;
                }
                let adapter = ManualDropAdapter::new(sources.manual_drop.directory.clone());
                make_entry(
                    Arc::new(adapter),
                    sources.manual_drop.rate_limit.build()?,
                    // Local file reads gain nothing from retrying.
                    RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1)),
                )
            }
            SourceKind::Mock => return Err(FactoryError::Unsupported(SourceKind::Mock)),
        };
        chain.push(entry);
    }

    if chain.is_empty() {
        return Err(FactoryError::EmptyChain);
    }

    info!(
        order = ?chain.iter().map(|e| e.adapter.kind()).collect::<Vec<_>>(),
        "fallback chain assembled"
    );
    Ok(chain)
}

fn make_entry(
    adapter: Arc<dyn SourceAdapter>,
    limiter: SourceLimiter,
    retry: RetryPolicy,
) -> ChainEntry {
    ChainEntry::new(adapter, Arc::new(limiter), retry)
}

fn skip(kind: SourceKind) {
    info!(%kind, "source disabled, skipping in fallback chain");
}

fn adapter_error(kind: SourceKind, error: crate::source::SourceError) -> FactoryError {
    FactoryError::Adapter {
        kind,
        reason: error.to_string(),
    }
}
