//! End-to-end pipeline test: fallback acquisition over a mocked source
//! chain, normalization, quality gates, and run reporting.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use data_acquisition::source::MockAdapter;
use data_acquisition::{
    ChainEntry, DateRange, FallbackOrchestrator, OrchestratorConfig, OverallStatus, QualityValidator,
    Reporter, RetryPolicy, RunSummary, SourceError, SourceKind, SourceLimiter, TickerState,
    TickerSymbol,
};

/// A month of plausible daily bars ending yesterday, so the timeliness
/// gate sees fresh data.
fn fresh_csv(base: i64) -> String {
    let today = Utc::now().date_naive();
    let mut out = String::from("Date,Open,High,Low,Close,Volume\n");
    for offset in (1..=30).rev() {
        let date = today - chrono::Days::new(offset);
        let close = base + (offset as i64 % 7);
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            date.format("%Y-%m-%d"),
            close - 1,
            close + 3,
            close - 3,
            close,
            10_000 + offset * 13,
        ));
    }
    out
}

fn range() -> DateRange {
    let today = Utc::now().date_naive();
    DateRange::new(today - chrono::Days::new(365), today).unwrap()
}

fn entry(adapter: Arc<MockAdapter>) -> ChainEntry {
    let limiter =
        SourceLimiter::new(NonZeroU32::new(100).unwrap(), Duration::from_secs(60)).unwrap();
    ChainEntry::new(
        adapter,
        Arc::new(limiter),
        RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1)),
    )
}

fn ticker(s: &str) -> TickerSymbol {
    TickerSymbol::parse(s).unwrap()
}

#[tokio::test]
async fn fallback_pipeline_end_to_end() {
    // X fails on the first source and lands on the second; Y and Z are
    // served by the first; the manual fallback is never consulted.
    let stooq_like = Arc::new(
        MockAdapter::new(SourceKind::Stooq)
            .fail_for("BBCA.JK", SourceError::Unavailable("connection reset".into()))
            .succeed_for("GOTO.JK", &fresh_csv(100))
            .succeed_for("TLKM.JK", &fresh_csv(3_000)),
    );
    let yahoo_like = Arc::new(
        MockAdapter::new(SourceKind::Yahoo).succeed_for("BBCA.JK", &fresh_csv(9_000)),
    );
    let manual = Arc::new(MockAdapter::new(SourceKind::ManualDrop));

    let orchestrator = FallbackOrchestrator::new(
        vec![
            entry(stooq_like.clone()),
            entry(yahoo_like.clone()),
            entry(manual.clone()),
        ],
        QualityValidator::default(),
        OrchestratorConfig::default(),
    );

    let outcome = orchestrator
        .run(
            vec![ticker("BBCA.JK"), ticker("GOTO.JK"), ticker("TLKM.JK")],
            range(),
        )
        .await;

    assert_eq!(outcome.results.len(), 3);
    assert!(!outcome.interrupted);

    let by_ticker = |t: &str| {
        outcome
            .results
            .iter()
            .find(|r| r.ticker.as_str() == t)
            .unwrap()
    };

    // X came through the second source after the first failed.
    let x = by_ticker("BBCA.JK");
    assert_eq!(
        x.state,
        TickerState::Success {
            source: SourceKind::Yahoo
        }
    );
    assert_eq!(x.attempts.len(), 2);

    // Y and Z came straight from the first source.
    for t in ["GOTO.JK", "TLKM.JK"] {
        let r = by_ticker(t);
        assert_eq!(
            r.state,
            TickerState::Success {
                source: SourceKind::Stooq
            }
        );
        assert_eq!(r.attempts.len(), 1);
    }

    // The manual fallback was never invoked.
    assert_eq!(manual.total_calls(), 0);
    // Yahoo was only consulted for X.
    assert_eq!(yahoo_like.total_calls(), 1);

    // Every ticker has a non-empty canonical series and a computed
    // quality verdict.
    for result in &outcome.results {
        let series = result.series.as_ref().unwrap();
        assert!(!series.is_empty());

        let report = result.report.as_ref().unwrap();
        assert!(report.consistency.passed);
        assert!(report.timeliness.passed);
        assert_eq!(report.overall_status, OverallStatus::Pass);
    }
}

#[tokio::test]
async fn exhausted_ticker_is_reported_with_guidance() {
    let stooq_like = Arc::new(
        MockAdapter::new(SourceKind::Stooq)
            .fail_for("BUMI.JK", SourceError::Timeout(Duration::from_secs(10)))
            .succeed_for("BBCA.JK", &fresh_csv(9_000)),
    );
    let yahoo_like = Arc::new(
        MockAdapter::new(SourceKind::Yahoo)
            .fail_for("BUMI.JK", SourceError::NotFound("BUMI.JK".into()))
            .succeed_for("BBCA.JK", &fresh_csv(9_000)),
    );

    let orchestrator = FallbackOrchestrator::new(
        vec![entry(stooq_like), entry(yahoo_like)],
        QualityValidator::default(),
        OrchestratorConfig::default(),
    );

    let outcome = orchestrator
        .run(vec![ticker("BBCA.JK"), ticker("BUMI.JK")], range())
        .await;

    let summary = RunSummary::from_outcome(&outcome, 0.70);

    // One of two tickers passed; the 70% bar is not met.
    assert_eq!(summary.pass_ratio, 0.5);
    assert!(!summary.meets_pass_ratio);
    assert_eq!(summary.exhausted_tickers().len(), 1);

    // The rendered summary names the exhausted ticker and its manual
    // retrieval routes.
    let text = summary.render_text();
    assert!(text.contains("BUMI.JK: EXHAUSTED after 2 attempts"));
    assert!(text.contains("idx.co.id"));
    assert!(text.contains("finance.yahoo.com/quote/BUMI.JK/history"));

    // Artifacts land on disk: canonical CSV and quality JSON for the
    // successful ticker, summary JSON and text for the run.
    let dir = tempfile::tempdir().unwrap();
    let written = Reporter::new(dir.path()).persist_run(&outcome, &summary).unwrap();
    assert_eq!(written.len(), 4);
    assert!(dir.path().join("BBCA_canonical.csv").exists());
    assert!(dir.path().join("BBCA_quality.json").exists());
    assert!(dir.path().join("run_summary.json").exists());
    assert!(dir.path().join("run_summary.txt").exists());

    let csv = std::fs::read_to_string(dir.path().join("BBCA_canonical.csv")).unwrap();
    assert!(csv.starts_with("Date,Ticker,Open,High,Low,Close,Volume"));
    assert!(csv.lines().count() > 1);
}
