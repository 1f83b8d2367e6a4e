//! Run reporting and persistence
//!
//! Thin sink at the edge of the pipeline: exports canonical series as
//! CSV, quality reports and the run summary as JSON, and renders the
//! operator-facing summary text, including manual retrieval guidance
//! for exhausted tickers. The orchestrator works without any of this.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::orchestrator::{AcquisitionAttempt, RunOutcome, TickerState};
use crate::schema::CanonicalSeries;
use crate::source::SourceKind;
use crate::symbol::DateRange;
use crate::validation::OverallStatus;

/// Errors writing reports
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Terminal state of a ticker, as reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerOutcome {
    Success,
    Exhausted,
    Cancelled,
}

/// First and last bar dates actually covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoveredRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

/// Per-ticker entry in the run summary
#[derive(Debug, Clone, Serialize)]
pub struct TickerSummary {
    pub ticker: String,
    pub outcome: TickerOutcome,
    /// The adapter that supplied the data, absent when exhausted
    pub source: Option<SourceKind>,
    pub records: usize,
    pub covered: Option<CoveredRange>,
    pub quality: Option<OverallStatus>,
    pub attempts: Vec<AcquisitionAttempt>,
}

/// Structured summary of one acquisition run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub requested_range: DateRange,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub interrupted: bool,
    pub tickers: Vec<TickerSummary>,
    /// Fraction of tickers that passed all quality gates
    pub pass_ratio: f64,
    /// Whether `pass_ratio` clears the configured bar
    pub meets_pass_ratio: bool,
}

impl RunSummary {
    /// Build the summary from a run outcome.
    pub fn from_outcome(outcome: &RunOutcome, min_pass_ratio: f64) -> Self {
        let tickers: Vec<TickerSummary> = outcome
            .results
            .iter()
            .map(|result| {
                let covered = result.series.as_ref().and_then(|series| {
                    series.date_span().map(|(first, last)| CoveredRange { first, last })
                });

                TickerSummary {
                    ticker: result.ticker.to_string(),
                    outcome: match result.state {
                        TickerState::Success { .. } => TickerOutcome::Success,
                        TickerState::Cancelled => TickerOutcome::Cancelled,
                        _ => TickerOutcome::Exhausted,
                    },
                    source: result.source(),
                    records: result.series.as_ref().map(|s| s.len()).unwrap_or(0),
                    covered,
                    quality: result.report.as_ref().map(|r| r.overall_status),
                    attempts: result.attempts.clone(),
                }
            })
            .collect();

        let total = tickers.len().max(1);
        let passed = tickers
            .iter()
            .filter(|t| t.quality == Some(OverallStatus::Pass))
            .count();
        let pass_ratio = passed as f64 / total as f64;

        Self {
            run_id: outcome.run_id,
            requested_range: outcome.range,
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            interrupted: outcome.interrupted,
            tickers,
            pass_ratio,
            meets_pass_ratio: pass_ratio >= min_pass_ratio,
        }
    }

    /// Tickers that exhausted their fallback chain.
    pub fn exhausted_tickers(&self) -> Vec<&TickerSummary> {
        self.tickers
            .iter()
            .filter(|t| t.outcome == TickerOutcome::Exhausted)
            .collect()
    }

    /// Human-readable rendering for logs and the notification path.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Acquisition run {} ({})\n",
            self.run_id, self.requested_range
        ));

        for ticker in &self.tickers {
            match ticker.outcome {
                TickerOutcome::Success => {
                    let source = ticker
                        .source
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    let covered = ticker
                        .covered
                        .map(|c| format!("{} to {}", c.first, c.last))
                        .unwrap_or_else(|| "-".to_string());
                    let quality = match ticker.quality {
                        Some(OverallStatus::Pass) => "PASS",
                        Some(OverallStatus::Fail) => "FAIL",
                        None => "-",
                    };
                    out.push_str(&format!(
                        "  {}: {} records via {} ({}), quality {}\n",
                        ticker.ticker, ticker.records, source, covered, quality
                    ));
                }
                TickerOutcome::Exhausted => {
                    out.push_str(&format!("  {}: EXHAUSTED after {} attempts\n", ticker.ticker, ticker.attempts.len()));
                }
                TickerOutcome::Cancelled => {
                    out.push_str(&format!("  {}: cancelled\n", ticker.ticker));
                }
            }
        }

        out.push_str(&format!(
            "Quality pass ratio: {:.0}% ({})\n",
            self.pass_ratio * 100.0,
            if self.meets_pass_ratio { "ok" } else { "below bar" }
        ));

        let exhausted = self.exhausted_tickers();
        if !exhausted.is_empty() {
            out.push_str("\nManual acquisition needed:\n");
            for ticker in exhausted {
                out.push_str(&manual_guidance(&ticker.ticker));
            }
        }

        out
    }
}

/// Source-specific retrieval steps for a ticker every automated source
/// failed on. Routed to the manual-intervention path alongside the
/// summary.
pub fn manual_guidance(ticker: &str) -> String {
    let code = ticker.split('.').next().unwrap_or(ticker);
    format!(
        "\
  {ticker}:
    1. IDX:   https://www.idx.co.id/en/market-data/trading-data/stock/ (search {code}, download historical CSV)
    2. Yahoo: https://finance.yahoo.com/quote/{ticker}/history (set period, Download)
    3. Stooq: https://stooq.com/q/d/?s={lower_code}.id (historical data tab, CSV)
    Save as {code}_manual.csv in the manual drop directory and rerun.
",
        lower_code = code.to_lowercase(),
    )
}

/// Serialize a canonical series into the columnar output schema:
/// `Date,Ticker,Open,High,Low,Close,Volume[,Adj_Close]`. The Adj_Close
/// column appears only when the series carries adjustments.
pub fn write_series_csv<W: Write>(series: &CanonicalSeries, writer: W) -> Result<(), ReportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let with_adjusted = series.has_adjusted_close();

    let mut header = vec!["Date", "Ticker", "Open", "High", "Low", "Close", "Volume"];
    if with_adjusted {
        header.push("Adj_Close");
    }
    csv_writer.write_record(&header)?;

    let fmt_decimal = |value: Option<rust_decimal::Decimal>| {
        value.map(|d| d.to_string()).unwrap_or_default()
    };

    for bar in series.bars() {
        let mut record = vec![
            bar.date.to_string(),
            series.ticker().to_string(),
            fmt_decimal(bar.open),
            fmt_decimal(bar.high),
            fmt_decimal(bar.low),
            bar.close.to_string(),
            bar.volume.map(|v| v.to_string()).unwrap_or_default(),
        ];
        if with_adjusted {
            record.push(fmt_decimal(bar.adjusted_close));
        }
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Render a series to a CSV string.
pub fn series_csv_string(series: &CanonicalSeries) -> Result<String, ReportError> {
    let mut buffer = Vec::new();
    write_series_csv(series, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// File-based sink for run artifacts.
pub struct Reporter {
    directory: PathBuf,
}

impl Reporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Persist canonical series, quality reports, and the run summary.
    /// Returns the paths written.
    pub fn persist_run(
        &self,
        outcome: &RunOutcome,
        summary: &RunSummary,
    ) -> Result<Vec<PathBuf>, ReportError> {
        std::fs::create_dir_all(&self.directory)?;
        let mut written = Vec::new();

        for result in &outcome.results {
            let code = result.ticker.code();

            if let Some(series) = &result.series {
                let path = self.directory.join(format!("{code}_canonical.csv"));
                let file = std::fs::File::create(&path)?;
                write_series_csv(series, file)?;
                written.push(path);
            }

            if let Some(report) = &result.report {
                let path = self.directory.join(format!("{code}_quality.json"));
                std::fs::write(&path, serde_json::to_vec_pretty(report)?)?;
                written.push(path);
            }
        }

        let summary_json = self.directory.join("run_summary.json");
        std::fs::write(&summary_json, serde_json::to_vec_pretty(summary)?)?;
        written.push(summary_json);

        let summary_txt = self.directory.join("run_summary.txt");
        std::fs::write(&summary_txt, summary.render_text())?;
        written.push(summary_txt);

        info!(
            directory = %self.directory.display(),
            files = written.len(),
            "run artifacts persisted"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CanonicalBar;
    use crate::symbol::TickerSymbol;
    use rust_decimal_macros::dec;

    fn series_with_adjusted() -> CanonicalSeries {
        let ticker = TickerSymbol::parse("BBCA.JK").unwrap();
        let mut bar = CanonicalBar::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            dec!(9400),
        );
        bar.open = Some(dec!(9300));
        bar.high = Some(dec!(9450));
        bar.low = Some(dec!(9250));
        bar.volume = Some(1_250_000);
        bar.adjusted_close = Some(dec!(9380.5));
        CanonicalSeries::new(ticker, vec![bar])
    }

    fn series_without_adjusted() -> CanonicalSeries {
        let ticker = TickerSymbol::parse("GOTO.JK").unwrap();
        let mut bar = CanonicalBar::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), dec!(52));
        bar.open = Some(dec!(50));
        bar.high = Some(dec!(55));
        bar.low = Some(dec!(48));
        bar.volume = Some(7_000);
        CanonicalSeries::new(ticker, vec![bar])
    }

    #[test]
    fn csv_includes_adjusted_column_when_present() {
        let csv = series_csv_string(&series_with_adjusted()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Date,Ticker,Open,High,Low,Close,Volume,Adj_Close"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-01-02,BBCA.JK,9300,9450,9250,9400,1250000,9380.5"
        );
    }

    #[test]
    fn csv_omits_adjusted_column_when_absent() {
        let csv = series_csv_string(&series_without_adjusted()).unwrap();
        assert_eq!(
            csv.lines().next().unwrap(),
            "Date,Ticker,Open,High,Low,Close,Volume"
        );
    }

    #[test]
    fn missing_fields_serialize_as_empty_cells() {
        let ticker = TickerSymbol::parse("BUMI.JK").unwrap();
        let bar = CanonicalBar::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), dec!(100));
        let series = CanonicalSeries::new(ticker, vec![bar]);

        let csv = series_csv_string(&series).unwrap();
        assert_eq!(csv.lines().nth(1).unwrap(), "2024-01-02,BUMI.JK,,,,100,");
    }

    #[test]
    fn guidance_names_all_three_manual_sources() {
        let guidance = manual_guidance("BBCA.JK");
        assert!(guidance.contains("idx.co.id"));
        assert!(guidance.contains("finance.yahoo.com/quote/BBCA.JK/history"));
        assert!(guidance.contains("stooq.com/q/d/?s=bbca.id"));
        assert!(guidance.contains("BBCA_manual.csv"));
    }
}
