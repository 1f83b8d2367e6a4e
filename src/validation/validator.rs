//! Quality gate checks for canonical series
//!
//! Four independent, order-insensitive checks over a `CanonicalSeries`.
//! The validator performs no I/O and is a pure function of its inputs:
//! re-running with the same series and reference time yields an
//! identical report.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::schema::CanonicalSeries;

/// Quality gate thresholds.
///
/// Staleness tolerance and outlier caps differ between markets and
/// consumers, so none of these are hardcoded.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, Serialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum average per-column completeness, percent
    pub min_completeness_pct: f64,
    /// Maximum age of the latest bar, in days
    pub max_age_days: i64,
    /// Extreme daily returns tolerated before the accuracy check fails
    pub max_extreme_returns: usize,
    /// Absolute close-to-close return that counts as extreme (0.5 = 50%)
    pub extreme_return_threshold: Decimal,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_completeness_pct: 95.0,
            max_age_days: 2,
            max_extreme_returns: 5,
            extreme_return_threshold: Decimal::new(5, 1),
        }
    }
}

/// Overall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Pass,
    Fail,
}

/// Structural rules enforced by the consistency check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyRule {
    HighBelowLow,
    CloseOutsideRange,
    NegativeVolume,
}

impl std::fmt::Display for ConsistencyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConsistencyRule::HighBelowLow => "high < low",
            ConsistencyRule::CloseOutsideRange => "close outside [low, high]",
            ConsistencyRule::NegativeVolume => "negative volume",
        };
        f.write_str(s)
    }
}

/// One violated rule with its row count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyIssue {
    pub rule: ConsistencyRule,
    pub rows: usize,
}

/// Fraction of non-null values per column, averaged
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessCheck {
    pub score_pct: f64,
    pub per_column: BTreeMap<String, f64>,
    pub passed: bool,
}

/// Structural invariants, zero tolerance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyCheck {
    pub passed: bool,
    pub issues: Vec<ConsistencyIssue>,
}

/// Freshness of the most recent bar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinessCheck {
    pub latest_date: Option<NaiveDate>,
    pub age_days: Option<i64>,
    pub passed: bool,
}

/// Statistical outlier screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyCheck {
    pub extreme_return_count: usize,
    /// Informational only; does not affect pass/fail
    pub zero_volume_days: usize,
    pub passed: bool,
}

/// Structured quality report for one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub ticker: String,
    pub completeness: CompletenessCheck,
    pub consistency: ConsistencyCheck,
    pub timeliness: TimelinessCheck,
    pub accuracy: AccuracyCheck,
    pub overall_status: OverallStatus,
    pub generated_at: DateTime<Utc>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.overall_status == OverallStatus::Pass
    }
}

/// Runs the four quality checks over a canonical series.
pub struct QualityValidator {
    thresholds: QualityThresholds,
}

impl QualityValidator {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Validate against the current wall clock.
    pub fn validate_now(&self, series: &CanonicalSeries) -> QualityReport {
        self.validate(series, Utc::now())
    }

    /// Validate against an explicit reference time. Pure: identical
    /// inputs yield an identical report.
    pub fn validate(&self, series: &CanonicalSeries, now: DateTime<Utc>) -> QualityReport {
        let completeness = self.check_completeness(series);
        let consistency = self.check_consistency(series);
        let timeliness = self.check_timeliness(series, now.date_naive());
        let accuracy = self.check_accuracy(series);

        let all_passed =
            completeness.passed && consistency.passed && timeliness.passed && accuracy.passed;
        let overall_status = if all_passed {
            OverallStatus::Pass
        } else {
            OverallStatus::Fail
        };

        info!(
            ticker = %series.ticker(),
            completeness = completeness.passed,
            consistency = consistency.passed,
            timeliness = timeliness.passed,
            accuracy = accuracy.passed,
            status = ?overall_status,
            "quality checks complete"
        );

        QualityReport {
            ticker: series.ticker().to_string(),
            completeness,
            consistency,
            timeliness,
            accuracy,
            overall_status,
            generated_at: now,
        }
    }

    /// Fraction of non-null values per column, averaged across columns.
    ///
    /// A column no row carries (e.g. Adj Close from a source that never
    /// provides adjustments) is not part of the series' schema and is
    /// excluded from the average rather than counted as 0%.
    fn check_completeness(&self, series: &CanonicalSeries) -> CompletenessCheck {
        let rows = series.len();
        if rows == 0 {
            return CompletenessCheck {
                score_pct: 0.0,
                per_column: BTreeMap::new(),
                passed: false,
            };
        }

        let mut present: BTreeMap<&str, usize> = BTreeMap::new();
        for bar in series.bars() {
            *present.entry("close").or_insert(0) += 1;
            if bar.open.is_some() {
                *present.entry("open").or_insert(0) += 1;
            }
            if bar.high.is_some() {
                *present.entry("high").or_insert(0) += 1;
            }
            if bar.low.is_some() {
                *present.entry("low").or_insert(0) += 1;
            }
            if bar.volume.is_some() {
                *present.entry("volume").or_insert(0) += 1;
            }
            if bar.adjusted_close.is_some() {
                *present.entry("adjusted_close").or_insert(0) += 1;
            }
        }

        let per_column: BTreeMap<String, f64> = ["open", "high", "low", "close", "volume", "adjusted_close"]
            .iter()
            .filter_map(|column| {
                present
                    .get(column)
                    .map(|count| (column.to_string(), *count as f64 / rows as f64 * 100.0))
            })
            .collect();

        let score_pct = per_column.values().sum::<f64>() / per_column.len() as f64;

        CompletenessCheck {
            score_pct,
            passed: score_pct >= self.thresholds.min_completeness_pct,
            per_column,
        }
    }

    /// Structural invariants; any violating row on any rule fails the
    /// whole check. Violations are enumerated as a count per rule.
    fn check_consistency(&self, series: &CanonicalSeries) -> ConsistencyCheck {
        let mut high_below_low = 0usize;
        let mut close_outside = 0usize;
        let mut negative_volume = 0usize;

        for bar in series.bars() {
            if !bar.range_ordered() {
                // An inverted range makes the close containment rule
                // unsatisfiable; count the root cause once.
                high_below_low += 1;
            } else if !bar.close_within_range() {
                close_outside += 1;
            }
            if !bar.volume_non_negative() {
                negative_volume += 1;
            }
        }

        let mut issues = Vec::new();
        for (rule, rows) in [
            (ConsistencyRule::HighBelowLow, high_below_low),
            (ConsistencyRule::CloseOutsideRange, close_outside),
            (ConsistencyRule::NegativeVolume, negative_volume),
        ] {
            if rows > 0 {
                issues.push(ConsistencyIssue { rule, rows });
            }
        }

        ConsistencyCheck {
            passed: issues.is_empty(),
            issues,
        }
    }

    /// Age in days of the most recent bar relative to the reference
    /// date. An empty series has no latest bar and fails.
    fn check_timeliness(&self, series: &CanonicalSeries, as_of: NaiveDate) -> TimelinessCheck {
        match series.latest_date() {
            Some(latest) => {
                let age_days = (as_of - latest).num_days();
                TimelinessCheck {
                    latest_date: Some(latest),
                    age_days: Some(age_days),
                    passed: age_days < self.thresholds.max_age_days,
                }
            }
            None => TimelinessCheck {
                latest_date: None,
                age_days: None,
                passed: false,
            },
        }
    }

    /// Close-to-close returns beyond the extreme threshold must stay
    /// under the cap. Zero-volume days are recorded but informational.
    fn check_accuracy(&self, series: &CanonicalSeries) -> AccuracyCheck {
        let mut extreme_return_count = 0usize;
        for pair in series.bars().windows(2) {
            let (prev, current) = (&pair[0], &pair[1]);
            if prev.close.is_zero() {
                continue;
            }
            let ret = (current.close - prev.close) / prev.close;
            if ret.abs() > self.thresholds.extreme_return_threshold {
                extreme_return_count += 1;
            }
        }

        let zero_volume_days = series
            .bars()
            .iter()
            .filter(|bar| bar.volume == Some(0))
            .count();

        AccuracyCheck {
            extreme_return_count,
            zero_volume_days,
            passed: extreme_return_count < self.thresholds.max_extreme_returns,
        }
    }
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}
