//! Application settings and configuration
//!
//! Settings load from layered files (`config/default` -> per-RUN_MODE
//! -> `config/local`) with `DATA_ACQUISITION__`-prefixed environment
//! variables on top, e.g. `DATA_ACQUISITION__SOURCES__ALPHAVANTAGE__API_KEY`.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::source::SourceKind;
use crate::symbol::DateRange;
use crate::throttle::{LimiterError, RetryPolicy, SourceLimiter};
use crate::validation::QualityThresholds;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Run parameters (tickers, range, concurrency)
    #[serde(default)]
    pub run: RunSettings,
    /// Source adapter configuration
    #[serde(default)]
    pub sources: SourcesSettings,
    /// Quality gate thresholds
    #[serde(default)]
    pub quality: QualityThresholds,
    /// Output sink configuration
    #[serde(default)]
    pub output: OutputSettings,
}

/// Run-level parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Tickers to acquire, exchange-suffixed (`BBCA.JK`)
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,
    /// Explicit range start; falls back to `lookback_days` when unset
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Explicit range end; defaults to today
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Trailing window when no explicit start is configured
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Distinct tickers processed in parallel
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Longest a single attempt may wait on a rate-limit token, seconds
    #[serde(default = "default_token_wait_limit")]
    pub token_wait_limit_secs: u64,
    /// Fraction of tickers that must pass quality gates for the run
    /// summary to report the run as healthy
    #[serde(default = "default_min_pass_ratio")]
    pub min_ticker_pass_ratio: f64,
}

fn default_tickers() -> Vec<String> {
    // The surveillance core set: a pump-and-dump case, a suspension
    // case, and liquid baselines.
    vec![
        "BBCA.JK".to_string(),
        "GOTO.JK".to_string(),
        "BUMI.JK".to_string(),
        "BBRI.JK".to_string(),
        "TLKM.JK".to_string(),
    ]
}

fn default_lookback_days() -> u32 {
    180
}

fn default_max_workers() -> usize {
    4
}

fn default_token_wait_limit() -> u64 {
    120
}

fn default_min_pass_ratio() -> f64 {
    0.70
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            tickers: default_tickers(),
            start_date: None,
            end_date: None,
            lookback_days: default_lookback_days(),
            max_workers: default_max_workers(),
            token_wait_limit_secs: default_token_wait_limit(),
            min_ticker_pass_ratio: default_min_pass_ratio(),
        }
    }
}

impl RunSettings {
    /// Resolve the effective date range against a reference date.
    pub fn resolve_range(&self, today: NaiveDate) -> Result<DateRange, crate::symbol::SymbolError> {
        let end = self.end_date.unwrap_or(today);
        let start = self
            .start_date
            .unwrap_or_else(|| end - chrono::Days::new(self.lookback_days as u64));
        DateRange::new(start, end)
    }
}

/// Source adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesSettings {
    /// Fallback priority order; sources absent here are never tried
    #[serde(default = "default_priority")]
    pub priority: Vec<SourceKind>,
    #[serde(default = "StooqDefaults::settings")]
    pub stooq: HttpSourceSettings,
    #[serde(default = "YahooDefaults::settings")]
    pub yahoo: HttpSourceSettings,
    #[serde(default)]
    pub alphavantage: AlphaVantageSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub manual_drop: ManualDropSettings,
}

fn default_priority() -> Vec<SourceKind> {
    vec![
        SourceKind::Stooq,
        SourceKind::Yahoo,
        SourceKind::AlphaVantage,
        SourceKind::ManualDrop,
    ]
}

impl Default for SourcesSettings {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            stooq: StooqDefaults::settings(),
            yahoo: YahooDefaults::settings(),
            alphavantage: AlphaVantageSettings::default(),
            browser: BrowserSettings::default(),
            manual_drop: ManualDropSettings::default(),
        }
    }
}

/// Token-bucket parameters reflecting a source's real-world quota
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Calls allowed per window
    pub calls_per_window: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl RateLimitSettings {
    pub fn new(calls_per_window: u32, window_secs: u64) -> Self {
        Self {
            calls_per_window,
            window_secs,
        }
    }

    /// Build the shared limiter for this source.
    pub fn build(&self) -> Result<SourceLimiter, LimiterError> {
        let calls = NonZeroU32::new(self.calls_per_window).ok_or(LimiterError::InvalidQuota {
            calls: self.calls_per_window,
            window: Duration::from_secs(self.window_secs),
        })?;
        SourceLimiter::new(calls, Duration::from_secs(self.window_secs))
    }
}

/// Bounded exponential backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn build(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Settings shared by the plain HTTP download sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSourceSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    15
}

struct StooqDefaults;

impl StooqDefaults {
    fn settings() -> HttpSourceSettings {
        HttpSourceSettings {
            enabled: true,
            timeout_secs: default_http_timeout(),
            // Be polite to a free service.
            rate_limit: RateLimitSettings::new(20, 60),
            retry: RetrySettings::default(),
        }
    }
}

struct YahooDefaults;

impl YahooDefaults {
    fn settings() -> HttpSourceSettings {
        HttpSourceSettings {
            enabled: true,
            timeout_secs: 10,
            rate_limit: RateLimitSettings::new(30, 60),
            retry: RetrySettings::default(),
        }
    }
}

/// Alpha Vantage settings; the free tier allows 5 calls per minute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaVantageSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API key; without one the adapter fails with an auth error
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_alphavantage_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_alphavantage_rate_limit")]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_alphavantage_timeout() -> u64 {
    20
}

fn default_alphavantage_rate_limit() -> RateLimitSettings {
    RateLimitSettings::new(5, 60)
}

impl Default for AlphaVantageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            timeout_secs: default_alphavantage_timeout(),
            rate_limit: default_alphavantage_rate_limit(),
            retry: RetrySettings::default(),
        }
    }
}

/// Browser-automation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Off by default; needs a running chromedriver
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_browser_rate_limit")]
    pub rate_limit: RateLimitSettings,
    #[serde(default = "default_browser_retry")]
    pub retry: RetrySettings,
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser_timeout() -> u64 {
    30
}

fn default_browser_rate_limit() -> RateLimitSettings {
    RateLimitSettings::new(6, 60)
}

fn default_browser_retry() -> RetrySettings {
    // A stuck browser rarely recovers on immediate retry.
    RetrySettings {
        max_retries: 1,
        base_delay_ms: 5_000,
        max_delay_ms: 30_000,
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            webdriver_url: default_webdriver_url(),
            timeout_secs: default_browser_timeout(),
            rate_limit: default_browser_rate_limit(),
            retry: default_browser_retry(),
        }
    }
}

/// Manual-drop directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualDropSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_manual_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_manual_rate_limit")]
    pub rate_limit: RateLimitSettings,
}

fn default_manual_directory() -> PathBuf {
    PathBuf::from("data/raw/manual")
}

fn default_manual_rate_limit() -> RateLimitSettings {
    // Local reads; the limiter exists only for interface uniformity.
    RateLimitSettings::new(1000, 1)
}

impl Default for ManualDropSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_manual_directory(),
            rate_limit: default_manual_rate_limit(),
        }
    }
}

/// Output sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Directory canonical series, reports, and summaries land in
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("data/processed")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("DATA_ACQUISITION")
    }

    /// Load settings with a custom environment variable prefix
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = Self::config_dir();

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Add environment-specific configuration
            .add_source(File::with_name(&format!("{config_dir}/{run_mode}")).required(false))
            // Add local overrides (not checked into git)
            .add_source(File::with_name(&format!("{config_dir}/local")).required(false))
            // Add environment variables
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Get the configuration directory path
    fn config_dir() -> String {
        std::env::var("DATA_ACQUISITION_CONFIG_DIR").unwrap_or_else(|_| "config".into())
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Settings {
            run: RunSettings::default(),
            sources: SourcesSettings::default(),
            quality: QualityThresholds::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_coherent() {
        let settings = Settings::default_settings();
        assert_eq!(settings.run.max_workers, 4);
        assert_eq!(settings.quality.min_completeness_pct, 95.0);
        assert_eq!(settings.sources.alphavantage.rate_limit.calls_per_window, 5);
        assert!(!settings.sources.browser.enabled);
        assert!(settings
            .sources
            .priority
            .contains(&SourceKind::ManualDrop));
    }

    #[test]
    fn resolve_range_uses_lookback_without_explicit_start() {
        let run = RunSettings {
            lookback_days: 30,
            ..RunSettings::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        let range = run.resolve_range(today).unwrap();

        assert_eq!(range.end, today);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 5, 29).unwrap());
    }

    #[test]
    fn resolve_range_prefers_explicit_dates() {
        let run = RunSettings {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31),
            ..RunSettings::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        let range = run.resolve_range(today).unwrap();

        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn rate_limit_settings_reject_zero_calls() {
        let settings = RateLimitSettings::new(0, 60);
        assert!(settings.build().is_err());
    }

    #[test]
    fn retry_settings_build_a_policy() {
        let policy = RetrySettings::default().build();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }
}
