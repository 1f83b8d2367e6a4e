//! Application configuration

mod settings;

pub use settings::{
    AlphaVantageSettings, BrowserSettings, HttpSourceSettings, ManualDropSettings, OutputSettings,
    RateLimitSettings, RetrySettings, RunSettings, Settings, SourcesSettings,
};
