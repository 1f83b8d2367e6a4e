//! Rate limiting and retry policies for source adapters
//!
//! Every adapter call goes through a shared token-bucket limiter sized
//! to the source's real-world quota, and a bounded exponential-backoff
//! retry policy for transient failures.

mod rate_limit;
mod retry;

pub use rate_limit::{AcquireError, LimiterError, SourceLimiter};
pub use retry::RetryPolicy;
