//! Domain types for the FAM gateway.
//!
//! Configuration, errors, and the three stateful building blocks the lookup
//! path leans on: the correlator, the cache and the rate limiter.

pub mod cache;
pub mod config;
pub mod correlation;
pub mod error;
pub mod parse;
pub mod pending;
pub mod rate_limit;
pub mod types;

// Re-exports for convenience
pub use cache::{CacheSnapshot, TtlCache};
pub use config::{ConfigError, GatewayConfig};
pub use correlation::RequestId;
pub use error::{ApiError, GatewayError, LookupError};
pub use parse::{FamResponseParser, ResponseParser};
pub use pending::{CorrelatorError, PendingReplyStore, PendingSnapshot, PendingWait};
pub use rate_limit::{Admission, RateLimitSnapshot, RateLimiter};
pub use types::*;
