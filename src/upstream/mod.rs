pub mod client;
pub mod rate_limiter;

pub use client::{Quote, StockDetail, UpstreamClient};
pub use rate_limiter::RateLimiter;
