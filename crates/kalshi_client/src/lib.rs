//! Kalshi API client library.
//!
//! Read-only REST access to the public Kalshi market data endpoints.

pub mod rate_limit;
pub mod rest;

pub use rate_limit::RateLimiter;
pub use rest::KalshiRestClient;
