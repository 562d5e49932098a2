//! Rate limiter for Kalshi API.
//!
//! Basic tier limit: 20 reads/sec.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

const BASIC_TIER_READS_PER_SEC: NonZeroU32 = match NonZeroU32::new(20) {
    Some(n) => n,
    None => unreachable!(),
};

/// Read-side token bucket shared by all clones of a client.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    read_limiter: Arc<GovLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    /// Create with Kalshi basic-tier limits.
    pub fn new() -> Self {
        Self::with_quota(BASIC_TIER_READS_PER_SEC)
    }

    /// Create with a custom per-second read limit. A zero limit falls back
    /// to the basic tier.
    #[cfg(test)]
    fn with_limit(reads_per_sec: u32) -> Self {
        Self::with_quota(NonZeroU32::new(reads_per_sec).unwrap_or(BASIC_TIER_READS_PER_SEC))
    }

    fn with_quota(reads_per_sec: NonZeroU32) -> Self {
        Self {
            read_limiter: Arc::new(GovLimiter::direct(Quota::per_second(reads_per_sec))),
        }
    }

    /// Wait until a read slot is available.
    pub async fn wait_read(&self) {
        self.read_limiter.until_ready().await;
    }

    /// Try to acquire a read slot without waiting. Returns true if acquired.
    #[cfg(test)]
    fn try_read(&self) -> bool {
        self.read_limiter.check().is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
