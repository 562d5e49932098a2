//! Cache-age based expiry policy.
//!
//! A TTL of zero disables expiry, and a cache that was never populated has
//! no age, so neither case ever reports as expired.

/// True when the cache is at least `ttl_secs` old.
pub fn is_expired(cache_age_secs: Option<u64>, ttl_secs: u64) -> bool {
    match cache_age_secs {
        Some(age) if ttl_secs > 0 => age >= ttl_secs,
        _ => false,
    }
}

/// Seconds until expiry, floored at zero. `None` when TTL is disabled or the
/// cache has never been populated.
pub fn expires_in_seconds(cache_age_secs: Option<u64>, ttl_secs: u64) -> Option<u64> {
    match cache_age_secs {
        Some(age) if ttl_secs > 0 => Some(ttl_secs.saturating_sub(age)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        assert!(is_expired(Some(3700), 3600));
        assert!(is_expired(Some(3600), 3600));
        assert!(!is_expired(Some(3599), 3600));
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        assert!(!is_expired(Some(3700), 0));
        assert_eq!(expires_in_seconds(Some(3700), 0), None);
    }

    #[test]
    fn test_never_populated() {
        assert!(!is_expired(None, 3600));
        assert_eq!(expires_in_seconds(None, 3600), None);
    }

    #[test]
    fn test_expires_in_seconds_floors_at_zero() {
        assert_eq!(expires_in_seconds(Some(600), 3600), Some(3000));
        assert_eq!(expires_in_seconds(Some(9000), 3600), Some(0));
    }
}
