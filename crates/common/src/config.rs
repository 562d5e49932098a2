//! Application configuration types.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Kalshi data source settings.
    #[serde(default)]
    pub kalshi: KalshiConfig,

    /// Polymarket (Gamma API) data source settings.
    #[serde(default)]
    pub polymarket: PolymarketConfig,

    /// Search cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Kalshi source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalshiConfig {
    /// Use demo environment (true) or production (false).
    #[serde(default)]
    pub use_demo: bool,

    /// Page size for `/events` pagination (API max is 200).
    #[serde(default = "default_kalshi_page_limit")]
    pub page_limit: u32,
}

/// Polymarket source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymarketConfig {
    /// Page size for Gamma `/events` pagination.
    #[serde(default = "default_gamma_page_size")]
    pub page_size: usize,

    /// Safety cap on the number of pages fetched per snapshot.
    #[serde(default = "default_gamma_max_pages")]
    pub max_pages: usize,
}

/// Cache freshness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds. 0 disables TTL-driven background refresh.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_kalshi_page_limit() -> u32 {
    200
}
fn default_gamma_page_size() -> usize {
    100
}
fn default_gamma_max_pages() -> usize {
    200
}
fn default_ttl_secs() -> u64 {
    3600
}

impl Default for KalshiConfig {
    fn default() -> Self {
        Self {
            use_demo: false,
            page_limit: default_kalshi_page_limit(),
        }
    }
}

impl Default for PolymarketConfig {
    fn default() -> Self {
        Self {
            page_size: default_gamma_page_size(),
            max_pages: default_gamma_max_pages(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_shape_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"cache": {"ttl_secs": 0}, "kalshi": {"use_demo": true}}"#)
                .unwrap();
        assert_eq!(config.cache.ttl_secs, 0);
        assert!(config.kalshi.use_demo);
        assert_eq!(config.kalshi.page_limit, 200);
        assert_eq!(config.polymarket.page_size, 100);
    }
}
