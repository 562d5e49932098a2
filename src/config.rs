//! Configuration loader: merges .env, config.toml and environment overrides.

use common::config::AppConfig;
use common::Error;
use std::path::Path;

fn parse_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn parse_positive_usize(raw: &str, env_name: &str) -> Result<usize, Error> {
    let parsed = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.kalshi.page_limit == 0 || config.kalshi.page_limit > 200 {
        issues.push("kalshi.page_limit must be in [1,200]".into());
    }
    if config.polymarket.page_size == 0 {
        issues.push("polymarket.page_size must be > 0".into());
    }
    if config.polymarket.max_pages == 0 {
        issues.push("polymarket.max_pages must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides, reading variables through `lookup`.
fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(demo) = lookup("USE_DEMO") {
        config.kalshi.use_demo = parse_bool(&demo);
    }
    if let Some(ttl) = lookup("MARKET_CACHE_TTL_SECS") {
        config.cache.ttl_secs = parse_u64(&ttl, "MARKET_CACHE_TTL_SECS")?;
    }
    if let Some(limit) = lookup("KALSHI_PAGE_LIMIT") {
        let parsed = parse_positive_usize(&limit, "KALSHI_PAGE_LIMIT")?;
        config.kalshi.page_limit = u32::try_from(parsed)
            .map_err(|_| Error::Config("KALSHI_PAGE_LIMIT is out of range".into()))?;
    }
    if let Some(size) = lookup("POLYMARKET_PAGE_SIZE") {
        config.polymarket.page_size = parse_positive_usize(&size, "POLYMARKET_PAGE_SIZE")?;
    }
    if let Some(pages) = lookup("POLYMARKET_MAX_PAGES") {
        config.polymarket.max_pages = parse_positive_usize(&pages, "POLYMARKET_MAX_PAGES")?;
    }
    Ok(())
}

/// Load configuration from environment and optional config file.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;
    Ok(config)
}
