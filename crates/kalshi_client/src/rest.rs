//! REST client for the Kalshi API.
//!
//! Covers the public read endpoints used to build search snapshots:
//! events (with nested markets) and single-market lookup.

use common::{Error, EventInfo, EventsResponse};
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::rate_limit::RateLimiter;

const DEMO_BASE_URL: &str = "https://demo-api.kalshi.co";
const PROD_BASE_URL: &str = "https://api.elections.kalshi.com";
const EVENTS_PATH: &str = "/trade-api/v2/events";

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_rest_base_url(use_demo: bool) -> String {
    if let Ok(override_url) = std::env::var("KALSHI_API_BASE_URL") {
        let normalized = normalize_base_url(&override_url);
        if !normalized.is_empty() {
            info!("Using KALSHI_API_BASE_URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty KALSHI_API_BASE_URL override");
    }

    if use_demo {
        DEMO_BASE_URL.to_string()
    } else {
        PROD_BASE_URL.to_string()
    }
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

/// Async REST client for Kalshi market data.
#[derive(Debug, Clone)]
pub struct KalshiRestClient {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    page_limit: u32,
}

impl KalshiRestClient {
    /// Create a new REST client.
    ///
    /// * `use_demo`: if true, points to demo URL unless `KALSHI_API_BASE_URL` is set.
    /// * `page_limit`: page size used when walking `/events`.
    pub fn new(use_demo: bool, page_limit: u32) -> Result<Self, Error> {
        Self::with_base_url(resolve_rest_base_url(use_demo), page_limit)
    }

    /// Create a client against an explicit base URL.
    pub fn with_base_url(base_url: impl AsRef<str>, page_limit: u32) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url.as_ref()),
            limiter: RateLimiter::new(),
            page_limit: page_limit.clamp(1, 200),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, Error> {
        self.limiter.wait_read().await;

        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let status_code = resp.status().as_u16();
        if status_code != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::KalshiApi {
                status: status_code,
                message: body,
            });
        }

        Ok(resp)
    }

    /// Fetch one page of events with optional nested markets.
    pub async fn get_events(
        &self,
        status: Option<&str>,
        with_nested_markets: bool,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<(Vec<EventInfo>, Option<String>), Error> {
        let mut query = vec![("with_nested_markets", with_nested_markets.to_string())];
        if let Some(s) = status {
            query.push(("status", s.to_string()));
        }
        if let Some(l) = limit {
            query.push(("limit", l.to_string()));
        }
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }

        let wrapper: EventsResponse = self
            .get(EVENTS_PATH, &query)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok((wrapper.events, wrapper.cursor))
    }

    /// Fetch every event with the given status, following the cursor.
    pub async fn get_all_events(
        &self,
        status: Option<&str>,
        with_nested_markets: bool,
    ) -> Result<Vec<EventInfo>, Error> {
        let mut all_events = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let (events, next_cursor) = self
                .get_events(
                    status,
                    with_nested_markets,
                    Some(self.page_limit),
                    cursor.as_deref(),
                )
                .await?;

            let count = events.len();
            all_events.extend(events);

            debug!("Fetched {} events (total: {})", count, all_events.len());

            match next_cursor {
                Some(c) if !c.is_empty() && count > 0 => cursor = Some(c),
                _ => break,
            }
        }

        Ok(all_events)
    }
}
