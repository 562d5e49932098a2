//! REST client for the Polymarket Gamma API.
//!
//! Events are fetched from `/events` rather than `/markets` so that each
//! market arrives nested under its parent event with the event's tags.

use common::{Error, GammaEvent, GammaMarket};
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

/// Pause between pages to stay polite with the public API.
const PAGE_DELAY: Duration = Duration::from_millis(100);

fn resolve_gamma_base_url() -> String {
    if let Ok(override_url) = std::env::var("POLYMARKET_GAMMA_URL") {
        let normalized = override_url.trim().trim_end_matches('/').to_string();
        if !normalized.is_empty() {
            info!("Using POLYMARKET_GAMMA_URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty POLYMARKET_GAMMA_URL override");
    }
    GAMMA_API_BASE.to_string()
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
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

/// Async client for the Gamma API.
#[derive(Debug, Clone)]
pub struct GammaClient {
    http: reqwest::Client,
    base_url: String,
    page_size: usize,
    max_pages: usize,
}

impl GammaClient {
    /// Create a client against the public Gamma API (or `POLYMARKET_GAMMA_URL`).
    pub fn new(page_size: usize, max_pages: usize) -> Result<Self, Error> {
        Self::with_base_url(resolve_gamma_base_url(), page_size, max_pages)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        page_size: usize,
        max_pages: usize,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let status_code = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::PolymarketApi {
                status: status_code,
                message: body,
            });
        }

        resp.json()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))
    }

    /// Fetch one page of active, open events with nested markets.
    pub async fn get_events_page(&self, limit: usize, offset: usize) -> Result<Vec<GammaEvent>, Error> {
        self.get_json(
            "/events",
            &[
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    /// Fetch all active events, walking offsets until a short page or the page cap.
    pub async fn get_all_events(&self) -> Result<Vec<GammaEvent>, Error> {
        let mut all_events = Vec::new();
        let mut offset = 0;

        for page in 0..self.max_pages {
            if page > 0 {
                tokio::time::sleep(PAGE_DELAY).await;
            }

            let events = self.get_events_page(self.page_size, offset).await?;
            let fetched = events.len();
            all_events.extend(events);

            debug!(
                "Fetched events page {} ({} events, total: {})",
                page + 1,
                fetched,
                all_events.len()
            );

            if fetched < self.page_size {
                return Ok(all_events);
            }
            offset += self.page_size;
        }

        warn!(
            "Reached max pages limit ({}), snapshot may be partial",
            self.max_pages
        );
        Ok(all_events)
    }
}
