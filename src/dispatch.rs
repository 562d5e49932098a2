//! JSON-lines tool dispatcher for `market-search serve`.
//!
//! One request per input line, one response per output line. A malformed
//! line or unknown tool produces an error response and the loop carries on.

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::config::AppConfig;
use kalshi_client::KalshiRestClient;
use polymarket_client::GammaClient;
use search_engine::providers::kalshi::{self, KalshiSearchService};
use search_engine::providers::polymarket::{self, PolymarketSearchService};
use search_engine::{SearchService, SnapshotSource};

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Kalshi,
    Polymarket,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Kalshi, Provider::Polymarket];

    pub fn name(self) -> &'static str {
        match self {
            Provider::Kalshi => kalshi::PROVIDER,
            Provider::Polymarket => polymarket::PROVIDER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Search,
    SearchEvents,
    SearchMarkets,
    GetMarket,
    GetEvent,
    CacheStats,
    RefreshCache,
}

/// Split a tool name like `polymarket_search_events` into provider and operation.
pub fn parse_tool(tool: &str) -> Option<(Provider, Operation)> {
    let (provider, op) = if let Some(op) = tool.strip_prefix("kalshi_") {
        (Provider::Kalshi, op)
    } else if let Some(op) = tool.strip_prefix("polymarket_") {
        (Provider::Polymarket, op)
    } else {
        return None;
    };

    let op = match op {
        "search" => Operation::Search,
        "search_events" => Operation::SearchEvents,
        "search_markets" => Operation::SearchMarkets,
        "get_market" => Operation::GetMarket,
        "get_event" => Operation::GetEvent,
        "cache_stats" => Operation::CacheStats,
        "refresh_cache" => Operation::RefreshCache,
        _ => return None,
    };
    Some((provider, op))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// `cache_stats` only: refresh synchronously before reporting.
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub key: Option<String>,
}

impl ToolRequest {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    fn key(&self) -> Result<&str> {
        self.key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("{} requires a non-empty \"key\"", self.tool))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(err: &anyhow::Error) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(format!("{err:#}")),
        }
    }
}

/// Both provider services, built from configuration.
#[derive(Clone)]
pub struct Services {
    pub kalshi: KalshiSearchService,
    pub polymarket: PolymarketSearchService,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> Result<Self, common::Error> {
        let kalshi_client = KalshiRestClient::new(config.kalshi.use_demo, config.kalshi.page_limit)?;
        let gamma_client = GammaClient::new(config.polymarket.page_size, config.polymarket.max_pages)?;
        Ok(Self {
            kalshi: kalshi::new_service(kalshi_client, config.cache.ttl_secs),
            polymarket: polymarket::new_service(gamma_client, config.cache.ttl_secs),
        })
    }

    pub async fn call(&self, provider: Provider, op: Operation, req: &ToolRequest) -> Result<Value> {
        match provider {
            Provider::Kalshi => run(&self.kalshi, op, req).await,
            Provider::Polymarket => run(&self.polymarket, op, req).await,
        }
    }

    /// Handle one input line.
    pub async fn handle_line(&self, line: &str) -> ToolResponse {
        match self.dispatch(line).await {
            Ok(result) => ToolResponse::success(result),
            Err(e) => {
                tracing::debug!("Tool call failed: {:#}", e);
                ToolResponse::failure(&e)
            }
        }
    }

    async fn dispatch(&self, line: &str) -> Result<Value> {
        let req: ToolRequest = serde_json::from_str(line).context("invalid request JSON")?;
        let Some((provider, op)) = parse_tool(&req.tool) else {
            bail!("unknown tool: {:?}", req.tool);
        };
        self.call(provider, op, &req).await
    }
}

async fn run<S>(service: &SearchService<S>, op: Operation, req: &ToolRequest) -> Result<Value>
where
    S: SnapshotSource,
    S::Event: Serialize,
    S::Market: Serialize,
{
    let value = match op {
        Operation::Search => serde_json::to_value(service.search(&req.query, req.limit()).await?)?,
        Operation::SearchEvents => {
            serde_json::to_value(service.search_events(&req.query, req.limit()).await?)?
        }
        Operation::SearchMarkets => {
            serde_json::to_value(service.search_markets(&req.query, req.limit()).await?)?
        }
        Operation::GetMarket => {
            let key = req.key()?;
            match service.get_market(key).await? {
                Some(market) => serde_json::to_value(market)?,
                None => bail!("{} market not found: {}", service.provider(), key),
            }
        }
        Operation::GetEvent => {
            let key = req.key()?;
            match service.get_event(key).await? {
                Some(event) => serde_json::to_value(event)?,
                None => bail!("{} event not found: {}", service.provider(), key),
            }
        }
        Operation::CacheStats => {
            if req.refresh {
                service.refresh().await?;
            }
            serde_json::to_value(service.stats().await)?
        }
        Operation::RefreshCache => {
            service.refresh().await?;
            serde_json::to_value(service.stats().await)?
        }
    };
    Ok(value)
}
