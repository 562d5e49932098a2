//! market-search: relevance search over Kalshi and Polymarket markets.
//!
//! Each provider's open events and markets are fetched once into an
//! in-memory cache, scored per query, and refreshed in the background when
//! the cache outlives its TTL.

mod config;
mod dispatch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::future::join_all;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use dispatch::{Operation, Provider, Services, ToolRequest, DEFAULT_LIMIT};

/// Prediction market search
#[derive(Parser)]
#[command(name = "market-search", about = "Relevance search over Kalshi and Polymarket markets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search events and/or markets and print the ranked hits as JSON.
    Search {
        query: String,
        /// Limit to one provider (default: both).
        #[arg(long, value_enum)]
        provider: Option<Provider>,
        #[arg(long, value_enum, default_value_t = Kind::All)]
        kind: Kind,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Print cache statistics.
    Stats {
        #[arg(long, value_enum)]
        provider: Option<Provider>,
        /// Fetch a fresh snapshot before reporting.
        #[arg(long)]
        refresh: bool,
    },
    /// Answer JSON-lines tool requests on stdin until EOF.
    Serve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    All,
    Events,
    Markets,
}

impl Kind {
    fn operation(self) -> Operation {
        match self {
            Kind::All => Operation::Search,
            Kind::Events => Operation::SearchEvents,
            Kind::Markets => Operation::SearchMarkets,
        }
    }
}

fn selected(provider: Option<Provider>) -> Vec<Provider> {
    provider.map_or_else(|| Provider::ALL.to_vec(), |p| vec![p])
}

/// Run `op` against each provider concurrently, keyed by provider name.
async fn call_each(
    services: &Services,
    providers: &[Provider],
    op: Operation,
    req: &ToolRequest,
) -> Result<Value> {
    let calls = providers.iter().map(|&p| async move {
        let value = services
            .call(p, op, req)
            .await
            .with_context(|| format!("{} request failed", p.name()))?;
        Ok::<_, anyhow::Error>((p.name().to_string(), value))
    });

    let mut out = Map::new();
    for result in join_all(calls).await {
        let (name, value) = result?;
        out.insert(name, value);
    }
    Ok(Value::Object(out))
}

async fn serve(services: &Services) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("Serving tool requests on stdin");
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = services.handle_line(&line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config()?;
    info!(
        "Cache TTL {}s, Kalshi {} environment",
        cfg.cache.ttl_secs,
        if cfg.kalshi.use_demo { "demo" } else { "production" }
    );
    let services = Services::from_config(&cfg)?;

    let output = match cli.command {
        Command::Search {
            query,
            provider,
            kind,
            limit,
        } => {
            let req = ToolRequest {
                query,
                limit: Some(limit),
                ..ToolRequest::default()
            };
            call_each(&services, &selected(provider), kind.operation(), &req).await?
        }
        Command::Stats { provider, refresh } => {
            let req = ToolRequest {
                refresh,
                ..ToolRequest::default()
            };
            call_each(&services, &selected(provider), Operation::CacheStats, &req).await?
        }
        Command::Serve => {
            serve(&services).await?;
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging. stdout carries JSON output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "market_search=info,search_engine=info,kalshi_client=info,polymarket_client=info"
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
