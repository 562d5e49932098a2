//! Polymarket (Gamma API): events and markets are both keyed by `slug`.

use std::borrow::Cow;

use common::{GammaEvent, GammaMarket};
use polymarket_client::GammaClient;
use tracing::info;

use crate::cache::{RecordSchema, RelevanceCache};
use crate::scoring::FieldWeight;
use crate::service::SearchService;
use crate::source::{Snapshot, SnapshotSource};

pub const PROVIDER: &str = "polymarket";

pub type PolymarketCache = RelevanceCache<GammaEvent, GammaMarket>;
pub type PolymarketSearchService = SearchService<GammaClient>;

fn opt(value: &Option<String>) -> Cow<'_, str> {
    Cow::Borrowed(value.as_deref().unwrap_or(""))
}

pub const EVENT_FIELDS: &[FieldWeight<GammaEvent>] = &[
    FieldWeight {
        name: "title",
        weight: 1.0,
        text: |e| opt(&e.title),
    },
    FieldWeight {
        name: "tags",
        weight: 0.6,
        text: |e| Cow::Owned(e.tag_labels().join(" ")),
    },
    FieldWeight {
        name: "slug",
        weight: 0.4,
        text: |e| opt(&e.slug),
    },
    FieldWeight {
        name: "description",
        weight: 0.3,
        text: |e| opt(&e.description),
    },
];

pub const MARKET_FIELDS: &[FieldWeight<GammaMarket>] = &[
    FieldWeight {
        name: "question",
        weight: 1.0,
        text: |m| opt(&m.question),
    },
    FieldWeight {
        name: "group_item_title",
        weight: 0.8,
        text: |m| opt(&m.group_item_title),
    },
    FieldWeight {
        name: "outcomes",
        weight: 0.6,
        text: |m| Cow::Owned(m.outcome_labels().join(" ")),
    },
    FieldWeight {
        name: "slug",
        weight: 0.4,
        text: |m| opt(&m.slug),
    },
    FieldWeight {
        name: "description",
        weight: 0.3,
        text: |m| opt(&m.description),
    },
];

pub const EVENT_SCHEMA: RecordSchema<GammaEvent> = RecordSchema {
    key: |e| e.slug.as_deref(),
    fields: EVENT_FIELDS,
};

pub const MARKET_SCHEMA: RecordSchema<GammaMarket> = RecordSchema {
    key: |m| m.slug.as_deref(),
    fields: MARKET_FIELDS,
};

pub fn new_cache() -> PolymarketCache {
    RelevanceCache::new(EVENT_SCHEMA, MARKET_SCHEMA)
}

pub fn new_service(client: GammaClient, ttl_secs: u64) -> PolymarketSearchService {
    SearchService::new(PROVIDER, client, new_cache(), ttl_secs)
}

/// A market is tradable unless Gamma marks it closed or inactive.
fn is_tradable(market: &GammaMarket) -> bool {
    market.closed != Some(true) && market.active != Some(false)
}

/// Tradable markets nested under `events`, flattened.
pub fn open_markets(events: &[GammaEvent]) -> Vec<GammaMarket> {
    events
        .iter()
        .flat_map(|e| e.markets.iter())
        .filter(|m| is_tradable(m))
        .cloned()
        .collect()
}

impl SnapshotSource for GammaClient {
    type Event = GammaEvent;
    type Market = GammaMarket;

    async fn fetch_snapshot(&self) -> Result<Snapshot<GammaEvent, GammaMarket>, common::Error> {
        let events = self.get_all_events().await?;
        let markets = open_markets(&events);
        info!(
            "Fetched Polymarket snapshot: {} events, {} markets",
            events.len(),
            markets.len()
        );
        Ok(Snapshot::new(events, markets))
    }
}
