//! Kalshi: events keyed by `event_ticker`, markets keyed by `ticker`.

use std::borrow::Cow;

use common::{EventInfo, MarketInfo};
use kalshi_client::KalshiRestClient;
use tracing::info;

use crate::cache::{RecordSchema, RelevanceCache};
use crate::scoring::FieldWeight;
use crate::service::SearchService;
use crate::source::{Snapshot, SnapshotSource};

pub const PROVIDER: &str = "kalshi";

pub type KalshiCache = RelevanceCache<EventInfo, MarketInfo>;
pub type KalshiSearchService = SearchService<KalshiRestClient>;

pub const EVENT_FIELDS: &[FieldWeight<EventInfo>] = &[
    FieldWeight {
        name: "title",
        weight: 1.0,
        text: |e| Cow::Borrowed(e.title.as_str()),
    },
    FieldWeight {
        name: "sub_title",
        weight: 0.8,
        text: |e| Cow::Borrowed(e.sub_title.as_str()),
    },
    FieldWeight {
        name: "category",
        weight: 0.5,
        text: |e| Cow::Borrowed(e.category.as_str()),
    },
    FieldWeight {
        name: "series_ticker",
        weight: 0.4,
        text: |e| Cow::Borrowed(e.series_ticker.as_str()),
    },
    FieldWeight {
        name: "event_ticker",
        weight: 0.3,
        text: |e| Cow::Borrowed(e.event_ticker.as_str()),
    },
];

pub const MARKET_FIELDS: &[FieldWeight<MarketInfo>] = &[
    FieldWeight {
        name: "title",
        weight: 1.0,
        text: |m| Cow::Borrowed(m.title.as_str()),
    },
    FieldWeight {
        name: "subtitle",
        weight: 0.8,
        text: |m| Cow::Borrowed(m.subtitle.as_str()),
    },
    FieldWeight {
        name: "yes_sub_title",
        weight: 0.6,
        text: |m| Cow::Borrowed(m.yes_sub_title.as_str()),
    },
    FieldWeight {
        name: "no_sub_title",
        weight: 0.4,
        text: |m| Cow::Borrowed(m.no_sub_title.as_str()),
    },
    FieldWeight {
        name: "event_ticker",
        weight: 0.4,
        text: |m| Cow::Borrowed(m.event_ticker.as_str()),
    },
    FieldWeight {
        name: "ticker",
        weight: 0.3,
        text: |m| Cow::Borrowed(m.ticker.as_str()),
    },
    FieldWeight {
        name: "rules_primary",
        weight: 0.3,
        text: |m| Cow::Borrowed(m.rules_primary.as_str()),
    },
];

pub const EVENT_SCHEMA: RecordSchema<EventInfo> = RecordSchema {
    key: |e| Some(e.event_ticker.as_str()),
    fields: EVENT_FIELDS,
};

pub const MARKET_SCHEMA: RecordSchema<MarketInfo> = RecordSchema {
    key: |m| Some(m.ticker.as_str()),
    fields: MARKET_FIELDS,
};

pub fn new_cache() -> KalshiCache {
    RelevanceCache::new(EVENT_SCHEMA, MARKET_SCHEMA)
}

pub fn new_service(client: KalshiRestClient, ttl_secs: u64) -> KalshiSearchService {
    SearchService::new(PROVIDER, client, new_cache(), ttl_secs)
}

/// Flatten the markets nested under each event into one list.
pub fn nested_markets(events: &[EventInfo]) -> Vec<MarketInfo> {
    events.iter().flat_map(|e| e.markets.iter().cloned()).collect()
}

impl SnapshotSource for KalshiRestClient {
    type Event = EventInfo;
    type Market = MarketInfo;

    async fn fetch_snapshot(&self) -> Result<Snapshot<EventInfo, MarketInfo>, common::Error> {
        let events = self.get_all_events(Some("open"), true).await?;
        let markets = nested_markets(&events);
        info!(
            "Fetched Kalshi snapshot: {} events, {} markets",
            events.len(),
            markets.len()
        );
        Ok(Snapshot::new(events, markets))
    }
}
