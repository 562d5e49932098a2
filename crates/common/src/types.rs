//! Domain types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Kalshi Types ──────────────────────────────────────────────────────

/// A Kalshi market as returned by GET /trade-api/v2/markets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketInfo {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default)]
    pub market_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub yes_sub_title: String,
    #[serde(default)]
    pub no_sub_title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub yes_bid: i64,
    #[serde(default)]
    pub yes_ask: i64,
    #[serde(default)]
    pub no_bid: i64,
    #[serde(default)]
    pub no_ask: i64,
    #[serde(default)]
    pub last_price: i64,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub volume_24h: i64,
    #[serde(default)]
    pub open_interest: i64,
    #[serde(default)]
    pub liquidity: i64,
    #[serde(default)]
    pub rules_primary: String,
    #[serde(default)]
    pub rules_secondary: String,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiration_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<String>,
}

/// A Kalshi event as returned by GET /trade-api/v2/events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventInfo {
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default)]
    pub series_ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sub_title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub mutually_exclusive: bool,
    #[serde(default)]
    pub strike_date: Option<DateTime<Utc>>,
    /// Present when requested with `with_nested_markets=true`.
    #[serde(default)]
    pub markets: Vec<MarketInfo>,
}

/// Paginated response from GET /trade-api/v2/events.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub events: Vec<EventInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
}

// ── Polymarket (Gamma API) Types ──────────────────────────────────────

/// Tag/category attached to a Gamma event (e.g. "Politics", "Crypto").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GammaTag {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// A binary-outcome market from the Gamma API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub group_item_title: Option<String>,
    /// JSON-encoded array of outcome labels, e.g. `["Yes","No"]`.
    #[serde(default)]
    pub outcomes: Option<String>,
    /// JSON-encoded array of decimal price strings, aligned with `outcomes`.
    #[serde(default)]
    pub outcome_prices: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub best_bid: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub best_ask: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub last_trade_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub liquidity: Option<f64>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl GammaMarket {
    /// Outcome labels decoded from the stringified JSON array.
    pub fn outcome_labels(&self) -> Vec<String> {
        self.outcomes
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// A Gamma event with its nested markets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub tags: Vec<GammaTag>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub markets: Vec<GammaMarket>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub liquidity: Option<f64>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl GammaEvent {
    /// Non-empty tag labels, in API order.
    pub fn tag_labels(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter_map(|t| t.label.as_deref())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

/// Gamma returns numeric fields as either JSON numbers or decimal strings.
fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(f64),
        Str(String),
    }

    Ok(match Option::<NumOrString>::deserialize(deserializer)? {
        Some(NumOrString::Num(n)) => Some(n),
        Some(NumOrString::Str(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Treat an explicit `null` array the same as a missing one.
fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
