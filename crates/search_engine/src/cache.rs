//! In-memory relevance cache for one provider's events and markets.
//!
//! The cache is a plain data structure; callers that share it across tasks
//! wrap it in a lock (see [`SearchService`](crate::SearchService)), so a
//! populate or refresh is always applied as one unit.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::scoring::{score_lowered_fields, tokenize, FieldWeight};

/// How to key and score one record type.
pub struct RecordSchema<T: 'static> {
    /// Stable identifier. `None` or an empty string drops the record.
    pub key: fn(&T) -> Option<&str>,
    pub fields: &'static [FieldWeight<T>],
}

impl<T: 'static> Clone for RecordSchema<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for RecordSchema<T> {}

impl<T: 'static> RecordSchema<T> {
    fn key_of<'a>(&self, record: &'a T) -> Option<&'a str> {
        (self.key)(record).filter(|k| !k.is_empty())
    }

    fn index(&self, record: T) -> Indexed<T> {
        let text = self
            .fields
            .iter()
            .map(|field| (field.text)(&record).to_lowercase())
            .collect();
        Indexed { record, text }
    }
}

/// A stored record with its lowercased field text, aligned with the schema's
/// field table. Built once per populate/refresh so queries only scan.
struct Indexed<T> {
    record: T,
    text: Vec<String>,
}

/// A scored record.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<T> {
    pub score: f64,
    pub item: T,
}

/// A record from either collection, tagged with its kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "item", rename_all = "snake_case")]
pub enum MatchedRecord<E, M> {
    Event(E),
    Market(M),
}

/// A scored record from a combined events + markets search.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedHit<E, M> {
    pub score: f64,
    #[serde(flatten)]
    pub record: MatchedRecord<E, M>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Empty,
    Ready,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub status: CacheStatus,
    pub event_count: usize,
    pub market_count: usize,
    /// Whole seconds since the last populate/refresh; `None` if never populated.
    pub cache_age_seconds: Option<u64>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_refresh_duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct RefreshMark {
    at: DateTime<Utc>,
    instant: Instant,
}

/// Keyed event and market collections with weighted text search.
pub struct RelevanceCache<E: 'static, M: 'static> {
    event_schema: RecordSchema<E>,
    market_schema: RecordSchema<M>,
    events: HashMap<String, Indexed<E>>,
    markets: HashMap<String, Indexed<M>>,
    last_refresh: Option<RefreshMark>,
    last_refresh_duration_ms: u64,
}

fn insert_keyed<T: 'static>(
    schema: &RecordSchema<T>,
    target: &mut HashMap<String, Indexed<T>>,
    records: Vec<T>,
) -> usize {
    let mut skipped = 0;
    for record in records {
        match schema.key_of(&record) {
            Some(key) => {
                let key = key.to_string();
                target.insert(key, schema.index(record));
            }
            None => skipped += 1,
        }
    }
    skipped
}

fn merge_keyed<T: 'static>(
    schema: &RecordSchema<T>,
    target: &mut HashMap<String, Indexed<T>>,
    records: Vec<T>,
) -> usize {
    let incoming: HashSet<String> = records
        .iter()
        .filter_map(|r| schema.key_of(r).map(str::to_string))
        .collect();
    target.retain(|key, _| incoming.contains(key));
    insert_keyed(schema, target, records)
}

fn rank<'a, T>(
    tokens: &'a [String],
    schema: &RecordSchema<T>,
    records: impl Iterator<Item = &'a Indexed<T>> + 'a,
) -> impl Iterator<Item = (f64, &'a T)> + 'a
where
    T: 'static,
{
    let fields = schema.fields;
    records.filter_map(move |indexed| {
        let score = score_lowered_fields(tokens, &indexed.text, fields);
        (score > 0.0).then_some((score, &indexed.record))
    })
}

impl<E: Clone + 'static, M: Clone + 'static> RelevanceCache<E, M> {
    pub fn new(event_schema: RecordSchema<E>, market_schema: RecordSchema<M>) -> Self {
        Self {
            event_schema,
            market_schema,
            events: HashMap::new(),
            markets: HashMap::new(),
            last_refresh: None,
            last_refresh_duration_ms: 0,
        }
    }

    /// Replace both collections with a fresh snapshot.
    pub fn populate(&mut self, events: Vec<E>, markets: Vec<M>) {
        let started = Instant::now();
        self.events.clear();
        self.markets.clear();
        let skipped = insert_keyed(&self.event_schema, &mut self.events, events)
            + insert_keyed(&self.market_schema, &mut self.markets, markets);
        if skipped > 0 {
            debug!("Skipped {} records without a key", skipped);
        }
        self.mark_refreshed(started);
    }

    /// Merge a snapshot: upsert every keyed record, prune keys the snapshot omits.
    pub fn refresh(&mut self, events: Vec<E>, markets: Vec<M>) {
        let started = Instant::now();
        let skipped = merge_keyed(&self.event_schema, &mut self.events, events)
            + merge_keyed(&self.market_schema, &mut self.markets, markets);
        if skipped > 0 {
            debug!("Skipped {} records without a key", skipped);
        }
        self.mark_refreshed(started);
    }

    fn mark_refreshed(&mut self, started: Instant) {
        let now = Instant::now();
        self.last_refresh_duration_ms = now.duration_since(started).as_millis() as u64;
        self.last_refresh = Some(RefreshMark {
            at: Utc::now(),
            instant: now,
        });
    }

    /// True once `populate` or `refresh` has run, even with an empty snapshot.
    pub fn is_populated(&self) -> bool {
        self.last_refresh.is_some()
    }

    pub fn cache_age_seconds(&self) -> Option<u64> {
        self.last_refresh.map(|mark| mark.instant.elapsed().as_secs())
    }

    pub fn search_events(&self, query: &str, limit: usize) -> Vec<SearchHit<E>> {
        let tokens = tokenize(query);
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(f64, &E)> = rank(&tokens, &self.event_schema, self.events.values()).collect();
        sort_and_truncate(&mut scored, limit, |(score, _)| *score);
        scored
            .into_iter()
            .map(|(score, item)| SearchHit {
                score,
                item: item.clone(),
            })
            .collect()
    }

    pub fn search_markets(&self, query: &str, limit: usize) -> Vec<SearchHit<M>> {
        let tokens = tokenize(query);
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(f64, &M)> = rank(&tokens, &self.market_schema, self.markets.values()).collect();
        sort_and_truncate(&mut scored, limit, |(score, _)| *score);
        scored
            .into_iter()
            .map(|(score, item)| SearchHit {
                score,
                item: item.clone(),
            })
            .collect()
    }

    /// Search events and markets together, interleaved by score.
    pub fn search(&self, query: &str, limit: usize) -> Vec<CombinedHit<E, M>> {
        let tokens = tokenize(query);
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        // Rank on borrowed records first so only the survivors get cloned.
        let mut scored: Vec<(f64, MatchedRecord<&E, &M>)> = rank(&tokens, &self.event_schema, self.events.values())
            .map(|(score, e)| (score, MatchedRecord::Event(e)))
            .chain(
                rank(&tokens, &self.market_schema, self.markets.values())
                    .map(|(score, m)| (score, MatchedRecord::Market(m))),
            )
            .collect();
        sort_and_truncate(&mut scored, limit, |(score, _)| *score);

        scored
            .into_iter()
            .map(|(score, record)| CombinedHit {
                score,
                record: match record {
                    MatchedRecord::Event(e) => MatchedRecord::Event(e.clone()),
                    MatchedRecord::Market(m) => MatchedRecord::Market(m.clone()),
                },
            })
            .collect()
    }

    pub fn get_event(&self, key: &str) -> Option<&E> {
        self.events.get(key).map(|indexed| &indexed.record)
    }

    pub fn get_market(&self, key: &str) -> Option<&M> {
        self.markets.get(key).map(|indexed| &indexed.record)
    }

    pub fn stats(&self) -> CacheStats {
        let status = if self.events.is_empty() && self.markets.is_empty() {
            CacheStatus::Empty
        } else {
            CacheStatus::Ready
        };
        CacheStats {
            status,
            event_count: self.events.len(),
            market_count: self.markets.len(),
            cache_age_seconds: self.cache_age_seconds(),
            last_refresh: self.last_refresh.map(|mark| mark.at),
            last_refresh_duration_ms: self.last_refresh_duration_ms,
        }
    }
}

fn sort_and_truncate<T>(hits: &mut Vec<T>, limit: usize, score: impl Fn(&T) -> f64) {
    hits.sort_by(|a, b| score(b).total_cmp(&score(a)));
    hits.truncate(limit);
}
