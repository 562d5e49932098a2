//! Search service: "ensure fresh, then query" over one provider's cache.
//!
//! Lifecycle is `Empty → Populating → Ready`. Once ready, queries are always
//! answered from the current snapshot; a TTL-expired cache schedules one
//! background refresh and keeps serving the old data until it lands.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CombinedHit, RelevanceCache, SearchHit};
use crate::error::SearchError;
use crate::refresh_guard::RefreshGuard;
use crate::source::SnapshotSource;
use crate::ttl;

type PopulateTask = Shared<BoxFuture<'static, Result<(), SearchError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Empty,
    Populating,
    Ready,
}

/// Cache statistics plus freshness information.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub provider: &'static str,
    pub state: ServiceState,
    #[serde(flatten)]
    pub cache: CacheStats,
    pub ttl_seconds: u64,
    pub expires_in_seconds: Option<u64>,
    pub refreshing: bool,
}

struct Inner<S: SnapshotSource> {
    provider: &'static str,
    source: S,
    cache: RwLock<RelevanceCache<S::Event, S::Market>>,
    ttl_secs: u64,
    guard: RefreshGuard,
    populating: Mutex<Option<PopulateTask>>,
    /// Held across every fetch-and-apply so snapshots land in fetch order.
    fetch_lock: Mutex<()>,
}

impl<S: SnapshotSource> Inner<S> {
    async fn populate_from_source(&self) -> Result<(), SearchError> {
        let _fetching = self.fetch_lock.lock().await;
        // A manual refresh may have filled the cache while we waited.
        if self.cache.read().await.is_populated() {
            return Ok(());
        }

        let started = Instant::now();
        info!("Populating {} search cache", self.provider);

        let snapshot = match self.source.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("{} cache population failed: {}", self.provider, e);
                return Err(SearchError::fetch(self.provider, e));
            }
        };

        let (event_count, market_count) = (snapshot.events.len(), snapshot.markets.len());
        self.cache
            .write()
            .await
            .populate(snapshot.events, snapshot.markets);

        info!(
            "{} search cache populated: {} events, {} markets in {}ms",
            self.provider,
            event_count,
            market_count,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    async fn refresh_from_source(&self) -> Result<(), SearchError> {
        let _fetching = self.fetch_lock.lock().await;
        let started = Instant::now();
        debug!("Refreshing {} search cache", self.provider);

        let snapshot = self
            .source
            .fetch_snapshot()
            .await
            .map_err(|e| SearchError::fetch(self.provider, e))?;

        let (event_count, market_count) = (snapshot.events.len(), snapshot.markets.len());
        self.cache
            .write()
            .await
            .refresh(snapshot.events, snapshot.markets);

        info!(
            "{} search cache refreshed: {} events, {} markets in {}ms",
            self.provider,
            event_count,
            market_count,
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

/// Orchestrates one relevance cache, its snapshot source, the TTL policy
/// and a background refresh guard. Clones share the same cache.
pub struct SearchService<S: SnapshotSource> {
    inner: Arc<Inner<S>>,
}

impl<S: SnapshotSource> Clone for SearchService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SnapshotSource> SearchService<S> {
    /// * `ttl_secs`: cache age that triggers a background refresh; 0 disables it.
    pub fn new(
        provider: &'static str,
        source: S,
        cache: RelevanceCache<S::Event, S::Market>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                source,
                cache: RwLock::new(cache),
                ttl_secs,
                guard: RefreshGuard::new(),
                populating: Mutex::new(None),
                fetch_lock: Mutex::new(()),
            }),
        }
    }

    pub fn provider(&self) -> &'static str {
        self.inner.provider
    }

    pub fn ttl_secs(&self) -> u64 {
        self.inner.ttl_secs
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.guard.is_refreshing()
    }

    pub async fn state(&self) -> ServiceState {
        if self.inner.cache.read().await.is_populated() {
            ServiceState::Ready
        } else if self.inner.populating.lock().await.is_some() {
            ServiceState::Populating
        } else {
            ServiceState::Empty
        }
    }

    /// Make sure there is a snapshot to query.
    ///
    /// Only a cold cache waits on I/O; concurrent cold callers share a single
    /// fetch and all observe its outcome. A ready but expired cache returns
    /// at once after scheduling a background refresh.
    pub async fn ensure_populated(&self) -> Result<(), SearchError> {
        let age = self.inner.cache.read().await.cache_age_seconds();
        if age.is_some() {
            if ttl::is_expired(age, self.inner.ttl_secs) {
                self.trigger_background_refresh();
            }
            return Ok(());
        }

        let task = {
            let mut slot = self.inner.populating.lock().await;
            match slot.as_ref() {
                Some(task) => task.clone(),
                None => {
                    // A population may have finished between the age check and the lock.
                    if self.inner.cache.read().await.is_populated() {
                        return Ok(());
                    }
                    let task = Self::population_task(Arc::clone(&self.inner));
                    *slot = Some(task.clone());
                    task
                }
            }
        };

        task.await
    }

    fn population_task(inner: Arc<Inner<S>>) -> PopulateTask {
        async move {
            let result = inner.populate_from_source().await;
            // Cleared on failure too, so the next caller starts a fresh attempt.
            inner.populating.lock().await.take();
            result
        }
        .boxed()
        .shared()
    }

    /// Schedule a detached refresh unless one is already running.
    fn trigger_background_refresh(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        let started = self.inner.guard.trigger(async move {
            if let Err(e) = inner.refresh_from_source().await {
                warn!("Background refresh failed, serving last snapshot: {}", e);
            }
        });
        if started {
            debug!("{} cache expired, background refresh started", self.inner.provider);
        }
        started
    }

    /// Fetch and merge a new snapshot now, regardless of TTL. Waits for any
    /// fetch already in progress, background or cold start, to finish first.
    pub async fn refresh(&self) -> Result<(), SearchError> {
        self.inner.refresh_from_source().await
    }

    pub async fn search_events(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit<S::Event>>, SearchError> {
        self.ensure_populated().await?;
        Ok(self.inner.cache.read().await.search_events(query, limit))
    }

    pub async fn search_markets(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit<S::Market>>, SearchError> {
        self.ensure_populated().await?;
        Ok(self.inner.cache.read().await.search_markets(query, limit))
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CombinedHit<S::Event, S::Market>>, SearchError> {
        self.ensure_populated().await?;
        Ok(self.inner.cache.read().await.search(query, limit))
    }

    pub async fn get_event(&self, key: &str) -> Result<Option<S::Event>, SearchError> {
        self.ensure_populated().await?;
        Ok(self.inner.cache.read().await.get_event(key).cloned())
    }

    pub async fn get_market(&self, key: &str) -> Result<Option<S::Market>, SearchError> {
        self.ensure_populated().await?;
        Ok(self.inner.cache.read().await.get_market(key).cloned())
    }

    pub async fn stats(&self) -> ServiceStats {
        let cache = self.inner.cache.read().await.stats();
        let state = if cache.cache_age_seconds.is_some() {
            ServiceState::Ready
        } else if self.inner.populating.lock().await.is_some() {
            ServiceState::Populating
        } else {
            ServiceState::Empty
        };

        ServiceStats {
            provider: self.inner.provider,
            state,
            expires_in_seconds: ttl::expires_in_seconds(cache.cache_age_seconds, self.inner.ttl_secs),
            ttl_seconds: self.inner.ttl_secs,
            refreshing: self.inner.guard.is_refreshing(),
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStatus;
    use crate::providers::kalshi;
    use crate::source::Snapshot;
    use common::{EventInfo, MarketInfo};
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct MockSource {
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        failures_left: Arc<AtomicUsize>,
        delay: Duration,
        snapshot: Arc<std::sync::Mutex<Snapshot<EventInfo, MarketInfo>>>,
    }

    impl MockSource {
        fn with_events(events: Vec<EventInfo>, delay: Duration) -> Self {
            let source = Self {
                delay,
                ..Self::default()
            };
            source.set_events(events);
            source
        }

        fn set_events(&self, events: Vec<EventInfo>) {
            let markets = events.iter().flat_map(|e| e.markets.clone()).collect();
            *self.snapshot.lock().unwrap() = Snapshot::new(events, markets);
        }

        fn fail_next(&self, n: usize) {
            self.failures_left.store(n, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    impl SnapshotSource for MockSource {
        type Event = EventInfo;
        type Market = MarketInfo;

        async fn fetch_snapshot(&self) -> Result<Snapshot<EventInfo, MarketInfo>, common::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(common::Error::Http("connection reset by peer".into()));
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }
    }

    fn event(ticker: &str, title: &str) -> EventInfo {
        EventInfo {
            event_ticker: ticker.into(),
            title: title.into(),
            ..EventInfo::default()
        }
    }

    fn sample_events() -> Vec<EventInfo> {
        vec![
            event("E1", "Presidential Election 2028"),
            event("E2", "Super Bowl Winner"),
        ]
    }

    fn service(source: &MockSource, ttl_secs: u64) -> SearchService<MockSource> {
        SearchService::new("kalshi", source.clone(), kalshi::new_cache(), ttl_secs)
    }

    async fn wait_for_background(service: &SearchService<MockSource>) {
        while service.is_refreshing() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_cold_start_fetches_once() {
        let source = MockSource::with_events(sample_events(), Duration::from_millis(50));
        let service = service(&source, 3600);

        let results = join_all((0..16).map(|_| service.ensure_populated())).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(source.calls(), 1);
        assert_eq!(service.state().await, ServiceState::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_cold_searches_fetch_once() {
        let source = MockSource::with_events(sample_events(), Duration::from_millis(20));
        let service = service(&source, 3600);

        let results = join_all((0..8).map(|_| service.search_events("presidential", 10))).await;

        assert_eq!(source.calls(), 1);
        for hits in results {
            let hits = hits.unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].item.event_ticker, "E1");
        }
    }

    #[tokio::test]
    async fn test_cold_start_failure_reaches_every_waiter_then_retries() {
        let source = MockSource::with_events(sample_events(), Duration::from_millis(20));
        source.fail_next(1);
        let service = service(&source, 3600);

        let results = join_all((0..5).map(|_| service.ensure_populated())).await;
        assert!(results.iter().all(|r| matches!(r, Err(SearchError::Fetch { .. }))));
        assert_eq!(source.calls(), 1);
        assert_eq!(service.state().await, ServiceState::Empty);

        service.ensure_populated().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(service.state().await, ServiceState::Ready);
    }

    #[tokio::test]
    async fn test_warm_cache_does_no_io() {
        let source = MockSource::with_events(sample_events(), Duration::ZERO);
        let service = service(&source, 3600);

        service.ensure_populated().await.unwrap();
        service.search("election", 5).await.unwrap();
        service.search_markets("election", 5).await.unwrap();
        assert_eq!(source.calls(), 1);
        assert!(!service.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_triggers_single_background_refresh() {
        let source = MockSource::with_events(sample_events(), Duration::from_secs(5));
        let service = service(&source, 60);
        service.ensure_populated().await.unwrap();
        assert_eq!(source.calls(), 1);

        source.set_events(vec![event("E3", "Fed Rate Decision December")]);
        tokio::time::advance(Duration::from_secs(61)).await;

        let results = join_all((0..16).map(|_| service.ensure_populated())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        // Every caller returned while the refresh is still sleeping in the source.
        assert!(service.is_refreshing());
        assert!(service.search_events("fed", 10).await.unwrap().is_empty());

        wait_for_background(&service).await;
        assert_eq!(source.calls(), 2);

        let hits = service.search_events("fed", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(service.search_events("presidential", 10).await.unwrap().is_empty());
        assert_eq!(service.stats().await.cache.cache_age_seconds, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_failure_keeps_last_snapshot() {
        let source = MockSource::with_events(sample_events(), Duration::from_millis(100));
        let service = service(&source, 60);
        service.ensure_populated().await.unwrap();

        source.fail_next(1);
        tokio::time::advance(Duration::from_secs(120)).await;
        service.ensure_populated().await.unwrap();
        wait_for_background(&service).await;
        assert_eq!(source.calls(), 2);

        let hits = service.search_events("presidential", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        let stats = service.stats().await;
        assert_eq!(stats.state, ServiceState::Ready);
        assert_eq!(stats.cache.status, CacheStatus::Ready);
        assert!(stats.cache.cache_age_seconds >= Some(120));

        // Still expired: queries keep scheduling attempts until one lands.
        service.ensure_populated().await.unwrap();
        wait_for_background(&service).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(service.stats().await.cache.cache_age_seconds, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_refreshes_in_background() {
        let source = MockSource::with_events(sample_events(), Duration::ZERO);
        let service = service(&source, 0);
        service.ensure_populated().await.unwrap();

        tokio::time::advance(Duration::from_secs(10 * 24 * 3600)).await;
        service.ensure_populated().await.unwrap();

        assert!(!service.is_refreshing());
        assert_eq!(source.calls(), 1);
        assert_eq!(service.stats().await.expires_in_seconds, None);
    }

    #[tokio::test]
    async fn test_manual_refresh_propagates_failure_and_keeps_data() {
        let source = MockSource::with_events(sample_events(), Duration::ZERO);
        let service = service(&source, 3600);
        service.ensure_populated().await.unwrap();

        source.fail_next(1);
        let err = service.refresh().await.unwrap_err();
        assert!(err.to_string().contains("kalshi snapshot fetch failed"));
        assert_eq!(service.stats().await.cache.event_count, 2);
    }

    #[tokio::test]
    async fn test_manual_refresh_prunes_missing_records() {
        let source = MockSource::with_events(sample_events(), Duration::ZERO);
        let service = service(&source, 3600);
        service.ensure_populated().await.unwrap();

        source.set_events(vec![event("E1", "Presidential Election 2028 (updated)")]);
        service.refresh().await.unwrap();

        assert!(service.get_event("E2").await.unwrap().is_none());
        let e1 = service.get_event("E1").await.unwrap().unwrap();
        assert!(e1.title.ends_with("(updated)"));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_waits_for_background_refresh() {
        let source = MockSource::with_events(sample_events(), Duration::from_secs(1));
        let service = service(&source, 60);
        service.ensure_populated().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        service.ensure_populated().await.unwrap();
        assert!(service.is_refreshing());

        source.set_events(vec![event("E3", "Fed Rate Decision December")]);
        service.refresh().await.unwrap();
        wait_for_background(&service).await;

        assert_eq!(source.calls(), 3);
        assert_eq!(source.max_in_flight(), 1);
        assert_eq!(service.search_events("fed", 10).await.unwrap().len(), 1);
        assert!(service.get_event("E1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_start_reuses_concurrent_manual_refresh() {
        let source = MockSource::with_events(sample_events(), Duration::from_secs(1));
        let service = service(&source, 3600);

        let (refreshed, populated) = tokio::join!(service.refresh(), service.ensure_populated());
        refreshed.unwrap();
        populated.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(source.max_in_flight(), 1);
        assert_eq!(service.state().await, ServiceState::Ready);
    }

    #[tokio::test]
    async fn test_refresh_on_cold_service_makes_it_ready() {
        let source = MockSource::with_events(sample_events(), Duration::ZERO);
        let service = service(&source, 3600);
        service.refresh().await.unwrap();
        assert_eq!(service.state().await, ServiceState::Ready);
        service.search("super bowl", 10).await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_report_expiry() {
        let source = MockSource::with_events(sample_events(), Duration::ZERO);
        let service = service(&source, 3600);

        let stats = service.stats().await;
        assert_eq!(stats.state, ServiceState::Empty);
        assert_eq!(stats.cache.status, CacheStatus::Empty);
        assert_eq!(stats.expires_in_seconds, None);

        service.ensure_populated().await.unwrap();
        assert_eq!(service.stats().await.expires_in_seconds, Some(3600));

        tokio::time::advance(Duration::from_secs(600)).await;
        let stats = service.stats().await;
        assert_eq!(stats.expires_in_seconds, Some(3000));
        assert_eq!(stats.cache.event_count, 2);
        assert_eq!(stats.provider, "kalshi");
        assert_eq!(stats.ttl_seconds, 3600);
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_ready_but_reports_empty() {
        let source = MockSource::with_events(vec![], Duration::ZERO);
        let service = service(&source, 3600);
        assert!(service.search("anything", 10).await.unwrap().is_empty());
        assert!(service.search("anything", 10).await.unwrap().is_empty());
        assert_eq!(source.calls(), 1);
        let stats = service.stats().await;
        assert_eq!(stats.state, ServiceState::Ready);
        assert_eq!(stats.cache.status, CacheStatus::Empty);
    }
}
