//! Boundary with the data-fetch collaborators.

use std::future::Future;

/// One complete provider snapshot (not a delta).
#[derive(Debug, Clone)]
pub struct Snapshot<E, M> {
    pub events: Vec<E>,
    pub markets: Vec<M>,
}

impl<E, M> Snapshot<E, M> {
    pub fn new(events: Vec<E>, markets: Vec<M>) -> Self {
        Self { events, markets }
    }
}

impl<E, M> Default for Snapshot<E, M> {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

/// Supplies full snapshots of a provider's events and markets.
///
/// Pagination, retries and timeouts are the implementor's concern.
pub trait SnapshotSource: Send + Sync + 'static {
    type Event: Clone + Send + Sync + 'static;
    type Market: Clone + Send + Sync + 'static;

    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = Result<Snapshot<Self::Event, Self::Market>, common::Error>> + Send;
}
