//! In-memory relevance search over prediction-market snapshots.
//!
//! A [`SearchService`] owns one provider's [`RelevanceCache`], populates it
//! lazily from a [`SnapshotSource`] and keeps it fresh in the background.

pub mod cache;
pub mod error;
pub mod providers;
pub mod refresh_guard;
pub mod scoring;
pub mod service;
pub mod source;
pub mod ttl;

pub use cache::{
    CacheStats, CacheStatus, CombinedHit, MatchedRecord, RecordSchema, RelevanceCache, SearchHit,
};
pub use error::SearchError;
pub use refresh_guard::RefreshGuard;
pub use scoring::FieldWeight;
pub use service::{SearchService, ServiceState, ServiceStats};
pub use source::{Snapshot, SnapshotSource};
