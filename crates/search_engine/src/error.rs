//! Errors surfaced by the search service.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The snapshot source failed. Shared so every caller coalesced onto one
    /// cold-start population observes the same failure.
    #[error("{provider} snapshot fetch failed: {source}")]
    Fetch {
        provider: &'static str,
        #[source]
        source: Arc<common::Error>,
    },
}

impl SearchError {
    pub fn fetch(provider: &'static str, source: common::Error) -> Self {
        Self::Fetch {
            provider,
            source: Arc::new(source),
        }
    }
}
