//! Listing search
//!
//! [`SearchAdapter`] turns a free-text query into ranked [`ListingRecord`]s.
//! The index itself sits behind the [`SearchBackend`] trait; the production
//! backend is [`AzureSearchBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

mod azure;
mod listing;

pub use azure::{AzureSearchBackend, AzureSearchConfig, EMBEDDINGS_API_VERSION};
pub use listing::ListingRecord;

use crate::core::credentials::CredentialError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),

    #[error("Search credential error: {0}")]
    Credential(#[from] CredentialError),
}

/// Raw vector/semantic search over the listing index
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Up to `k` raw hits, most relevant first.
    async fn search_by_embedding(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Map<String, Value>>, SearchError>;

    /// Prepare credentials ahead of the first query.
    async fn warm_up(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Shared by all sessions; the backend must tolerate concurrent queries.
#[derive(Clone)]
pub struct SearchAdapter {
    backend: Arc<dyn SearchBackend>,
}

impl SearchAdapter {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Warm the backend's credentials. Failures are only logged; the first
    /// query will try again.
    pub async fn warm_up(&self) {
        if let Err(e) = self.backend.warm_up().await {
            warn!(error = %e, "Search credential warm-up failed");
        }
    }

    /// Results keep the backend's order; no re-ranking.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ListingRecord>, SearchError> {
        let hits = self.backend.search_by_embedding(query, k).await?;
        debug!(hits = hits.len(), "Search returned");
        Ok(hits.iter().take(k).map(ListingRecord::from_raw).collect())
    }
}
