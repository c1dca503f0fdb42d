//! Access to the external search service.
//!
//! The harness only needs three calls from the service: a bulk write, a
//! delete-by-query and a count. [`SearchClient`] captures those so the
//! HTTP client and the in-process dataset can be swapped freely.

pub mod http;
pub mod memory;

pub use http::HttpSearchClient;
pub use memory::MemorySearchClient;

use crate::config::{Backend, ClusterConfig};
use crate::dataset::DeleteCriterion;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Visibility requested for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Refresh the affected shards before returning.
    True,
    /// Block until the next scheduled refresh makes the write visible.
    WaitFor,
    /// Return as soon as the write is durable; it may not be searchable yet.
    False,
}

impl Refresh {
    pub fn as_param(&self) -> &'static str {
        match self {
            Refresh::True => "true",
            Refresh::WaitFor => "wait_for",
            Refresh::False => "false",
        }
    }

    pub fn is_visible_on_return(&self) -> bool {
        !matches!(self, Refresh::False)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub submitted: usize,
    pub indexed: usize,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkSummary {
    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteByQuerySummary {
    pub deleted: u64,
    pub version_conflicts: u64,
    pub batches: u64,
    pub took_ms: u64,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Writes `(id, source)` pairs into `dataset` in one request.
    async fn bulk_index(
        &self,
        dataset: &str,
        documents: &[(String, Value)],
        refresh: Refresh,
    ) -> Result<BulkSummary>;

    /// Deletes every visible document matching `criterion`, aborting on the
    /// first version conflict.
    async fn delete_by_query(
        &self,
        dataset: &str,
        criterion: &DeleteCriterion,
    ) -> Result<DeleteByQuerySummary>;

    /// Number of visible documents matching `criterion`. A dataset that does
    /// not exist yet counts as empty.
    async fn count(&self, dataset: &str, criterion: &DeleteCriterion) -> Result<u64>;

    /// Releases pooled connections. Requests issued afterwards fail.
    async fn close(&self) -> Result<()>;
}

pub fn build_client(config: &ClusterConfig) -> Result<Arc<dyn SearchClient>> {
    match config.backend {
        Backend::Http => Ok(Arc::new(HttpSearchClient::new(config)?)),
        Backend::Memory => Ok(Arc::new(MemorySearchClient::new())),
    }
}
