use super::{BulkItemFailure, BulkSummary, DeleteByQuerySummary, Refresh, SearchClient};
use crate::dataset::DeleteCriterion;
use crate::error::{ReproError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Documents deleted per batch, matching the service's default scroll size.
pub const DEFAULT_SCROLL_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredDocument {
    source: Value,
    version: u64,
}

#[derive(Debug, Default)]
struct DatasetState {
    live: BTreeMap<String, StoredDocument>,
    pending: BTreeMap<String, StoredDocument>,
}

#[derive(Debug, Default)]
struct State {
    datasets: HashMap<String, DatasetState>,
    next_version: u64,
    next_request: u64,
    deletions: Vec<DeletionRecord>,
}

/// One document version removed by one delete-by-query request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRecord {
    pub dataset: String,
    pub id: String,
    pub version: u64,
    pub request: u64,
}

/// In-process stand-in for the search service with optimistic versioning.
///
/// Delete-by-query behaves like the real thing: it snapshots the matching
/// `(id, version)` pairs, yields, then deletes them in scroll-sized batches,
/// yielding between batches. A document that changed or vanished since the
/// snapshot is a version conflict and aborts the request after the current
/// batch. Writes with [`Refresh::False`] stay invisible until
/// [`MemorySearchClient::refresh`].
pub struct MemorySearchClient {
    state: Mutex<State>,
    scroll_size: usize,
    closed: AtomicBool,
}

impl MemorySearchClient {
    pub fn new() -> Self {
        Self::with_scroll_size(DEFAULT_SCROLL_SIZE)
    }

    pub fn with_scroll_size(scroll_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            scroll_size: scroll_size.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("MemorySearchClient: Mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(ReproError::Closed)
        } else {
            Ok(())
        }
    }

    /// Makes pending writes of `dataset` visible.
    pub fn refresh(&self, dataset: &str) {
        let mut state = self.state();
        if let Some(ds) = state.datasets.get_mut(dataset) {
            let pending = std::mem::take(&mut ds.pending);
            ds.live.extend(pending);
        }
    }

    pub fn visible_ids(&self, dataset: &str) -> Vec<String> {
        self.state()
            .datasets
            .get(dataset)
            .map(|ds| ds.live.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn deletion_log(&self) -> Vec<DeletionRecord> {
        self.state().deletions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for MemorySearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for MemorySearchClient {
    async fn bulk_index(
        &self,
        dataset: &str,
        documents: &[(String, Value)],
        refresh: Refresh,
    ) -> Result<BulkSummary> {
        self.ensure_open()?;
        let mut state = self.state();
        let mut failures = Vec::new();
        let mut indexed = 0;

        for (id, source) in documents {
            if !source.is_object() {
                failures.push(BulkItemFailure {
                    id: id.clone(),
                    status: 400,
                    reason: "mapper_parsing_exception: source is not an object".to_string(),
                });
                continue;
            }
            state.next_version += 1;
            let stored = StoredDocument {
                source: source.clone(),
                version: state.next_version,
            };
            let ds = state.datasets.entry(dataset.to_string()).or_default();
            if refresh.is_visible_on_return() {
                ds.pending.remove(id);
                ds.live.insert(id.clone(), stored);
            } else {
                ds.pending.insert(id.clone(), stored);
            }
            indexed += 1;
        }

        Ok(BulkSummary {
            submitted: documents.len(),
            indexed,
            failures,
        })
    }

    async fn delete_by_query(
        &self,
        dataset: &str,
        criterion: &DeleteCriterion,
    ) -> Result<DeleteByQuerySummary> {
        self.ensure_open()?;
        let started = Instant::now();

        let (request, snapshot) = {
            let mut state = self.state();
            state.next_request += 1;
            let request = state.next_request;
            let ds = state.datasets.get(dataset).ok_or_else(|| ReproError::Service {
                status: 404,
                reason: format!("index_not_found_exception: no such index [{}]", dataset),
            })?;
            let snapshot: Vec<(String, u64)> = ds
                .live
                .iter()
                .filter(|(_, doc)| criterion.matches(&doc.source))
                .map(|(id, doc)| (id.clone(), doc.version))
                .collect();
            (request, snapshot)
        };

        tokio::task::yield_now().await;

        let mut deleted = 0u64;
        let mut batches = 0u64;
        for batch in snapshot.chunks(self.scroll_size) {
            batches += 1;
            let mut conflicts = 0u64;
            {
                let mut state = self.state();
                let State {
                    datasets,
                    deletions,
                    ..
                } = &mut *state;
                let Some(ds) = datasets.get_mut(dataset) else {
                    return Err(conflict(dataset, batch.len() as u64, deleted));
                };
                for (id, version) in batch {
                    match ds.live.get(id) {
                        Some(doc) if doc.version == *version => {
                            ds.live.remove(id);
                            deletions.push(DeletionRecord {
                                dataset: dataset.to_string(),
                                id: id.clone(),
                                version: *version,
                                request,
                            });
                            deleted += 1;
                        }
                        _ => conflicts += 1,
                    }
                }
            }

            if conflicts > 0 {
                return Err(conflict(dataset, conflicts, deleted));
            }
            tokio::task::yield_now().await;
        }

        Ok(DeleteByQuerySummary {
            deleted,
            version_conflicts: 0,
            batches,
            took_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn count(&self, dataset: &str, criterion: &DeleteCriterion) -> Result<u64> {
        self.ensure_open()?;
        let state = self.state();
        Ok(state
            .datasets
            .get(dataset)
            .map(|ds| {
                ds.live
                    .values()
                    .filter(|doc| criterion.matches(&doc.source))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

fn conflict(dataset: &str, conflicts: u64, deleted: u64) -> ReproError {
    ReproError::Conflict {
        dataset: dataset.to_string(),
        status: 409,
        conflicts,
        deleted,
    }
}
