use crate::client::SearchClient;
use crate::config::Config;
use crate::dataset::DeleteCriterion;
use crate::error::{ReproError, Result};
use crate::harness::{ConflictHarness, HarnessReport};
use crate::seeder::{SeedReport, Seeder};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RunReport {
    /// `None` when the bulk request itself failed.
    pub seed: Option<SeedReport>,
    pub harness: HarnessReport,
    /// Matching documents left after the harness, if the count succeeded.
    pub remaining: Option<u64>,
}

/// Seeds the dataset, races the delete workers, then audits what is left.
/// Worker and seeding failures are observations, so `run` itself never fails.
pub struct Orchestrator {
    config: Config,
    client: Arc<dyn SearchClient>,
}

impl Orchestrator {
    pub fn new(config: Config, client: Arc<dyn SearchClient>) -> Self {
        Self { config, client }
    }

    pub async fn run(&self) -> RunReport {
        let dataset = &self.config.dataset;

        let seed = match Seeder::new(Arc::clone(&self.client)).seed(dataset).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(dataset = %dataset.name, "Seeding failed, continuing: {}", e);
                None
            }
        };

        let harness = ConflictHarness::new(Arc::clone(&self.client), dataset, &self.config.harness)
            .run()
            .await;

        let settle = self.config.harness.settle();
        if !settle.is_zero() {
            tracing::info!(settle_secs = settle.as_secs(), "Waiting for stragglers");
            tokio::time::sleep(settle).await;
        }

        let criterion = DeleteCriterion::term(dataset.owner_field.as_str(), dataset.owner.as_str());
        let remaining = match self.client.count(&dataset.name, &criterion).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(dataset = %dataset.name, "Could not count remaining documents: {}", e);
                None
            }
        };

        let report = RunReport {
            seed,
            harness,
            remaining,
        };
        log_summary(&report);
        report
    }

    /// Runs on its own task and closes the client afterwards, even when the
    /// run panics. A panic surfaces as [`ReproError::Aborted`].
    pub async fn run_and_shutdown(self: Arc<Self>) -> Result<RunReport> {
        let runner = Arc::clone(&self);
        let result = tokio::spawn(async move { runner.run().await }).await;
        self.shutdown().await;

        result.map_err(|e| ReproError::Aborted(e.to_string()))
    }

    /// Releases the client's connections. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Err(e) = self.client.close().await {
            tracing::error!("Failed to close search client: {}", e);
        }
    }
}

fn log_summary(report: &RunReport) {
    let seeded = report.seed.as_ref().map(|s| s.indexed).unwrap_or(0);
    if report.harness.conflict_reproduced {
        tracing::warn!(
            conflicts = report.harness.conflicts(),
            seeded,
            deleted = report.harness.total_deleted,
            remaining = ?report.remaining,
            "409 conflict reproduced under concurrent delete_by_query"
        );
    } else {
        tracing::info!(
            seeded,
            deleted = report.harness.total_deleted,
            remaining = ?report.remaining,
            timed_out = report.harness.timed_out,
            "No version conflict observed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        BulkSummary, DeleteByQuerySummary, MemorySearchClient, Refresh,
    };
    use crate::config::{Backend, HarnessConfig};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_config(documents: usize) -> Config {
        let mut config = Config::default();
        config.cluster.backend = Backend::Memory;
        config.dataset.document_count = documents;
        config.harness = HarnessConfig {
            settle_secs: 0,
            ..HarnessConfig::default()
        };
        config
    }

    #[tokio::test]
    async fn test_full_run_against_memory() {
        let client = Arc::new(MemorySearchClient::new());
        let orchestrator = Orchestrator::new(memory_config(1000), client.clone());

        let report = orchestrator.run().await;
        let seed = report.seed.unwrap();
        assert_eq!(seed.indexed, 1000);
        assert!(report.harness.total_deleted <= 1000);
        assert_eq!(
            report.remaining.unwrap() + client.deletion_log().len() as u64,
            1000
        );

        orchestrator.shutdown().await;
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_run_continues_when_seeding_fails() {
        let client = Arc::new(MemorySearchClient::new());
        client.close().await.unwrap();
        let orchestrator = Orchestrator::new(memory_config(10), client);

        let report = orchestrator.run().await;
        assert!(report.seed.is_none());
        assert_eq!(report.harness.failed(), 3);
        assert!(!report.harness.conflict_reproduced);
        assert!(report.remaining.is_none());

        orchestrator.shutdown().await;
        orchestrator.shutdown().await;
    }

    /// Panics inside `bulk_index`, counts `close` calls.
    struct PanickingClient {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl SearchClient for PanickingClient {
        async fn bulk_index(
            &self,
            _dataset: &str,
            _documents: &[(String, Value)],
            _refresh: Refresh,
        ) -> Result<BulkSummary> {
            panic!("bulk request blew up");
        }

        async fn delete_by_query(
            &self,
            _dataset: &str,
            _criterion: &DeleteCriterion,
        ) -> Result<DeleteByQuerySummary> {
            Err(ReproError::Closed)
        }

        async fn count(&self, _dataset: &str, _criterion: &DeleteCriterion) -> Result<u64> {
            Ok(0)
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_and_shutdown_closes_client() {
        let client = Arc::new(MemorySearchClient::new());
        let orchestrator = Arc::new(Orchestrator::new(memory_config(20), client.clone()));

        let report = orchestrator.run_and_shutdown().await.unwrap();
        assert_eq!(report.seed.unwrap().indexed, 20);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_panicking_run_still_closes_client() {
        let client = Arc::new(PanickingClient {
            closes: AtomicUsize::new(0),
        });
        let orchestrator = Arc::new(Orchestrator::new(memory_config(5), client.clone()));

        let err = orchestrator.run_and_shutdown().await.unwrap_err();
        assert!(matches!(err, ReproError::Aborted(_)));
        assert!(err.to_string().contains("panic"));
        assert_eq!(client.closes.load(Ordering::SeqCst), 1);
    }
}
