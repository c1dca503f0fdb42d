use crate::client::{BulkItemFailure, Refresh, SearchClient};
use crate::config::DatasetConfig;
use crate::dataset::build_documents;
use crate::error::Result;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub submitted: usize,
    pub indexed: usize,
    pub failures: Vec<BulkItemFailure>,
}

impl SeedReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.indexed == self.submitted
    }
}

/// Writes the fixed document population in a single bulk request.
pub struct Seeder {
    client: Arc<dyn SearchClient>,
}

impl Seeder {
    pub fn new(client: Arc<dyn SearchClient>) -> Self {
        Self { client }
    }

    /// Seeds `config.document_count` documents and waits for them to be
    /// visible. Per-document failures are logged and reported, not raised:
    /// the harness only needs most of the population to exist.
    pub async fn seed(&self, config: &DatasetConfig) -> Result<SeedReport> {
        tracing::info!(
            dataset = %config.name,
            documents = config.document_count,
            "Preparing data"
        );

        let documents: Vec<(String, serde_json::Value)> = build_documents(config)
            .into_iter()
            .map(|doc| {
                let source = doc.to_source(&config.owner_field);
                (doc.id, source)
            })
            .collect();

        if documents.is_empty() {
            tracing::info!(dataset = %config.name, "Nothing to seed");
            return Ok(SeedReport::default());
        }

        let summary = self
            .client
            .bulk_index(&config.name, &documents, Refresh::True)
            .await?;

        crate::metrics::record_seeded(summary.indexed);

        if summary.has_errors() {
            tracing::warn!(
                dataset = %config.name,
                indexed = summary.indexed,
                failed = summary.failures.len(),
                "Bulk had errors"
            );
            for failure in summary.failures.iter().take(5) {
                tracing::debug!(id = %failure.id, status = failure.status, "{}", failure.reason);
            }
        } else {
            tracing::info!(dataset = %config.name, indexed = summary.indexed, "Data prepared");
        }

        Ok(SeedReport {
            submitted: summary.submitted,
            indexed: summary.indexed,
            failures: summary.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BulkSummary, DeleteByQuerySummary, MemorySearchClient};
    use crate::dataset::DeleteCriterion;
    use crate::error::ReproError;
    use async_trait::async_trait;
    use serde_json::Value;

    fn dataset(count: usize) -> DatasetConfig {
        DatasetConfig {
            document_count: count,
            ..DatasetConfig::default()
        }
    }

    #[tokio::test]
    async fn test_seed_is_visible_on_return() {
        let client = Arc::new(MemorySearchClient::new());
        let seeder = Seeder::new(client.clone());
        let config = dataset(1000);

        let report = seeder.seed(&config).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.indexed, 1000);

        let criterion = DeleteCriterion::term("user", "kimchy");
        assert_eq!(client.count("users", &criterion).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_seed_zero_documents() {
        let client = Arc::new(MemorySearchClient::new());
        let seeder = Seeder::new(client.clone());

        let report = seeder.seed(&dataset(0)).await.unwrap();
        assert_eq!(report, SeedReport::default());
        assert!(client.visible_ids("users").is_empty());
    }

    #[tokio::test]
    async fn test_reseed_after_full_delete() {
        let client = Arc::new(MemorySearchClient::new());
        let seeder = Seeder::new(client.clone());
        let config = dataset(25);
        let criterion = DeleteCriterion::term("user", "kimchy");

        seeder.seed(&config).await.unwrap();
        let first_ids = client.visible_ids("users");
        client.delete_by_query("users", &criterion).await.unwrap();
        assert_eq!(client.count("users", &criterion).await.unwrap(), 0);

        seeder.seed(&config).await.unwrap();
        assert_eq!(client.visible_ids("users"), first_ids);
        assert_eq!(client.count("users", &criterion).await.unwrap(), 25);
    }

    struct PartialBulk;

    #[async_trait]
    impl SearchClient for PartialBulk {
        async fn bulk_index(
            &self,
            _dataset: &str,
            documents: &[(String, Value)],
            _refresh: Refresh,
        ) -> Result<BulkSummary> {
            Ok(BulkSummary {
                submitted: documents.len(),
                indexed: documents.len() - 1,
                failures: vec![BulkItemFailure {
                    id: "0".to_string(),
                    status: 429,
                    reason: "es_rejected_execution_exception".to_string(),
                }],
            })
        }

        async fn delete_by_query(
            &self,
            _dataset: &str,
            _criterion: &DeleteCriterion,
        ) -> Result<DeleteByQuerySummary> {
            Ok(DeleteByQuerySummary::default())
        }

        async fn count(&self, _dataset: &str, _criterion: &DeleteCriterion) -> Result<u64> {
            Ok(0)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_not_raised() {
        let seeder = Seeder::new(Arc::new(PartialBulk));
        let report = seeder.seed(&dataset(10)).await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.indexed, 9);
        assert_eq!(report.failures[0].id, "0");
    }

    #[tokio::test]
    async fn test_closed_client_fails_seed() {
        let client = Arc::new(MemorySearchClient::new());
        client.close().await.unwrap();
        let seeder = Seeder::new(client);
        let err = seeder.seed(&dataset(3)).await.unwrap_err();
        assert!(matches!(err, ReproError::Closed));
    }
}
