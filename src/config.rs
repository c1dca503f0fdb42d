use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub dataset: DatasetConfig,
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Http,
    Memory,
}

/// Where the search service lives and how the shared client talks to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub backend: Backend,
    /// Base URL of the search service, without a trailing path.
    pub url: String,
    pub request_timeout_secs: u64,
    /// Idle connections kept per host in the shared pool.
    pub pool_max_idle: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            backend: Backend::Http,
            url: "http://localhost:9200".to_string(),
            request_timeout_secs: 30,
            pool_max_idle: 8,
        }
    }
}

/// The seeded documents. Every document carries the same owner so that all
/// workers target an overlapping set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub document_count: usize,
    /// Field the owner value is stored under and matched on.
    pub owner_field: String,
    pub owner: String,
    pub message_prefix: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            name: "users".to_string(),
            document_count: 1000,
            owner_field: "user".to_string(),
            owner: "kimchy".to_string(),
            message_prefix: "trying out Elasticsearch".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Number of concurrent delete-by-query workers.
    pub workers: usize,
    /// How long the orchestrator waits for workers to report.
    pub timeout_secs: u64,
    /// Grace period after the join before shutting down.
    pub settle_secs: u64,
}

impl HarnessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            workers: 3,
            timeout_secs: 10,
            settle_secs: 5,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Ok(backend) = std::env::var("SEARCH_BACKEND") {
            config.cluster.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => Backend::Memory,
                "http" => Backend::Http,
                other => anyhow::bail!("unknown SEARCH_BACKEND: {}", other),
            };
        }
        if let Ok(url) = std::env::var("SEARCH_URL") {
            config.cluster.url = url;
        }
        if let Ok(timeout) = std::env::var("SEARCH_REQUEST_TIMEOUT_SECS") {
            config.cluster.request_timeout_secs = timeout.parse()?;
        }
        if let Ok(name) = std::env::var("DATASET_NAME") {
            config.dataset.name = name;
        }
        if let Ok(count) = std::env::var("DATASET_DOCUMENT_COUNT") {
            config.dataset.document_count = count.parse()?;
        }
        if let Ok(owner) = std::env::var("DATASET_OWNER") {
            config.dataset.owner = owner;
        }
        if let Ok(workers) = std::env::var("HARNESS_WORKERS") {
            config.harness.workers = workers.parse()?;
        }
        if let Ok(timeout) = std::env::var("HARNESS_TIMEOUT_SECS") {
            config.harness.timeout_secs = timeout.parse()?;
        }
        if let Ok(settle) = std::env::var("HARNESS_SETTLE_SECS") {
            config.harness.settle_secs = settle.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dataset.name.is_empty() {
            anyhow::bail!("dataset.name must not be empty");
        }
        if self.dataset.owner_field.is_empty() {
            anyhow::bail!("dataset.owner_field must not be empty");
        }
        if self.harness.workers == 0 {
            anyhow::bail!("harness.workers must be at least 1");
        }
        if self.harness.timeout_secs == 0 {
            anyhow::bail!("harness.timeout_secs must be greater than 0");
        }
        if self.cluster.backend == Backend::Http && self.cluster.url.is_empty() {
            anyhow::bail!("cluster.url must be set for the http backend");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            dataset: DatasetConfig::default(),
            harness: HarnessConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_matches_reproduction_scenario() {
        let config = Config::default();
        assert_eq!(config.dataset.name, "users");
        assert_eq!(config.dataset.document_count, 1000);
        assert_eq!(config.dataset.owner, "kimchy");
        assert_eq!(config.harness.workers, 3);
        assert_eq!(config.harness.timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[cluster]
backend = "memory"
url = ""
request_timeout_secs = 5
pool_max_idle = 2

[dataset]
name = "orders"
document_count = 50
owner_field = "user"
owner = "alice"
message_prefix = "hello"

[harness]
workers = 5
timeout_secs = 2
settle_secs = 0
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.cluster.backend, Backend::Memory);
        assert_eq!(config.dataset.name, "orders");
        assert_eq!(config.dataset.document_count, 50);
        assert_eq!(config.harness.workers, 5);
        assert_eq!(config.harness.settle(), Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.harness.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.harness.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/conflict-repro.toml").is_err());
    }
}
