use super::{BulkItemFailure, BulkSummary, DeleteByQuerySummary, Refresh, SearchClient};
use crate::config::ClusterConfig;
use crate::dataset::DeleteCriterion;
use crate::error::{ReproError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;

const VERSION_CONFLICT_TYPE: &str = "version_conflict_engine_exception";

/// Client for an Elasticsearch-compatible REST API. One `reqwest::Client`
/// (and so one connection pool) is shared by every caller.
pub struct HttpSearchClient {
    base_url: String,
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpSearchClient {
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle)
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client: RwLock::new(Some(client)),
        })
    }

    fn client(&self) -> Result<reqwest::Client> {
        let guard = match self.client.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("HttpSearchClient: RwLock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.clone().ok_or(ReproError::Closed)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn bulk_index(
        &self,
        dataset: &str,
        documents: &[(String, Value)],
        refresh: Refresh,
    ) -> Result<BulkSummary> {
        let body = bulk_body(dataset, documents)?;
        let url = self.url(&format!("_bulk?refresh={}", refresh.as_param()));

        let response = self
            .client()?
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ReproError::Service {
                status: status.as_u16(),
                reason: error_reason(&text),
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        Ok(parse_bulk_response(documents.len(), &value))
    }

    async fn delete_by_query(
        &self,
        dataset: &str,
        criterion: &DeleteCriterion,
    ) -> Result<DeleteByQuerySummary> {
        let url = self.url(&format!("{}/_delete_by_query?conflicts=abort", dataset));

        let response = self
            .client()?
            .post(&url)
            .json(&criterion.to_query())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        interpret_delete_by_query(dataset, status, &text)
    }

    async fn count(&self, dataset: &str, criterion: &DeleteCriterion) -> Result<u64> {
        let url = self.url(&format!("{}/_count", dataset));

        let response = self
            .client()?
            .post(&url)
            .json(&criterion.to_query())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ReproError::Service {
                status: status.as_u16(),
                reason: error_reason(&text),
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        value["count"].as_u64().ok_or_else(|| ReproError::Service {
            status: status.as_u16(),
            reason: "_count response has no count".to_string(),
        })
    }

    async fn close(&self) -> Result<()> {
        let mut guard = match self.client.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.take().is_some() {
            tracing::debug!("Closed search client for {}", self.base_url);
        }
        Ok(())
    }
}

/// NDJSON body for `_bulk`: one action line and one source line per document.
pub(crate) fn bulk_body(dataset: &str, documents: &[(String, Value)]) -> Result<String> {
    let mut body = String::new();
    for (id, source) in documents {
        let action = json!({ "index": { "_index": dataset, "_id": id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(source)?);
        body.push('\n');
    }
    Ok(body)
}

pub(crate) fn parse_bulk_response(submitted: usize, value: &Value) -> BulkSummary {
    let mut failures = Vec::new();
    let items = value["items"].as_array().cloned().unwrap_or_default();

    for item in &items {
        // Each item is keyed by its action name ("index", "create", ...).
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        let status = status_code(&result["status"]).unwrap_or(0);
        if result.get("error").is_some() || status >= 300 {
            failures.push(BulkItemFailure {
                id: result["_id"].as_str().unwrap_or_default().to_string(),
                status,
                reason: describe_error(&result["error"]),
            });
        }
    }

    let indexed = if items.is_empty() && !value["errors"].as_bool().unwrap_or(false) {
        submitted
    } else {
        items.len() - failures.len()
    };

    BulkSummary {
        submitted,
        indexed,
        failures,
    }
}

/// Maps a `_delete_by_query` response onto a summary or a classified error.
/// A 409 status, or any per-document failure that is a version conflict,
/// yields [`ReproError::Conflict`].
pub(crate) fn interpret_delete_by_query(
    dataset: &str,
    status: StatusCode,
    body: &str,
) -> Result<DeleteByQuerySummary> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if status == StatusCode::CONFLICT => Value::Null,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => {
            return Err(ReproError::Service {
                status: status.as_u16(),
                reason: body.to_string(),
            })
        }
    };

    let failures = value["failures"].as_array().cloned().unwrap_or_default();
    let conflict_failures = failures.iter().filter(|f| is_version_conflict(f)).count() as u64;
    let deleted = value["deleted"].as_u64().unwrap_or(0);

    if status == StatusCode::CONFLICT || conflict_failures > 0 {
        let reported = value["version_conflicts"].as_u64().unwrap_or(0);
        return Err(ReproError::Conflict {
            dataset: dataset.to_string(),
            status: StatusCode::CONFLICT.as_u16(),
            conflicts: reported.max(conflict_failures),
            deleted,
        });
    }

    if !status.is_success() {
        return Err(ReproError::Service {
            status: status.as_u16(),
            reason: describe_error(&value["error"]),
        });
    }

    if let Some(failure) = failures.first() {
        return Err(ReproError::Service {
            status: status_code(&failure["status"]).unwrap_or(500),
            reason: describe_error(&failure["cause"]),
        });
    }

    Ok(DeleteByQuerySummary {
        deleted,
        version_conflicts: value["version_conflicts"].as_u64().unwrap_or(0),
        batches: value["batches"].as_u64().unwrap_or(0),
        took_ms: value["took"].as_u64().unwrap_or(0),
    })
}

/// HTTP status carried in a response body. Values outside `u16` read as 500.
fn status_code(value: &Value) -> Option<u16> {
    value.as_u64().map(|s| u16::try_from(s).unwrap_or(500))
}

fn is_version_conflict(failure: &Value) -> bool {
    failure["status"].as_u64() == Some(409)
        || failure["cause"]["type"].as_str() == Some(VERSION_CONFLICT_TYPE)
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::Null => "unknown error".to_string(),
        Value::String(s) => s.clone(),
        _ => {
            let kind = error["type"].as_str().unwrap_or("error");
            match error["reason"].as_str() {
                Some(reason) => format!("{}: {}", kind, reason),
                None => kind.to_string(),
            }
        }
    }
}

fn error_reason(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => describe_error(&value["error"]),
        Err(_) => body.to_string(),
    }
}
