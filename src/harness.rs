use crate::client::SearchClient;
use crate::config::{DatasetConfig, HarnessConfig};
use crate::dataset::DeleteCriterion;
use crate::error::FailureKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Succeeded { deleted: u64 },
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// 1-based, matching the log lines.
    pub worker: usize,
    pub state: WorkerState,
    pub outcome: Option<WorkerOutcome>,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct HarnessReport {
    pub workers: Vec<WorkerReport>,
    pub conflict_reproduced: bool,
    /// Sum over successful workers only.
    pub total_deleted: u64,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl HarnessReport {
    pub fn succeeded(&self) -> usize {
        self.count_state(WorkerState::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count_state(WorkerState::Failed)
    }

    pub fn conflicts(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| {
                matches!(
                    w.outcome,
                    Some(WorkerOutcome::Failed {
                        kind: FailureKind::Conflict,
                        ..
                    })
                )
            })
            .count()
    }

    /// Workers that had not reported when the join gave up.
    pub fn abandoned(&self) -> usize {
        self.count_state(WorkerState::Running)
    }

    fn count_state(&self, state: WorkerState) -> usize {
        self.workers.iter().filter(|w| w.state == state).count()
    }
}

/// Races `workers` delete-by-query requests against one dataset.
pub struct ConflictHarness {
    client: Arc<dyn SearchClient>,
    dataset: String,
    owner_field: String,
    owner: String,
    workers: usize,
    timeout: Duration,
}

impl ConflictHarness {
    pub fn new(client: Arc<dyn SearchClient>, dataset: &DatasetConfig, harness: &HarnessConfig) -> Self {
        Self {
            client,
            dataset: dataset.name.clone(),
            owner_field: dataset.owner_field.clone(),
            owner: dataset.owner.clone(),
            workers: harness.workers,
            timeout: harness.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawns every worker, then collects outcomes until all have reported
    /// or the timeout elapses. Workers still running at the deadline are
    /// detached and keep running.
    pub async fn run(&self) -> HarnessReport {
        tracing::info!(
            dataset = %self.dataset,
            workers = self.workers,
            "Starting concurrent delete_by_query reproduction"
        );

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut states = vec![WorkerState::Pending; self.workers];
        let mut outcomes: Vec<Option<(WorkerOutcome, Duration)>> = vec![None; self.workers];
        let mut set = JoinSet::new();
        let mut slots = HashMap::new();

        for index in 0..self.workers {
            let worker = index + 1;
            let client = Arc::clone(&self.client);
            let dataset = self.dataset.clone();
            let criterion = DeleteCriterion::term(self.owner_field.as_str(), self.owner.as_str());

            let handle = set.spawn(async move {
                run_worker(worker, client.as_ref(), &dataset, &criterion).await
            });
            slots.insert(handle.id(), index);
            states[index] = WorkerState::Running;
        }

        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next_with_id()).await {
                Ok(Some(Ok((id, (outcome, elapsed))))) => {
                    let Some(&index) = slots.get(&id) else {
                        continue;
                    };
                    states[index] = state_of(&outcome);
                    outcomes[index] = Some((outcome, elapsed));
                }
                Ok(Some(Err(join_error))) => {
                    let Some(&index) = slots.get(&join_error.id()) else {
                        continue;
                    };
                    tracing::error!(worker = index + 1, "Worker task failed: {}", join_error);
                    let elapsed = started.elapsed();
                    crate::metrics::record_worker_failure(FailureKind::Other, elapsed.as_secs_f64());
                    states[index] = WorkerState::Failed;
                    outcomes[index] = Some((
                        WorkerOutcome::Failed {
                            kind: FailureKind::Other,
                            message: join_error.to_string(),
                        },
                        elapsed,
                    ));
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    tracing::warn!(
                        pending = set.len(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Timed out waiting for workers; leaving them running"
                    );
                    set.detach_all();
                    break;
                }
            }
        }

        let workers: Vec<WorkerReport> = states
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (state, result))| {
                let (outcome, elapsed) = match result {
                    Some((outcome, elapsed)) => (Some(outcome), Some(elapsed)),
                    None => (None, None),
                };
                WorkerReport {
                    worker: index + 1,
                    state,
                    outcome,
                    elapsed,
                }
            })
            .collect();

        let total_deleted = workers
            .iter()
            .filter_map(|w| match w.outcome {
                Some(WorkerOutcome::Succeeded { deleted }) => Some(deleted),
                _ => None,
            })
            .sum();

        let report = HarnessReport {
            conflict_reproduced: workers.iter().any(|w| {
                matches!(
                    w.outcome,
                    Some(WorkerOutcome::Failed {
                        kind: FailureKind::Conflict,
                        ..
                    })
                )
            }),
            workers,
            total_deleted,
            timed_out,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            conflicts = report.conflicts(),
            abandoned = report.abandoned(),
            total_deleted = report.total_deleted,
            "Harness finished"
        );

        report
    }
}

fn state_of(outcome: &WorkerOutcome) -> WorkerState {
    match outcome {
        WorkerOutcome::Succeeded { .. } => WorkerState::Succeeded,
        WorkerOutcome::Failed { .. } => WorkerState::Failed,
    }
}

/// One delete-by-query attempt. Never retries: a conflict is the result
/// being looked for, not something to recover from.
async fn run_worker(
    worker: usize,
    client: &dyn SearchClient,
    dataset: &str,
    criterion: &DeleteCriterion,
) -> (WorkerOutcome, Duration) {
    tracing::info!(worker, "Initiating delete_by_query");
    let started = Instant::now();
    let result = client.delete_by_query(dataset, criterion).await;
    let elapsed = started.elapsed();

    let outcome = match result {
        Ok(summary) => {
            tracing::info!(worker, deleted = summary.deleted, batches = summary.batches, "Success");
            crate::metrics::record_worker_success(summary.deleted, elapsed.as_secs_f64());
            WorkerOutcome::Succeeded {
                deleted: summary.deleted,
            }
        }
        Err(err) => {
            let kind = err.kind();
            tracing::error!(worker, kind = %kind, "Failed: {}", err);
            if kind == FailureKind::Conflict {
                tracing::warn!(worker, "409 Conflict reproduced");
            }
            crate::metrics::record_worker_failure(kind, elapsed.as_secs_f64());
            WorkerOutcome::Failed {
                kind,
                message: err.to_string(),
            }
        }
    };

    (outcome, elapsed)
}
