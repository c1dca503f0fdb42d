use crate::error::FailureKind;

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conflict_repro=info".into()),
        )
        .init();
}

pub fn init_metrics() {
    metrics::describe_counter!(
        "repro_documents_seeded_total",
        "Total number of documents indexed by the seeder"
    );
    metrics::describe_counter!(
        "repro_worker_success_total",
        "Delete-by-query workers that completed without error"
    );
    metrics::describe_counter!(
        "repro_worker_conflict_total",
        "Delete-by-query workers that hit a version conflict"
    );
    metrics::describe_counter!(
        "repro_worker_failure_total",
        "Delete-by-query workers that failed for any other reason"
    );
    metrics::describe_counter!(
        "repro_documents_deleted_total",
        "Documents removed by successful delete-by-query workers"
    );
    metrics::describe_histogram!(
        "repro_delete_duration_seconds",
        "Delete-by-query request duration"
    );
}

pub fn record_seeded(indexed: usize) {
    metrics::counter!("repro_documents_seeded_total").increment(indexed as u64);
}

pub fn record_worker_success(deleted: u64, seconds: f64) {
    metrics::counter!("repro_worker_success_total").increment(1);
    metrics::counter!("repro_documents_deleted_total").increment(deleted);
    metrics::histogram!("repro_delete_duration_seconds").record(seconds);
}

pub fn record_worker_failure(kind: FailureKind, seconds: f64) {
    match kind {
        FailureKind::Conflict => metrics::counter!("repro_worker_conflict_total").increment(1),
        FailureKind::Io | FailureKind::Other => {
            metrics::counter!("repro_worker_failure_total").increment(1)
        }
    }
    metrics::histogram!("repro_delete_duration_seconds").record(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        init_metrics();
        record_seeded(10);
        record_worker_success(10, 0.1);
        record_worker_failure(FailureKind::Conflict, 0.2);
        record_worker_failure(FailureKind::Io, 0.3);
    }
}
