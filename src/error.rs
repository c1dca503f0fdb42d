use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReproError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Version conflict on {dataset} (status {status}): {conflicts} conflicting document(s), {deleted} deleted before abort")]
    Conflict {
        dataset: String,
        status: u16,
        conflicts: u64,
        deleted: u64,
    },

    #[error("Search service error (status {status}): {reason}")]
    Service { status: u16, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Search client is closed")]
    Closed,

    #[error("Run aborted: {0}")]
    Aborted(String),
}

/// Coarse classification of a failed request, used to decide whether a
/// worker reproduced the write-write race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Conflict,
    Other,
}

impl ReproError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ReproError::Transport(_) | ReproError::Closed => FailureKind::Io,
            ReproError::Conflict { .. } => FailureKind::Conflict,
            _ => FailureKind::Other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == FailureKind::Conflict
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Io => "io",
            FailureKind::Conflict => "conflict",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, ReproError>;
