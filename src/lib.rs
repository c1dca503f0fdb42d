pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod orchestrator;
pub mod seeder;

pub use client::{build_client, SearchClient};
pub use config::Config;
pub use error::{FailureKind, ReproError, Result};
pub use harness::{ConflictHarness, HarnessReport, WorkerOutcome, WorkerState};
pub use crate::metrics::{init_logging, init_metrics};
pub use orchestrator::{Orchestrator, RunReport};
pub use seeder::{SeedReport, Seeder};
