//! Load test events for front ends

use serde::Serialize;
use uuid::Uuid;

use crate::attempt::{AttemptId, AttemptOutcome};
use crate::stats::RunSummary;
use crate::teardown::TeardownReport;

/// Broadcast by [`LoadTester`](crate::LoadTester) as a run progresses
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadTestEvent {
    RunStarted {
        run_id: Uuid,
        target: String,
        concurrency: usize,
    },
    AttemptEstablished {
        run_id: Uuid,
        attempt: AttemptId,
        setup_ms: u64,
    },
    AttemptFinished {
        run_id: Uuid,
        attempt: AttemptId,
        outcome: AttemptOutcome,
        cause: Option<String>,
    },
    /// `stop_run` captured `handles` in-flight attempts and is tearing them down
    RunStopping {
        run_id: Uuid,
        handles: usize,
    },
    RunStopped {
        run_id: Uuid,
        report: TeardownReport,
    },
    RunCompleted(RunSummary),
}

impl LoadTestEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            LoadTestEvent::RunStarted { run_id, .. }
            | LoadTestEvent::AttemptEstablished { run_id, .. }
            | LoadTestEvent::AttemptFinished { run_id, .. }
            | LoadTestEvent::RunStopping { run_id, .. }
            | LoadTestEvent::RunStopped { run_id, .. } => *run_id,
            LoadTestEvent::RunCompleted(summary) => summary.run_id,
        }
    }
}
