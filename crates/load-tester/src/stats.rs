//! Run counters and snapshots

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::attempt::{AttemptOutcome, AttemptReport};

/// Aggregate counters of one run.
///
/// Every update is a single atomic operation. Each attempt calls
/// [`attempt_started`](Self::attempt_started) once and
/// [`attempt_finished`](Self::attempt_finished) once, so `active` returns
/// to zero when the run is quiescent. Established calls stay in `active`
/// until they end, so `active == total_attempts - succeeded - failed` holds
/// only at quiescence.
#[derive(Debug, Default)]
pub struct RunCounters {
    total_attempts: AtomicUsize,
    active: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    completed: AtomicUsize,
}

impl RunCounters {
    pub fn attempt_started(&self) {
        self.total_attempts.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    pub fn attempt_established(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn attempt_finished(&self, established: bool) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if !established {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_attempts: self.total_attempts.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of [`RunCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total_attempts: usize,
    pub active: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Attempts that reached a terminal outcome
    pub completed: usize,
}

impl CounterSnapshot {
    /// Percentage of `concurrency` attempts that have completed
    pub fn progress(&self, concurrency: usize) -> u8 {
        if concurrency == 0 {
            return 100;
        }
        (self.completed.min(concurrency) * 100 / concurrency) as u8
    }
}

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Stopping,
}

/// Live view of the current (or last) run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub state: RunState,
    pub run_id: Option<Uuid>,
    pub concurrency: usize,
    pub counters: CounterSnapshot,
    /// 0-100
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
}

impl LoadStats {
    pub(crate) fn idle() -> Self {
        Self {
            state: RunState::Idle,
            run_id: None,
            concurrency: 0,
            counters: CounterSnapshot::default(),
            progress: 0,
            started_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state != RunState::Idle
    }
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub target: String,
    pub concurrency: usize,
    pub counters: CounterSnapshot,
    pub aborted: usize,
    /// The run was cut short by a stop
    pub stopped: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub mean_setup_ms: Option<f64>,
    pub max_setup_ms: Option<u64>,
    /// Failure causes and how often each occurred
    pub failure_causes: BTreeMap<String, usize>,
}

/// Setup-time and cause statistics over the attempt reports of a run
#[derive(Debug, Default)]
pub(crate) struct ReportDigest {
    pub aborted: usize,
    pub mean_setup_ms: Option<f64>,
    pub max_setup_ms: Option<u64>,
    pub failure_causes: BTreeMap<String, usize>,
}

impl ReportDigest {
    pub(crate) fn from_reports(reports: &[AttemptReport]) -> Self {
        let mut digest = ReportDigest::default();
        let mut setup_total_ms = 0.0;
        let mut setup_count = 0usize;

        for report in reports {
            match report.outcome {
                AttemptOutcome::Succeeded => {}
                AttemptOutcome::Aborted => digest.aborted += 1,
                AttemptOutcome::Failed => {
                    let cause = report.cause.clone().unwrap_or_else(|| "unknown".to_string());
                    *digest.failure_causes.entry(cause).or_insert(0) += 1;
                }
            }
            if let Some(setup) = report.setup_time {
                let ms = setup.as_millis() as u64;
                setup_total_ms += ms as f64;
                setup_count += 1;
                digest.max_setup_ms = Some(digest.max_setup_ms.map_or(ms, |max| max.max(ms)));
            }
        }
        if setup_count > 0 {
            digest.mean_setup_ms = Some(setup_total_ms / setup_count as f64);
        }
        digest
    }
}
