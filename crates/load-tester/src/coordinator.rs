//! Concurrency coordinator
//!
//! [`LoadTester`] owns the run state machine (`Idle -> Running -> Stopping ->
//! Idle`) and fans a run out to N attempt drivers.
//!
//! ```text
//! start_run ──▶ RunContext (counters, registry, cancel token)
//!                 ├─▶ driver #0 ─┐
//!                 ├─▶ driver #1 ─┼─▶ join all ─▶ RunSummary, Idle
//!                 └─▶ driver #N ─┘
//! stop_run  ──▶ drain registry ─▶ cancel ─▶ teardown handles ─▶ Idle
//! ```
//!
//! Each run gets its own [`RunContext`], so a new run starts from zeroed
//! counters and an empty registry, and stragglers of a stopped run can only
//! touch the counters of the run they belong to.
//!
//! The run itself executes on a spawned task. Dropping the future returned by
//! [`LoadTester::start_run`] does not abort the run; use
//! [`LoadTester::stop_run`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipconsole_client_core::{Credentials, sim::SimBackend};
//! use sipconsole_load_tester::{LoadTestConfig, LoadTester};
//!
//! # async fn example() -> sipconsole_load_tester::LoadTestResult<()> {
//! let tester = LoadTester::new(Arc::new(SimBackend::new()));
//! let config = LoadTestConfig::new(
//!     Credentials::new("sip:5001@pbx.local", "wss://pbx.local:7443", "5001", "secret"),
//!     "sip:1413@pbx.local",
//! )
//! .with_concurrency(5)
//! .with_hold_secs(1);
//!
//! if let Some(summary) = tester.start_run(config).await? {
//!     println!("{} succeeded, {} failed", summary.counters.succeeded, summary.counters.failed);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use sipconsole_client_core::SignalingBackend;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::attempt::AttemptId;
use crate::config::LoadTestConfig;
use crate::context::RunContext;
use crate::driver::drive_attempt;
use crate::error::{LoadTestError, LoadTestResult};
use crate::events::LoadTestEvent;
use crate::stats::{LoadStats, RunState, RunSummary};
use crate::teardown::{teardown_handles, TeardownReport};

const EVENT_CAPACITY: usize = 1024;

#[derive(Default)]
struct RunSlot {
    state: RunState,
    /// Context of the running or stopping run
    current: Option<Arc<RunContext>>,
    /// Context of the most recent run that went idle
    last: Option<Arc<RunContext>>,
}

impl RunSlot {
    /// Go idle if `ctx` is still the current run
    fn settle(&mut self, ctx: &Arc<RunContext>) -> bool {
        match &self.current {
            Some(current) if Arc::ptr_eq(current, ctx) => {
                self.state = RunState::Idle;
                self.last = self.current.take();
                true
            }
            _ => false,
        }
    }
}

struct TesterShared {
    backend: Arc<dyn SignalingBackend>,
    slot: Mutex<RunSlot>,
    events: broadcast::Sender<LoadTestEvent>,
}

/// A run launched with [`LoadTester::launch`]
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for every driver of the run to complete
    pub async fn wait(self) -> LoadTestResult<RunSummary> {
        self.task.await.map_err(|e| LoadTestError::RunTaskFailed { reason: e.to_string() })
    }
}

/// Load test orchestrator. Cheap to clone; clones share the same run.
#[derive(Clone)]
pub struct LoadTester {
    shared: Arc<TesterShared>,
}

impl LoadTester {
    pub fn new(backend: Arc<dyn SignalingBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(TesterShared {
                backend,
                slot: Mutex::new(RunSlot::default()),
                events,
            }),
        }
    }

    /// Subscribe to load test events
    pub fn subscribe(&self) -> broadcast::Receiver<LoadTestEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> RunState {
        self.shared.slot.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() != RunState::Idle
    }

    /// Live counters of the current run, or of the last run when idle
    pub fn stats(&self) -> LoadStats {
        let slot = self.shared.slot.lock();
        let Some(ctx) = slot.current.as_ref().or(slot.last.as_ref()) else {
            return LoadStats::idle();
        };
        let counters = ctx.snapshot();
        LoadStats {
            state: slot.state,
            run_id: Some(ctx.run_id),
            concurrency: ctx.concurrency,
            counters,
            progress: counters.progress(ctx.concurrency),
            started_at: Some(ctx.started_at),
        }
    }

    /// Start a run without waiting for it.
    ///
    /// Returns `Ok(None)` without touching the active run if one is already
    /// running or stopping.
    pub fn launch(&self, config: LoadTestConfig) -> LoadTestResult<Option<RunHandle>> {
        let ctx = {
            let mut slot = self.shared.slot.lock();
            if slot.state != RunState::Idle {
                info!("Load test already running, ignoring start request");
                return Ok(None);
            }

            let target = config.validate()?;
            let ctx = Arc::new(RunContext::new(
                self.shared.backend.clone(),
                &config,
                target,
                self.shared.events.clone(),
            ));
            slot.state = RunState::Running;
            slot.current = Some(ctx.clone());
            ctx
        };

        let run_id = ctx.run_id;
        let task = tokio::spawn(run(self.shared.clone(), ctx));
        Ok(Some(RunHandle { run_id, task }))
    }

    /// Run a load test to completion.
    ///
    /// Returns `Ok(None)` if a run is already active, otherwise the summary
    /// once all N attempts have reached a terminal outcome.
    pub async fn start_run(&self, config: LoadTestConfig) -> LoadTestResult<Option<RunSummary>> {
        match self.launch(config)? {
            Some(handle) => handle.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// Tear down every in-flight attempt of the current run.
    ///
    /// No-op (returns `None`) when idle or already stopping. Resolves once
    /// every captured handle has been terminated and released or has timed
    /// out; the run is then idle.
    pub async fn stop_run(&self) -> Option<TeardownReport> {
        let ctx = {
            let mut slot = self.shared.slot.lock();
            if slot.state != RunState::Running {
                return None;
            }
            slot.state = RunState::Stopping;
            slot.current.clone()?
        };

        let handles = ctx.registry.drain();
        ctx.cancel.cancel();
        info!(run_id = %ctx.run_id, handles = handles.len(), "Stopping load test");
        ctx.emit(LoadTestEvent::RunStopping {
            run_id: ctx.run_id,
            handles: handles.len(),
        });

        let report = teardown_handles(handles).await;

        self.shared.slot.lock().settle(&ctx);
        info!(run_id = %ctx.run_id, "Load test stopped");
        ctx.emit(LoadTestEvent::RunStopped {
            run_id: ctx.run_id,
            report,
        });
        Some(report)
    }
}

async fn run(shared: Arc<TesterShared>, ctx: Arc<RunContext>) -> RunSummary {
    info!(
        run_id = %ctx.run_id,
        backend = shared.backend.name(),
        target = %ctx.target,
        concurrency = ctx.concurrency,
        hold_secs = ctx.settings.hold.as_secs(),
        auto_hangup = ctx.settings.auto_hangup,
        "Load test started"
    );
    ctx.emit(LoadTestEvent::RunStarted {
        run_id: ctx.run_id,
        target: ctx.target.to_string(),
        concurrency: ctx.concurrency,
    });

    let drivers: Vec<_> = (0..ctx.concurrency)
        .map(|i| tokio::spawn(drive_attempt(ctx.clone(), AttemptId(i))))
        .collect();
    for result in join_all(drivers).await {
        if let Err(e) = result {
            error!(run_id = %ctx.run_id, error = %e, "Attempt driver task failed");
        }
    }

    // A stopping run goes idle when its teardown settles
    {
        let mut slot = shared.slot.lock();
        if slot.state == RunState::Running {
            slot.settle(&ctx);
        }
    }

    let summary = ctx.summary();
    info!(
        run_id = %ctx.run_id,
        total = summary.counters.total_attempts,
        succeeded = summary.counters.succeeded,
        failed = summary.counters.failed,
        aborted = summary.aborted,
        stopped = summary.stopped,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Load test completed"
    );
    ctx.emit(LoadTestEvent::RunCompleted(summary.clone()));
    summary
}
