//! Per-run context shared by the drivers of one run

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sipconsole_client_core::{Credentials, SignalingBackend, SipUri};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::attempt::AttemptReport;
use crate::config::LoadTestConfig;
use crate::events::LoadTestEvent;
use crate::registry::HandleRegistry;
use crate::stats::{CounterSnapshot, ReportDigest, RunCounters, RunSummary};

/// Timing knobs every driver of a run follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttemptSettings {
    pub hold: Duration,
    pub auto_hangup: bool,
    pub answer_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub teardown_timeout: Duration,
}

/// Everything one run owns. A new context per run gives every run fresh
/// counters and a fresh handle registry.
pub(crate) struct RunContext {
    pub run_id: Uuid,
    pub backend: Arc<dyn SignalingBackend>,
    pub credentials: Credentials,
    pub target: SipUri,
    pub concurrency: usize,
    pub settings: AttemptSettings,
    pub counters: RunCounters,
    pub registry: HandleRegistry,
    pub cancel: CancellationToken,
    pub events: broadcast::Sender<LoadTestEvent>,
    pub started_at: DateTime<Utc>,
    started: Instant,
    reports: Mutex<Vec<AttemptReport>>,
}

impl RunContext {
    pub(crate) fn new(
        backend: Arc<dyn SignalingBackend>,
        config: &LoadTestConfig,
        target: SipUri,
        events: broadcast::Sender<LoadTestEvent>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            backend,
            credentials: config.attempt_credentials(),
            target,
            concurrency: config.concurrency,
            settings: AttemptSettings {
                hold: config.hold_duration(),
                auto_hangup: config.auto_hangup,
                answer_timeout: config.answer_timeout(),
                connect_timeout: config.connect_timeout(),
                teardown_timeout: config.teardown_timeout(),
            },
            counters: RunCounters::default(),
            registry: HandleRegistry::default(),
            cancel: CancellationToken::new(),
            events,
            started_at: Utc::now(),
            started: Instant::now(),
            reports: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn emit(&self, event: LoadTestEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn record(&self, report: AttemptReport) {
        self.reports.lock().push(report);
    }

    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub(crate) fn summary(&self) -> RunSummary {
        let digest = {
            let reports = self.reports.lock();
            ReportDigest::from_reports(&reports)
        };
        RunSummary {
            run_id: self.run_id,
            target: self.target.to_string(),
            concurrency: self.concurrency,
            counters: self.snapshot(),
            aborted: digest.aborted,
            stopped: self.cancel.is_cancelled(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed: self.started.elapsed(),
            mean_setup_ms: digest.mean_setup_ms,
            max_setup_ms: digest.max_setup_ms,
            failure_causes: digest.failure_causes,
        }
    }
}
