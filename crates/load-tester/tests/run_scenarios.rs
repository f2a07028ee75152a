//! Load test runs against the simulated backend
//!
//! Runs use paused time, so hold periods and timeouts elapse instantly once
//! every task is idle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use sipconsole_client_core::sim::{SimBackend, SimPlan};
use sipconsole_client_core::{
    CallEvent, CallOptions, CallSession, ClientResult, Credentials, EndpointEvent, EventStream, SignalingBackend,
    SignalingEndpoint, SipUri,
};
use sipconsole_load_tester::{
    AttemptOutcome, CounterSnapshot, LoadTestConfig, LoadTestError, LoadTestEvent, LoadTester, RunState,
    TeardownReport,
};
use tokio::time::sleep;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sipconsole_load_tester=debug,sipconsole_client_core=info")
        .with_test_writer()
        .try_init();
}

fn config(concurrency: usize) -> LoadTestConfig {
    LoadTestConfig::new(
        Credentials::new("sip:5001@pbx.local", "wss://pbx.local:7443", "5001", "secret"),
        "sip:1413@pbx.local",
    )
    .with_concurrency(concurrency)
    .with_hold_secs(1)
}

fn tester(backend: &SimBackend) -> LoadTester {
    LoadTester::new(Arc::new(backend.clone()))
}

/// Simulated endpoints whose INVITE never gets a response
struct StalledInviteBackend(SimBackend);

#[derive(Debug)]
struct StalledInviteEndpoint(Arc<dyn SignalingEndpoint>);

impl SignalingBackend for StalledInviteBackend {
    fn name(&self) -> &str {
        "stalled-invite"
    }

    fn create_endpoint(
        &self,
        credentials: &Credentials,
    ) -> ClientResult<(Arc<dyn SignalingEndpoint>, EventStream<EndpointEvent>)> {
        let (endpoint, events) = self.0.create_endpoint(credentials)?;
        let endpoint: Arc<dyn SignalingEndpoint> = Arc::new(StalledInviteEndpoint(endpoint));
        Ok((endpoint, events))
    }
}

#[async_trait]
impl SignalingEndpoint for StalledInviteEndpoint {
    fn identity(&self) -> &SipUri {
        self.0.identity()
    }

    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    async fn connect(&self) -> ClientResult<()> {
        self.0.connect().await
    }

    async fn register(&self) -> ClientResult<()> {
        self.0.register().await
    }

    async fn unregister(&self) -> ClientResult<()> {
        self.0.unregister().await
    }

    async fn place_call(
        &self,
        _target: &SipUri,
        _options: CallOptions,
    ) -> ClientResult<(Arc<dyn CallSession>, EventStream<CallEvent>)> {
        std::future::pending().await
    }

    async fn send_message(&self, target: &SipUri, body: &str) -> ClientResult<()> {
        self.0.send_message(target, body).await
    }

    async fn release(&self) -> ClientResult<()> {
        self.0.release().await
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_all_attempts_establish() {
    init_tracing();
    let backend = SimBackend::new();
    let tester = tester(&backend);

    let summary = tester.start_run(config(5)).await.unwrap().unwrap();

    assert_eq!(
        summary.counters,
        CounterSnapshot {
            total_attempts: 5,
            active: 0,
            succeeded: 5,
            failed: 0,
            completed: 5,
        }
    );
    assert!(!summary.stopped);
    assert!(summary.failure_causes.is_empty());
    assert!(summary.mean_setup_ms.is_some());

    // Every endpoint hung up its call and was released
    let stats = backend.stats();
    assert_eq!(stats.endpoints_created, 5);
    assert_eq!(stats.calls_placed, 5);
    assert_eq!(stats.terminates, 5);
    assert_eq!(stats.releases, 5);

    let live = tester.stats();
    assert_eq!(live.state, RunState::Idle);
    assert_eq!(live.progress, 100);
    assert_eq!(live.counters, summary.counters);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_connect_failure_is_counted() {
    init_tracing();
    let backend = SimBackend::new();
    backend.push_plan(SimPlan::refusing_connect("connection refused"));
    let tester = tester(&backend);

    let summary = tester.start_run(config(3)).await.unwrap().unwrap();

    assert_eq!(summary.counters.total_attempts, 3);
    assert_eq!(summary.counters.succeeded, 2);
    assert_eq!(summary.counters.failed, 1);
    assert_eq!(summary.counters.active, 0);
    assert_eq!(summary.failure_causes.values().sum::<usize>(), 1);
    assert_eq!(summary.aborted, 0);
    // The refused endpoint is still released
    assert_eq!(backend.stats().releases, 3);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_failure_modes() {
    init_tracing();
    let backend = SimBackend::new();
    backend.push_plans([
        SimPlan::construct_error("no WebSocket support"),
        SimPlan::dropping_after_connect(),
        SimPlan::rejecting(486, "Busy Here"),
        SimPlan::never_answering(),
    ]);
    let tester = tester(&backend);

    let summary = tester
        .start_run(config(4).with_answer_timeout_secs(Some(2)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.counters.total_attempts, 4);
    assert_eq!(summary.counters.failed, 4);
    assert_eq!(summary.counters.succeeded, 0);
    assert_eq!(summary.counters.active, 0);
    assert_eq!(summary.failure_causes.get("Busy Here"), Some(&1));
    assert_eq!(summary.failure_causes.get("answer timeout"), Some(&1));
    assert_eq!(summary.failure_causes.get("transport closed"), Some(&1));
    assert_eq!(summary.failure_causes.values().sum::<usize>(), 4);

    let stats = backend.stats();
    assert_eq!(stats.endpoints_created, 4);
    // The unanswered call was cancelled on answer timeout
    assert_eq!(stats.terminates, 1);
    // Construction failed for one attempt, so there was nothing to release
    assert_eq!(stats.releases, 3);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_remote_hangup_keeps_success() {
    init_tracing();
    let backend = SimBackend::new()
        .with_default_plan(SimPlan::answering(Duration::from_millis(20)).with_remote_hangup_after(Duration::from_millis(100)));
    let tester = tester(&backend);

    let summary = tester.start_run(config(2).with_hold_secs(60)).await.unwrap().unwrap();

    assert_eq!(summary.counters.succeeded, 2);
    assert_eq!(summary.counters.failed, 0);
    // The far end hung up before auto-hangup was due
    assert!(summary.elapsed < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_stop_tears_down_mixed_run() {
    init_tracing();
    let backend = SimBackend::new();
    backend.push_plans((0..6).map(|_| SimPlan::hanging_connect()));
    backend.push_plans((0..4).map(|_| SimPlan::answering(Duration::from_millis(10))));
    let tester = tester(&backend);

    let handle = tester
        .launch(config(10).with_auto_hangup(false))
        .unwrap()
        .unwrap();

    sleep(Duration::from_secs(1)).await;
    let live = tester.stats();
    assert_eq!(live.state, RunState::Running);
    assert_eq!(live.counters.total_attempts, 10);
    assert_eq!(live.counters.active, 10);
    assert_eq!(live.counters.succeeded, 4);

    let report = tester.stop_run().await.unwrap();
    assert_eq!(
        report,
        TeardownReport {
            handles: 10,
            calls: 4,
            terminate_failures: 0,
            release_failures: 0,
        }
    );
    assert_eq!(tester.state(), RunState::Idle);

    let summary = handle.wait().await.unwrap();
    assert!(summary.stopped);
    assert_eq!(summary.counters.total_attempts, 10);
    assert_eq!(summary.counters.succeeded, 4);
    assert_eq!(summary.counters.failed, 6);
    assert_eq!(summary.counters.active, 0);
    assert_eq!(summary.aborted, 6);

    // Each call terminated and each endpoint released exactly once
    let stats = backend.stats();
    assert_eq!(stats.terminates, 4);
    assert_eq!(stats.releases, 10);
    assert!(backend.endpoints().iter().all(|e| e.is_released()));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_stop_survives_failing_teardown() {
    init_tracing();
    let backend = SimBackend::new();
    backend.push_plans([
        SimPlan::default().with_failing_terminate(),
        SimPlan::default().with_hanging_release(),
        SimPlan::default().with_failing_release(),
    ]);
    let tester = tester(&backend);

    let handle = tester
        .launch(config(3).with_auto_hangup(false).with_teardown_timeout_ms(500))
        .unwrap()
        .unwrap();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(tester.stats().counters.succeeded, 3);

    let report = tester.stop_run().await.unwrap();
    assert_eq!(report.handles, 3);
    assert_eq!(report.calls, 3);
    assert_eq!(report.terminate_failures, 1);
    assert_eq!(report.release_failures, 2);
    assert_eq!(tester.state(), RunState::Idle);

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.counters.active, 0);
    assert_eq!(summary.counters.succeeded, 3);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_start_and_stop_are_idempotent() {
    init_tracing();
    let backend = SimBackend::new();
    let tester = tester(&backend);

    assert_eq!(tester.stop_run().await, None);
    assert_eq!(tester.state(), RunState::Idle);

    let handle = tester.launch(config(2).with_auto_hangup(false)).unwrap().unwrap();
    let first_run = handle.run_id();
    assert!(tester.launch(config(5)).unwrap().is_none());
    assert!(tester.start_run(config(5)).await.unwrap().is_none());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(tester.stats().run_id, Some(first_run));
    assert_eq!(tester.stats().counters.total_attempts, 2);

    assert!(tester.stop_run().await.is_some());
    assert_eq!(tester.stop_run().await, None);
    handle.wait().await.unwrap();

    // A new run starts from zeroed counters
    let summary = tester.start_run(config(1)).await.unwrap().unwrap();
    assert_ne!(summary.run_id, first_run);
    assert_eq!(summary.counters.total_attempts, 1);
    assert_eq!(summary.counters.succeeded, 1);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_invalid_config_leaves_tester_idle() {
    init_tracing();
    let backend = SimBackend::new();
    let tester = tester(&backend);

    let bad_target = LoadTestConfig {
        target: "1413@pbx.local".to_string(),
        ..config(3)
    };
    assert!(matches!(tester.start_run(bad_target).await, Err(LoadTestError::Client(_))));
    assert_eq!(tester.state(), RunState::Idle);
    assert_eq!(backend.stats().endpoints_created, 0);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_zero_concurrency_completes_immediately() {
    init_tracing();
    let tester = tester(&SimBackend::new());

    let summary = tester.start_run(config(0)).await.unwrap().unwrap();
    assert_eq!(summary.counters, CounterSnapshot::default());
    assert_eq!(tester.stats().progress, 100);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_event_stream() {
    init_tracing();
    let backend = SimBackend::new();
    backend.push_plan(SimPlan::rejecting(603, "Decline"));
    let tester = tester(&backend);
    let mut events = tester.subscribe();

    let summary = tester.start_run(config(2)).await.unwrap().unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.run_id(), summary.run_id);
        received.push(event);
    }

    assert!(matches!(received.first(), Some(LoadTestEvent::RunStarted { concurrency: 2, .. })));
    assert!(matches!(received.last(), Some(LoadTestEvent::RunCompleted(s)) if s == &summary));

    let established = received
        .iter()
        .filter(|e| matches!(e, LoadTestEvent::AttemptEstablished { .. }))
        .count();
    assert_eq!(established, 1);

    let outcomes: Vec<_> = received
        .iter()
        .filter_map(|e| match e {
            LoadTestEvent::AttemptFinished { outcome, cause, .. } => Some((*outcome, cause.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.contains(&(AttemptOutcome::Failed, Some("Decline".to_string()))));
    assert!(outcomes.contains(&(AttemptOutcome::Succeeded, Some("auto hangup".to_string()))));

    let json = serde_json::to_value(&received[0]).unwrap();
    assert_eq!(json["type"], "run_started");
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_stop_ends_attempts_stuck_placing_call() {
    init_tracing();
    let backend = SimBackend::new();
    let tester = LoadTester::new(Arc::new(StalledInviteBackend(backend.clone())));

    let handle = tester
        .launch(config(2).with_answer_timeout_secs(Some(2)).with_connect_timeout_secs(3600))
        .unwrap()
        .unwrap();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(tester.stats().counters.active, 2);

    let report = tester.stop_run().await.unwrap();
    assert_eq!(report.handles, 2);
    assert_eq!(report.calls, 0);
    assert_eq!(tester.state(), RunState::Idle);

    let summary = tokio::time::timeout(Duration::from_secs(60), handle.wait())
        .await
        .expect("Run did not complete after stop")
        .unwrap();
    assert_eq!(summary.counters.total_attempts, 2);
    assert_eq!(summary.counters.active, 0);
    assert_eq!(summary.counters.failed, 2);
    assert_eq!(summary.aborted, 2);
    assert_eq!(backend.stats().releases, 2);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_stalled_call_placement_times_out() {
    init_tracing();
    let backend = SimBackend::new();
    let tester = LoadTester::new(Arc::new(StalledInviteBackend(backend.clone())));

    let summary = tester
        .start_run(config(3).with_connect_timeout_secs(5))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.counters.failed, 3);
    assert_eq!(summary.counters.active, 0);
    assert_eq!(summary.aborted, 0);
    assert!(summary.failure_causes.keys().all(|cause| cause.contains("place call")));
    assert!(summary.elapsed >= Duration::from_secs(5));
    assert_eq!(backend.stats().releases, 3);
}
