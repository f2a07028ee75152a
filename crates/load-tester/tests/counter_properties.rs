//! Counter invariants over arbitrary runs
//!
//! For any N and any mix of attempt behaviors, a run that completes on its
//! own, or is stopped part way, ends with every attempt accounted for.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use sipconsole_client_core::sim::{SimBackend, SimPlan};
use sipconsole_client_core::Credentials;
use sipconsole_load_tester::{LoadTestConfig, LoadTester, RunState, RunSummary};

fn plan_strategy() -> impl Strategy<Value = SimPlan> {
    prop_oneof![
        4 => (1u64..200).prop_map(|ms| SimPlan::answering(Duration::from_millis(ms))),
        1 => Just(SimPlan::construct_error("unsupported transport")),
        1 => Just(SimPlan::refusing_connect("connection refused")),
        1 => Just(SimPlan::dropping_after_connect()),
        1 => Just(SimPlan::hanging_connect()),
        1 => Just(SimPlan::rejecting(486, "Busy Here")),
        1 => Just(SimPlan::never_answering()),
        1 => (1u64..500).prop_map(|ms| {
            SimPlan::answering(Duration::from_millis(10)).with_remote_hangup_after(Duration::from_millis(ms))
        }),
    ]
}

fn config(concurrency: usize) -> LoadTestConfig {
    LoadTestConfig::new(
        Credentials::new("sip:5001@pbx.local", "wss://pbx.local:7443", "5001", "secret"),
        "sip:1413@pbx.local",
    )
    .with_concurrency(concurrency)
    .with_hold_secs(2)
    .with_answer_timeout_secs(Some(3))
    .with_connect_timeout_secs(5)
}

/// Run on a paused current-thread runtime, optionally stopping after `stop_after`
fn run(plans: Vec<SimPlan>, stop_after: Option<Duration>) -> (RunSummary, RunState, SimBackend) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(async move {
        let backend = SimBackend::new();
        let concurrency = plans.len();
        backend.push_plans(plans);
        let tester = LoadTester::new(Arc::new(backend.clone()));

        let handle = tester.launch(config(concurrency)).unwrap().unwrap();
        if let Some(after) = stop_after {
            tokio::time::sleep(after).await;
            tester.stop_run().await;
        }
        let summary = handle.wait().await.unwrap();
        (summary, tester.state(), backend)
    })
}

fn assert_accounted(summary: &RunSummary, n: usize) {
    let counters = summary.counters;
    assert_eq!(counters.total_attempts, n);
    assert_eq!(counters.succeeded + counters.failed, n);
    assert_eq!(counters.completed, n);
    assert_eq!(counters.active, 0);
    assert_eq!(counters.active, counters.total_attempts - counters.succeeded - counters.failed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_completed_run_accounts_for_every_attempt(plans in prop::collection::vec(plan_strategy(), 0..=30)) {
        let n = plans.len();
        let (summary, state, backend) = run(plans, None);

        assert_accounted(&summary, n);
        prop_assert_eq!(state, RunState::Idle);
        prop_assert!(!summary.stopped);
        prop_assert!(backend.endpoints().iter().all(|e| e.is_released()));
    }

    #[test]
    fn prop_stopped_run_accounts_for_every_attempt(
        plans in prop::collection::vec(plan_strategy(), 1..=30),
        stop_ms in 0u64..3_000,
    ) {
        let n = plans.len();
        let (summary, state, backend) = run(plans, Some(Duration::from_millis(stop_ms)));

        assert_accounted(&summary, n);
        prop_assert_eq!(state, RunState::Idle);
        prop_assert!(summary.aborted <= summary.counters.failed);
        prop_assert!(backend.endpoints().iter().all(|e| e.is_released()));

        // No call was terminated twice
        let stats = backend.stats();
        prop_assert!(stats.terminates <= stats.calls_placed);
        prop_assert_eq!(stats.releases, backend.endpoints().len());
    }
}
