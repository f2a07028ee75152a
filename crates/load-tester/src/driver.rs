//! Call attempt driver
//!
//! Drives one attempt from endpoint construction to a terminal outcome:
//!
//! 1. count the attempt (`total_attempts`, `active`) before any network action
//! 2. construct the endpoint and register its handle for teardown
//! 3. connect the transport, bounded by the connect timeout
//! 4. place the call without local media, under the same bound
//! 5. wait for establishment (optionally bounded by the answer timeout)
//! 6. once established, hold the call until auto-hangup, remote hangup or stop
//! 7. fold the outcome into the counters, release the endpoint, complete
//!
//! A stop from the teardown controller is observed at every suspension point
//! through the run's cancellation token. When a call event and the stop are
//! ready at the same time the call event is handled first, so an attempt that
//! establishes in the same instant the run is stopped counts as succeeded.
//!
//! No error escapes a driver. Every exit path releases the endpoint it
//! created, and terminate and release go through the shared
//! [`AttemptHandle`], so they happen at most once even when the teardown
//! controller reaches the same handle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sipconsole_client_core::recovery::with_timeout;
use sipconsole_client_core::{CallEvent, CallOptions, EndpointEvent, EventStream, SignalingEndpoint};
use tracing::{debug, error};

use crate::attempt::{Attempt, AttemptId, AttemptReport, AttemptState};
use crate::context::RunContext;
use crate::events::LoadTestEvent;
use crate::registry::AttemptHandle;

/// Drive one attempt to completion
pub(crate) async fn drive_attempt(ctx: Arc<RunContext>, id: AttemptId) -> AttemptReport {
    ctx.counters.attempt_started();
    let mut attempt = Attempt::new(id, ctx.target.clone());
    debug!(run_id = %ctx.run_id, attempt = %id, "Attempt started");

    let handle = run_attempt(&ctx, &mut attempt).await;
    // Teardown may have failed the connect or the call before the token was seen
    if ctx.cancel.is_cancelled() && !attempt.was_established() {
        attempt.mark_stopped();
    }

    ctx.counters.attempt_finished(attempt.was_established());

    if let Some(handle) = handle {
        if attempt.is_stopped() {
            handle.terminate().await;
        }
        handle.release().await;
        ctx.registry.remove(id);
    }

    let report = attempt.finish();
    debug!(
        run_id = %ctx.run_id,
        attempt = %id,
        outcome = %report.outcome,
        last_state = ?report.last_state,
        cause = ?report.cause,
        "Attempt finished"
    );
    ctx.emit(LoadTestEvent::AttemptFinished {
        run_id: ctx.run_id,
        attempt: id,
        outcome: report.outcome,
        cause: report.cause.clone(),
    });
    ctx.record(report.clone());
    report
}

fn advance(ctx: &RunContext, attempt: &mut Attempt, next: AttemptState) {
    match attempt.transition(next) {
        Ok(()) => debug!(run_id = %ctx.run_id, attempt = %attempt.id(), state = ?next, "Attempt transition"),
        Err(e) => error!(run_id = %ctx.run_id, attempt = %attempt.id(), error = %e, "Attempt state machine violation"),
    }
}

/// Everything up to the terminal state. Returns the handle to release, if an
/// endpoint was created.
async fn run_attempt(ctx: &RunContext, attempt: &mut Attempt) -> Option<Arc<AttemptHandle>> {
    let settings = ctx.settings;
    if ctx.cancel.is_cancelled() {
        attempt.mark_stopped();
        return None;
    }

    let (endpoint, mut endpoint_events) = match ctx.backend.create_endpoint(&ctx.credentials) {
        Ok(created) => created,
        Err(e) => {
            debug!(run_id = %ctx.run_id, attempt = %attempt.id(), error = %e, "Endpoint construction failed");
            attempt.set_cause(e.to_string());
            return None;
        }
    };

    let handle = Arc::new(AttemptHandle::new(attempt.id(), endpoint.clone(), settings.teardown_timeout));
    if !ctx.registry.register(handle.clone()) || ctx.cancel.is_cancelled() {
        attempt.mark_stopped();
        return Some(handle);
    }

    advance(ctx, attempt, AttemptState::Connecting);
    let connected = tokio::select! {
        biased;
        result = with_timeout("connect", settings.connect_timeout, endpoint.connect()) => result,
        _ = ctx.cancel.cancelled() => {
            attempt.mark_stopped();
            return Some(handle);
        }
    };
    if let Err(e) = connected {
        advance(ctx, attempt, AttemptState::ConnectFailed);
        attempt.set_cause(e.to_string());
        return Some(handle);
    }
    if let Some(reason) = disconnected_before_call(endpoint.as_ref(), &mut endpoint_events) {
        advance(ctx, attempt, AttemptState::ConnectFailed);
        attempt.set_cause(reason);
        return Some(handle);
    }
    advance(ctx, attempt, AttemptState::Connected);

    if ctx.cancel.is_cancelled() {
        attempt.mark_stopped();
        return Some(handle);
    }
    let placed = tokio::select! {
        biased;
        result = with_timeout(
            "place call",
            settings.connect_timeout,
            endpoint.place_call(&ctx.target, CallOptions::no_media()),
        ) => result,
        _ = ctx.cancel.cancelled() => {
            attempt.mark_stopped();
            return Some(handle);
        }
    };
    let (call, mut call_events) = match placed {
        Ok(placed) => placed,
        Err(e) => {
            attempt.set_cause(e.to_string());
            return Some(handle);
        }
    };
    handle.attach_call(call);
    advance(ctx, attempt, AttemptState::CallPlaced);

    // Wait for establishment
    let answer_timer = optional_sleep(settings.answer_timeout);
    tokio::pin!(answer_timer);
    loop {
        tokio::select! {
            biased;
            event = call_events.recv() => match event {
                Some(CallEvent::Progress { status_code, reason }) => {
                    debug!(run_id = %ctx.run_id, attempt = %attempt.id(), status_code, reason = %reason, "Call progress");
                }
                Some(CallEvent::Established) => {
                    advance(ctx, attempt, AttemptState::Established);
                    ctx.counters.attempt_established();
                    ctx.emit(LoadTestEvent::AttemptEstablished {
                        run_id: ctx.run_id,
                        attempt: attempt.id(),
                        setup_ms: attempt.elapsed().as_millis() as u64,
                    });
                    break;
                }
                Some(CallEvent::Ended { cause }) | Some(CallEvent::Failed { cause, .. }) => {
                    advance(ctx, attempt, AttemptState::EstablishFailed);
                    attempt.set_cause(cause);
                    return Some(handle);
                }
                None => {
                    advance(ctx, attempt, AttemptState::EstablishFailed);
                    attempt.set_cause("call event stream closed");
                    return Some(handle);
                }
            },
            _ = &mut answer_timer => {
                advance(ctx, attempt, AttemptState::EstablishFailed);
                attempt.set_cause("answer timeout");
                handle.terminate().await;
                return Some(handle);
            }
            _ = ctx.cancel.cancelled() => {
                attempt.mark_stopped();
                return Some(handle);
            }
        }
    }

    // Established: hold until auto-hangup, remote end or stop
    let hangup_timer = optional_sleep(settings.auto_hangup.then_some(settings.hold));
    tokio::pin!(hangup_timer);
    loop {
        tokio::select! {
            biased;
            event = call_events.recv() => match event {
                Some(CallEvent::Ended { cause }) | Some(CallEvent::Failed { cause, .. }) => {
                    attempt.set_cause(cause);
                    break;
                }
                None => {
                    attempt.set_cause("call event stream closed");
                    break;
                }
                Some(_) => {}
            },
            _ = &mut hangup_timer => {
                debug!(run_id = %ctx.run_id, attempt = %attempt.id(), hold_secs = settings.hold.as_secs(), "Auto hangup");
                attempt.set_cause("auto hangup");
                handle.terminate().await;
                let _ = tokio::time::timeout(settings.teardown_timeout, wait_for_end(&mut call_events)).await;
                break;
            }
            _ = ctx.cancel.cancelled() => {
                attempt.mark_stopped();
                break;
            }
        }
    }

    Some(handle)
}

/// A transport that dropped between connect and call placement
fn disconnected_before_call(
    endpoint: &dyn SignalingEndpoint,
    events: &mut EventStream<EndpointEvent>,
) -> Option<String> {
    while let Ok(event) = events.try_recv() {
        if let EndpointEvent::Disconnected { reason } = event {
            return Some(reason.unwrap_or_else(|| "transport disconnected before call".to_string()));
        }
    }
    if !endpoint.is_connected() {
        return Some("transport disconnected before call".to_string());
    }
    None
}

fn optional_sleep(duration: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    }
}

async fn wait_for_end(events: &mut EventStream<CallEvent>) {
    while let Some(event) = events.recv().await {
        if event.is_terminal() {
            return;
        }
    }
}
