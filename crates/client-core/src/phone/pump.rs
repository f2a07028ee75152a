//! Event pumps: endpoint events and per-call events into phone state

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{PhoneEvent, PhoneInner};
use crate::backend::{CallEvent, EndpointEvent, EventStream, IncomingCall};
use crate::types::{CallId, ReceivedMessage};

pub(crate) async fn run_endpoint_pump(inner: Arc<PhoneInner>, mut events: EventStream<EndpointEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EndpointEvent::Connected => {
                debug!("Transport connected");
                inner.update(|s| s.is_connected = true);
                inner.emit(PhoneEvent::Connected);
            }
            EndpointEvent::Disconnected { reason } => {
                warn!(reason = ?reason, "Transport disconnected");
                inner.update(|s| s.is_connected = false);
                inner.emit(PhoneEvent::Disconnected { reason });
            }
            EndpointEvent::RegistrationChanged { registered } => {
                debug!(registered, "Registration state changed");
                inner.update(|s| s.is_registered = registered);
                inner.emit(PhoneEvent::RegistrationChanged { registered });
            }
            EndpointEvent::IncomingCall(call) => on_incoming_call(&inner, call),
            EndpointEvent::Message(message) => {
                let message = ReceivedMessage::from(message);
                info!(from = %message.from, "Message received");
                {
                    let mut inbox = inner.inbox.lock();
                    inbox.push_front(message.clone());
                    inbox.truncate(inner.config.inbox_capacity);
                }
                inner.emit(PhoneEvent::MessageReceived(message));
            }
        }
    }
    debug!("Endpoint event stream closed");
}

fn on_incoming_call(inner: &Arc<PhoneInner>, call: IncomingCall) {
    let IncomingCall { session, events, caller } = call;
    let call_id = session.id();
    info!(call_id = %call_id, caller = %caller.uri, "Incoming call");

    // A newer invitation replaces an unanswered one
    let replaced = inner.incoming_call.lock().replace(session);
    if let Some(old) = replaced {
        debug!(call_id = %old.id(), "Unanswered incoming call replaced");
    }

    inner.update(|s| {
        s.has_incoming_call = true;
        s.incoming_caller = Some(caller.clone());
    });
    inner.emit(PhoneEvent::IncomingCall { call_id, caller });
    tokio::spawn(run_call_pump(inner.clone(), call_id, events));
}

/// Follow one call until its stream ends
pub(crate) async fn run_call_pump(inner: Arc<PhoneInner>, call_id: CallId, mut events: EventStream<CallEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            CallEvent::Progress { status_code, reason } => {
                debug!(call_id = %call_id, status_code, reason = %reason, "Call progress");
            }
            CallEvent::Established => {
                info!(call_id = %call_id, "Call established");
                if inner.is_active_call(call_id) {
                    inner.update(|s| {
                        s.is_calling = true;
                        s.is_established = true;
                    });
                }
                inner.emit(PhoneEvent::CallEstablished { call_id });
            }
            CallEvent::Ended { cause } => {
                info!(call_id = %call_id, cause = %cause, "Call ended");
                finish(&inner, call_id, cause);
                return;
            }
            CallEvent::Failed { cause, status_code } => {
                warn!(call_id = %call_id, cause = %cause, status_code = ?status_code, "Call failed");
                finish(&inner, call_id, cause);
                return;
            }
        }
    }
    debug!(call_id = %call_id, "Call event stream closed");
}

fn finish(inner: &PhoneInner, call_id: CallId, cause: String) {
    inner.clear_call(call_id);
    inner.emit(PhoneEvent::CallEnded { call_id, cause });
}
