//! Softphone controller
//!
//! `SipPhone` is the single-user side of the console: one registered
//! identity, at most one active call plus one pending incoming call, and an
//! inbox of instant messages. It owns no SIP logic; everything goes through a
//! [`SignalingBackend`].
//!
//! # State
//!
//! UI-facing flags live in a [`PhoneStatus`] published on a
//! `tokio::sync::watch` channel, so a front end can render the latest value
//! without polling. Discrete happenings (incoming call, call ended, message
//! received) are broadcast as [`PhoneEvent`]s.
//!
//! # Tasks
//!
//! Registering spawns an endpoint pump that turns [`EndpointEvent`]s into
//! status changes. Each call gets its own pump over its [`CallEvent`]
//! stream. Pumps compare call ids before touching state, so a late event from
//! a finished call cannot reset the flags of a newer one.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipconsole_client_core::{Credentials, CallOptions, SipPhone, PhoneConfig};
//! use sipconsole_client_core::sim::SimBackend;
//!
//! # async fn example() -> sipconsole_client_core::ClientResult<()> {
//! let phone = SipPhone::new(Arc::new(SimBackend::new()), PhoneConfig::default());
//! phone
//!     .register(Credentials::new("sip:5001@pbx.local", "wss://pbx.local:7443", "5001", "secret"))
//!     .await?;
//!
//! let call_id = phone.make_call("sip:1413@pbx.local", CallOptions::default()).await?;
//! phone.send_dtmf("5").await?;
//! phone.hangup().await?;
//! # let _ = call_id;
//! # Ok(())
//! # }
//! ```
//!
//! [`EndpointEvent`]: crate::backend::EndpointEvent
//! [`CallEvent`]: crate::backend::CallEvent

mod calls;
mod controls;
mod messaging;
mod pump;
mod registration;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::{CallSession, SignalingBackend, SignalingEndpoint};
use crate::error::{ClientError, ClientResult};
use crate::types::{CallId, CallerInfo, Credentials, ReceivedMessage};
use crate::uri::host_from_uri;

/// Softphone configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneConfig {
    /// Registration (connect + REGISTER) must finish within this time
    pub register_timeout: Duration,
    /// Log diagnostics if an outbound call is not established after this
    pub invite_watchdog: Duration,
    /// Tone duration for DTMF
    pub dtmf_duration: Duration,
    /// Maximum number of messages kept in the inbox
    pub inbox_capacity: usize,
    /// Bound on each hangup/unregister/release step
    pub teardown_timeout: Duration,
    /// Capacity of the [`PhoneEvent`] broadcast channel
    pub event_capacity: usize,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            register_timeout: Duration::from_secs(30),
            invite_watchdog: Duration::from_secs(5),
            dtmf_duration: Duration::from_millis(200),
            inbox_capacity: 100,
            teardown_timeout: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}

impl PhoneConfig {
    pub fn with_register_timeout(mut self, timeout: Duration) -> Self {
        self.register_timeout = timeout;
        self
    }

    pub fn with_invite_watchdog(mut self, delay: Duration) -> Self {
        self.invite_watchdog = delay;
        self
    }

    pub fn with_dtmf_duration(mut self, duration: Duration) -> Self {
        self.dtmf_duration = duration;
        self
    }

    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }
}

/// Flags a front end renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhoneStatus {
    pub is_registered: bool,
    pub is_connected: bool,
    /// An outbound call is ringing or an accepted call is in progress
    pub is_calling: bool,
    pub is_established: bool,
    pub is_held: bool,
    pub is_muted: bool,
    pub has_incoming_call: bool,
    pub incoming_caller: Option<CallerInfo>,
    pub last_error: Option<String>,
}

impl PhoneStatus {
    fn reset_call(&mut self) {
        self.is_calling = false;
        self.is_established = false;
        self.is_held = false;
        self.is_muted = false;
    }

    fn clear_incoming(&mut self) {
        self.has_incoming_call = false;
        self.incoming_caller = None;
    }
}

/// Discrete phone happenings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneEvent {
    Connected,
    Disconnected { reason: Option<String> },
    RegistrationChanged { registered: bool },
    IncomingCall { call_id: CallId, caller: CallerInfo },
    CallEstablished { call_id: CallId },
    CallEnded { call_id: CallId, cause: String },
    /// An outbound call was still not established when the watchdog fired
    InviteWatchdog { call_id: CallId },
    MessageReceived(ReceivedMessage),
}

/// Snapshot returned by [`SipPhone::diagnose`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneDiagnostics {
    pub backend: String,
    pub identity: Option<String>,
    pub ws_server: Option<String>,
    pub server_host: Option<String>,
    pub transport_connected: bool,
    pub active_call: Option<CallId>,
    pub pending_incoming_call: Option<CallId>,
    pub inbox_len: usize,
    pub status: PhoneStatus,
}

pub(crate) struct EndpointSlot {
    pub(crate) endpoint: Arc<dyn SignalingEndpoint>,
    pub(crate) credentials: Credentials,
    pub(crate) pump: JoinHandle<()>,
}

/// Held by `make_call` until the placed session is stored or placement fails
pub(crate) struct PlacementClaim<'a>(&'a AtomicBool);

impl Drop for PlacementClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State shared between the phone and its pump tasks
pub(crate) struct PhoneInner {
    pub(crate) config: PhoneConfig,
    pub(crate) status: watch::Sender<PhoneStatus>,
    pub(crate) events: broadcast::Sender<PhoneEvent>,
    pub(crate) endpoint: Mutex<Option<EndpointSlot>>,
    pub(crate) active_call: Mutex<Option<Arc<dyn CallSession>>>,
    /// An outbound call is between the in-progress check and `active_call`
    pub(crate) placing: AtomicBool,
    pub(crate) incoming_call: Mutex<Option<Arc<dyn CallSession>>>,
    pub(crate) inbox: Mutex<VecDeque<ReceivedMessage>>,
}

impl PhoneInner {
    pub(crate) fn update(&self, f: impl FnOnce(&mut PhoneStatus)) {
        self.status.send_modify(f);
    }

    pub(crate) fn emit(&self, event: PhoneEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Reserve the outbound call slot. `None` if a call is active or being placed.
    pub(crate) fn claim_placement(&self) -> Option<PlacementClaim<'_>> {
        let active = self.active_call.lock();
        if active.is_some() || self.placing.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(PlacementClaim(&self.placing))
    }

    pub(crate) fn is_active_call(&self, id: CallId) -> bool {
        self.active_call.lock().as_ref().map(|c| c.id()) == Some(id)
    }

    /// Forget `id` wherever it is tracked and reset the matching flags
    pub(crate) fn clear_call(&self, id: CallId) -> bool {
        let was_active = {
            let mut active = self.active_call.lock();
            if active.as_ref().map(|c| c.id()) == Some(id) {
                *active = None;
                true
            } else {
                false
            }
        };
        let was_incoming = {
            let mut incoming = self.incoming_call.lock();
            if incoming.as_ref().map(|c| c.id()) == Some(id) {
                *incoming = None;
                true
            } else {
                false
            }
        };

        if was_active || was_incoming {
            self.update(|s| {
                if was_active {
                    s.reset_call();
                }
                if was_incoming {
                    s.clear_incoming();
                }
            });
        }
        was_active || was_incoming
    }
}

/// Single-identity softphone over a signaling backend
pub struct SipPhone {
    backend: Arc<dyn SignalingBackend>,
    inner: Arc<PhoneInner>,
}

impl SipPhone {
    pub fn new(backend: Arc<dyn SignalingBackend>, config: PhoneConfig) -> Self {
        let (status, _) = watch::channel(PhoneStatus::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            backend,
            inner: Arc::new(PhoneInner {
                config,
                status,
                events,
                endpoint: Mutex::new(None),
                active_call: Mutex::new(None),
                placing: AtomicBool::new(false),
                incoming_call: Mutex::new(None),
                inbox: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn config(&self) -> &PhoneConfig {
        &self.inner.config
    }

    /// Current status
    pub fn status(&self) -> PhoneStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch status changes
    pub fn watch_status(&self) -> watch::Receiver<PhoneStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribe to phone events
    pub fn subscribe(&self) -> broadcast::Receiver<PhoneEvent> {
        self.inner.events.subscribe()
    }

    /// Id of the current outbound or accepted call
    pub fn active_call_id(&self) -> Option<CallId> {
        self.inner.active_call.lock().as_ref().map(|c| c.id())
    }

    pub(crate) fn endpoint(&self) -> ClientResult<Arc<dyn SignalingEndpoint>> {
        self.inner
            .endpoint
            .lock()
            .as_ref()
            .map(|slot| slot.endpoint.clone())
            .ok_or(ClientError::NotReady)
    }

    pub(crate) fn active_session(&self) -> ClientResult<Arc<dyn CallSession>> {
        self.inner.active_call.lock().clone().ok_or(ClientError::NoActiveSession)
    }

    /// Log and return a snapshot of the phone's connection state
    pub fn diagnose(&self) -> PhoneDiagnostics {
        let (identity, ws_server, transport_connected) = match &*self.inner.endpoint.lock() {
            Some(slot) => (
                Some(slot.credentials.uri.clone()),
                Some(slot.credentials.ws_servers.clone()),
                slot.endpoint.is_connected(),
            ),
            None => (None, None, false),
        };
        let diagnostics = PhoneDiagnostics {
            backend: self.backend.name().to_string(),
            server_host: identity.as_deref().map(host_from_uri),
            identity,
            ws_server,
            transport_connected,
            active_call: self.active_call_id(),
            pending_incoming_call: self.inner.incoming_call.lock().as_ref().map(|c| c.id()),
            inbox_len: self.inner.inbox.lock().len(),
            status: self.status(),
        };

        info!(
            backend = %diagnostics.backend,
            identity = ?diagnostics.identity,
            ws_server = ?diagnostics.ws_server,
            server_host = ?diagnostics.server_host,
            transport_connected = diagnostics.transport_connected,
            registered = diagnostics.status.is_registered,
            active_call = ?diagnostics.active_call,
            "Connection diagnostics"
        );
        diagnostics
    }
}

impl Drop for SipPhone {
    fn drop(&mut self) {
        if let Some(slot) = self.inner.endpoint.lock().take() {
            slot.pump.abort();
        }
    }
}
