//! Signaling capability interface
//!
//! Everything above this module (the softphone controller and the load
//! tester) talks to a SIP signaling library only through these traits. One
//! adapter per library implements them; the library keeps ownership of SIP
//! transactions, dialogs, SDP and ICE.
//!
//! ```text
//! SignalingBackend ──create_endpoint──▶ SignalingEndpoint ──place_call──▶ CallSession
//!                                        │ EndpointEvent stream            │ CallEvent stream
//! ```
//!
//! Events are delivered over unbounded channels handed out together with the
//! object that produces them, so each consumer owns its stream and no events
//! are lost between creation and subscription.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ClientResult;
use crate::types::{CallId, CallOptions, CallerInfo, Credentials, InboundMessage};
use crate::uri::SipUri;

/// Receiving half of an event stream
pub type EventStream<T> = mpsc::UnboundedReceiver<T>;

/// Sending half of an event stream
pub type EventSink<T> = mpsc::UnboundedSender<T>;

/// Events emitted by a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// Provisional response (e.g. 180 Ringing)
    Progress { status_code: u16, reason: String },
    /// Call reached the established/confirmed state
    Established,
    /// Call ended after or without being established (BYE, CANCEL, local terminate)
    Ended { cause: String },
    /// Call failed to establish (rejected, negotiation failed)
    Failed { cause: String, status_code: Option<u16> },
}

impl CallEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallEvent::Ended { .. } | CallEvent::Failed { .. })
    }
}

/// An incoming call offered by the endpoint
pub struct IncomingCall {
    pub session: Arc<dyn CallSession>,
    pub events: EventStream<CallEvent>,
    pub caller: CallerInfo,
}

impl fmt::Debug for IncomingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingCall")
            .field("call_id", &self.session.id())
            .field("caller", &self.caller)
            .finish()
    }
}

/// Events emitted by an endpoint (user agent)
#[derive(Debug)]
pub enum EndpointEvent {
    Connected,
    Disconnected { reason: Option<String> },
    RegistrationChanged { registered: bool },
    IncomingCall(IncomingCall),
    Message(InboundMessage),
}

/// A signaling library: creates endpoints from credentials
pub trait SignalingBackend: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Construct an endpoint. Construction does not touch the network.
    fn create_endpoint(
        &self,
        credentials: &Credentials,
    ) -> ClientResult<(Arc<dyn SignalingEndpoint>, EventStream<EndpointEvent>)>;
}

/// One signaling identity bound to one transport connection
#[async_trait]
pub trait SignalingEndpoint: Send + Sync + fmt::Debug {
    /// Identity this endpoint was created for
    fn identity(&self) -> &SipUri;

    /// Whether the transport is currently connected
    fn is_connected(&self) -> bool;

    /// Start the user agent and wait for the transport to connect
    async fn connect(&self) -> ClientResult<()>;

    /// Register the identity with the server
    async fn register(&self) -> ClientResult<()>;

    /// Remove the registration
    async fn unregister(&self) -> ClientResult<()>;

    /// Place an outbound call
    async fn place_call(
        &self,
        target: &SipUri,
        options: CallOptions,
    ) -> ClientResult<(Arc<dyn CallSession>, EventStream<CallEvent>)>;

    /// Send an instant message
    async fn send_message(&self, target: &SipUri, body: &str) -> ClientResult<()>;

    /// Stop the user agent and close its transport
    async fn release(&self) -> ClientResult<()>;
}

/// One call handle
#[async_trait]
pub trait CallSession: Send + Sync + fmt::Debug {
    fn id(&self) -> CallId;

    /// Hang up (BYE when established, CANCEL otherwise)
    async fn terminate(&self) -> ClientResult<()>;

    /// Answer an incoming call
    async fn accept(&self, options: CallOptions) -> ClientResult<()>;

    /// Decline an incoming call
    async fn reject(&self) -> ClientResult<()>;

    async fn send_dtmf(&self, tone: char, duration: Duration) -> ClientResult<()>;

    async fn set_hold(&self, hold: bool) -> ClientResult<()>;

    async fn set_muted(&self, muted: bool) -> ClientResult<()>;

    /// Blind transfer (REFER)
    async fn refer(&self, target: &SipUri) -> ClientResult<()>;
}
