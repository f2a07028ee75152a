//! Simulated endpoint (user agent)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::call::{CallQuirks, SimCall, SimCallDirection};
use super::plan::{ConnectBehavior, SimPlan};
use super::{SentMessage, SimRegistry};
use crate::backend::{CallEvent, CallSession, EndpointEvent, EventSink, EventStream, IncomingCall, SignalingEndpoint};
use crate::error::{ClientError, ClientResult};
use crate::types::{CallOptions, CallerInfo, InboundMessage};
use crate::uri::SipUri;

#[derive(Debug)]
pub struct SimEndpoint {
    identity: SipUri,
    plan: SimPlan,
    events: EventSink<EndpointEvent>,
    registry: Arc<SimRegistry>,
    connected: AtomicBool,
    registered: AtomicBool,
    released: watch::Sender<bool>,
    calls: Mutex<Vec<Arc<SimCall>>>,
}

impl SimEndpoint {
    pub(crate) fn new(
        identity: SipUri,
        plan: SimPlan,
        events: EventSink<EndpointEvent>,
        registry: Arc<SimRegistry>,
    ) -> Self {
        let (released, _) = watch::channel(false);
        Self {
            identity,
            plan,
            events,
            registry,
            connected: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            released,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn plan(&self) -> &SimPlan {
        &self.plan
    }

    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Calls created on this endpoint, oldest first
    pub fn calls(&self) -> Vec<Arc<SimCall>> {
        self.calls.lock().clone()
    }

    fn quirks(&self) -> CallQuirks {
        CallQuirks {
            fail_terminate: self.plan.fail_terminate,
            ignore_terminate: self.plan.ignore_terminate,
        }
    }

    fn track(&self, call: &Arc<SimCall>) {
        self.calls.lock().push(call.clone());
        self.registry.track_call(call.clone());
    }

    fn emit(&self, event: EndpointEvent) {
        // The consumer may already be gone after release
        let _ = self.events.send(event);
    }

    /// Offer an incoming call to this endpoint's consumer
    pub(crate) fn offer_call(&self, from_uri: &str, display_name: Option<String>) -> ClientResult<Arc<SimCall>> {
        if !self.is_connected() {
            return Err(ClientError::NotReady);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let call = Arc::new(SimCall::new(
            SimCallDirection::Incoming,
            from_uri,
            CallOptions::default(),
            self.quirks(),
            tx,
            self.registry.stats.clone(),
        ));
        self.track(&call);

        let session: Arc<dyn CallSession> = call.clone();
        self.emit(EndpointEvent::IncomingCall(IncomingCall {
            session,
            events: rx,
            caller: CallerInfo::new(from_uri, display_name),
        }));
        Ok(call)
    }

    /// Deliver an instant message to this endpoint's consumer
    pub(crate) fn deliver_message(&self, message: InboundMessage) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotReady);
        }
        self.emit(EndpointEvent::Message(message));
        Ok(())
    }

    async fn wait_released(&self) {
        let mut rx = self.released.subscribe();
        let _ = rx.wait_for(|released| *released).await;
    }
}

#[async_trait]
impl SignalingEndpoint for SimEndpoint {
    fn identity(&self) -> &SipUri {
        &self.identity
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> ClientResult<()> {
        self.registry.stats.connects.fetch_add(1, Ordering::SeqCst);
        if self.is_released() {
            return Err(ClientError::transport_disconnected("user agent stopped"));
        }

        let delay = match &self.plan.connect {
            ConnectBehavior::Connect { after }
            | ConnectBehavior::Refuse { after, .. }
            | ConnectBehavior::DropAfterConnect { after } => Some(*after),
            ConnectBehavior::Hang => None,
        };
        let wait = async {
            match delay {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = wait => {}
            _ = self.wait_released() => {
                return Err(ClientError::transport_disconnected("user agent stopped"));
            }
        }

        match &self.plan.connect {
            ConnectBehavior::Refuse { reason, .. } => {
                self.emit(EndpointEvent::Disconnected { reason: Some(reason.clone()) });
                Err(ClientError::connection_failed(reason.clone()))
            }
            ConnectBehavior::DropAfterConnect { .. } => {
                self.emit(EndpointEvent::Connected);
                self.emit(EndpointEvent::Disconnected {
                    reason: Some("transport closed".to_string()),
                });
                Ok(())
            }
            _ => {
                self.connected.store(true, Ordering::SeqCst);
                debug!(identity = %self.identity, "Simulated transport connected");
                self.emit(EndpointEvent::Connected);
                Ok(())
            }
        }
    }

    async fn register(&self) -> ClientResult<()> {
        self.registry.stats.registrations.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(ClientError::registration_failed("transport not connected"));
        }
        if let Some(reason) = &self.plan.register_error {
            return Err(ClientError::registration_failed(reason.clone()));
        }
        self.registered.store(true, Ordering::SeqCst);
        self.emit(EndpointEvent::RegistrationChanged { registered: true });
        Ok(())
    }

    async fn unregister(&self) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotRegistered);
        }
        if self.registered.swap(false, Ordering::SeqCst) {
            self.emit(EndpointEvent::RegistrationChanged { registered: false });
        }
        Ok(())
    }

    async fn place_call(
        &self,
        target: &SipUri,
        options: CallOptions,
    ) -> ClientResult<(Arc<dyn CallSession>, EventStream<CallEvent>)> {
        self.registry.stats.calls_placed.fetch_add(1, Ordering::SeqCst);
        if self.is_released() || !self.is_connected() {
            return Err(ClientError::transport_disconnected("transport not connected"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let call = Arc::new(SimCall::new(
            SimCallDirection::Outgoing,
            target.to_string(),
            options,
            self.quirks(),
            tx,
            self.registry.stats.clone(),
        ));
        self.track(&call);
        debug!(identity = %self.identity, target = %target, call_id = %call.id(), "Simulated call placed");

        tokio::spawn(call.clone().run_outgoing(self.plan.answer.clone(), self.plan.remote_hangup_after));

        let session: Arc<dyn CallSession> = call;
        Ok((session, rx))
    }

    async fn send_message(&self, target: &SipUri, body: &str) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::MessageFailed {
                reason: "transport not connected".to_string(),
            });
        }
        self.registry.stats.messages_sent.fetch_add(1, Ordering::SeqCst);
        self.registry.sent_messages.lock().push(SentMessage {
            from: self.identity.clone(),
            to: target.clone(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn release(&self) -> ClientResult<()> {
        self.registry.stats.releases.fetch_add(1, Ordering::SeqCst);
        if self.plan.hang_release {
            std::future::pending::<()>().await;
        }
        if self.plan.fail_release {
            return Err(ClientError::internal_error("simulated release failure"));
        }

        if self.released.send_replace(true) {
            return Ok(());
        }
        self.connected.store(false, Ordering::SeqCst);
        self.registered.store(false, Ordering::SeqCst);
        for call in self.calls.lock().iter() {
            call.end("user agent stopped");
        }
        self.emit(EndpointEvent::Disconnected { reason: None });
        debug!(identity = %self.identity, "Simulated endpoint released");
        Ok(())
    }
}

