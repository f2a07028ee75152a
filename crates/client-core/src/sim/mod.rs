//! In-process signaling backend
//!
//! `SimBackend` implements the signaling traits without a network. Each
//! endpoint it creates follows a [`SimPlan`]: queued plans are consumed in
//! creation order, after which a default plan (fixed or drawn from a
//! [`SimProfile`]) applies. Every operation is counted so tests can assert
//! on exactly what the layers above did.
//!
//! ```rust
//! use std::time::Duration;
//! use sipconsole_client_core::sim::{SimBackend, SimPlan};
//!
//! let backend = SimBackend::new()
//!     .with_default_plan(SimPlan::answering(Duration::from_millis(20)));
//! backend.push_plan(SimPlan::refusing_connect("server down"));
//! assert_eq!(backend.queued_plans(), 1);
//! ```

mod call;
mod endpoint;
mod plan;

pub use call::{SimCall, SimCallDirection, SimCallState};
pub use endpoint::SimEndpoint;
pub use plan::{AnswerBehavior, ConnectBehavior, SimPlan, SimProfile};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::{CallSession, EndpointEvent, EventStream, SignalingBackend, SignalingEndpoint};
use crate::error::{ClientError, ClientResult};
use crate::types::{CallId, Credentials, InboundMessage};
use crate::uri::SipUri;

/// Operation counters
#[derive(Debug, Default)]
pub struct SimStats {
    pub(crate) endpoints_created: AtomicUsize,
    pub(crate) connects: AtomicUsize,
    pub(crate) registrations: AtomicUsize,
    pub(crate) calls_placed: AtomicUsize,
    pub(crate) terminates: AtomicUsize,
    pub(crate) releases: AtomicUsize,
    pub(crate) messages_sent: AtomicUsize,
}

/// Point-in-time copy of [`SimStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimStatsSnapshot {
    pub endpoints_created: usize,
    pub connects: usize,
    pub registrations: usize,
    pub calls_placed: usize,
    pub terminates: usize,
    pub releases: usize,
    pub messages_sent: usize,
}

impl SimStats {
    fn snapshot(&self) -> SimStatsSnapshot {
        SimStatsSnapshot {
            endpoints_created: self.endpoints_created.load(Ordering::SeqCst),
            connects: self.connects.load(Ordering::SeqCst),
            registrations: self.registrations.load(Ordering::SeqCst),
            calls_placed: self.calls_placed.load(Ordering::SeqCst),
            terminates: self.terminates.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
            messages_sent: self.messages_sent.load(Ordering::SeqCst),
        }
    }
}

/// A message an endpoint sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: SipUri,
    pub to: SipUri,
    pub body: String,
}

/// State shared by the backend and everything it created
#[derive(Debug, Default)]
pub(crate) struct SimRegistry {
    pub(crate) stats: Arc<SimStats>,
    pub(crate) sent_messages: Mutex<Vec<SentMessage>>,
    calls: DashMap<CallId, Arc<SimCall>>,
    last_call: Mutex<Option<Arc<SimCall>>>,
}

impl SimRegistry {
    pub(crate) fn track_call(&self, call: Arc<SimCall>) {
        self.calls.insert(call.id(), call.clone());
        *self.last_call.lock() = Some(call);
    }
}

#[derive(Debug, Clone)]
enum DefaultPlan {
    Fixed(SimPlan),
    Random(SimProfile),
}

#[derive(Debug)]
struct SimBackendInner {
    registry: Arc<SimRegistry>,
    default_plan: Mutex<DefaultPlan>,
    queued: Mutex<VecDeque<SimPlan>>,
    endpoints: Mutex<Vec<Arc<SimEndpoint>>>,
}

/// Simulated signaling library
#[derive(Debug, Clone)]
pub struct SimBackend {
    inner: Arc<SimBackendInner>,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBackend {
    /// Backend whose endpoints connect and answer promptly
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimBackendInner {
                registry: Arc::new(SimRegistry::default()),
                default_plan: Mutex::new(DefaultPlan::Fixed(SimPlan::default())),
                queued: Mutex::new(VecDeque::new()),
                endpoints: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Plan used once the queue is empty
    pub fn with_default_plan(self, plan: SimPlan) -> Self {
        *self.inner.default_plan.lock() = DefaultPlan::Fixed(plan);
        self
    }

    /// Draw each unqueued endpoint's plan from a random profile
    pub fn with_profile(self, profile: SimProfile) -> Self {
        *self.inner.default_plan.lock() = DefaultPlan::Random(profile);
        self
    }

    /// Queue a plan for the next endpoint created
    pub fn push_plan(&self, plan: SimPlan) {
        self.inner.queued.lock().push_back(plan);
    }

    /// Queue plans for the next endpoints created, in order
    pub fn push_plans(&self, plans: impl IntoIterator<Item = SimPlan>) {
        self.inner.queued.lock().extend(plans);
    }

    pub fn queued_plans(&self) -> usize {
        self.inner.queued.lock().len()
    }

    pub fn stats(&self) -> SimStatsSnapshot {
        self.inner.registry.stats.snapshot()
    }

    /// Endpoints created so far, oldest first
    pub fn endpoints(&self) -> Vec<Arc<SimEndpoint>> {
        self.inner.endpoints.lock().clone()
    }

    /// Most recently created call on any endpoint
    pub fn last_call(&self) -> Option<Arc<SimCall>> {
        self.inner.registry.last_call.lock().clone()
    }

    pub fn call(&self, id: CallId) -> Option<Arc<SimCall>> {
        self.inner.registry.calls.get(&id).map(|entry| entry.value().clone())
    }

    pub fn call_count(&self) -> usize {
        self.inner.registry.calls.len()
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.inner.registry.sent_messages.lock().clone()
    }

    fn live_endpoint(&self) -> ClientResult<Arc<SimEndpoint>> {
        self.inner
            .endpoints
            .lock()
            .iter()
            .rev()
            .find(|ep| !ep.is_released())
            .cloned()
            .ok_or(ClientError::NotReady)
    }

    /// Offer an incoming call to the newest live endpoint
    pub fn inject_incoming_call(&self, from_uri: &str, display_name: Option<&str>) -> ClientResult<Arc<SimCall>> {
        self.live_endpoint()?.offer_call(from_uri, display_name.map(str::to_string))
    }

    /// Deliver an instant message to the newest live endpoint
    pub fn inject_message(&self, from_uri: &str, display_name: Option<&str>, body: &str) -> ClientResult<()> {
        self.live_endpoint()?.deliver_message(InboundMessage {
            from_uri: from_uri.to_string(),
            from_display_name: display_name.map(str::to_string),
            body: body.to_string(),
        })
    }

    fn next_plan(&self) -> SimPlan {
        if let Some(plan) = self.inner.queued.lock().pop_front() {
            return plan;
        }
        match &*self.inner.default_plan.lock() {
            DefaultPlan::Fixed(plan) => plan.clone(),
            DefaultPlan::Random(profile) => profile.plan(&mut rand::thread_rng()),
        }
    }
}

impl SignalingBackend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }

    fn create_endpoint(
        &self,
        credentials: &Credentials,
    ) -> ClientResult<(Arc<dyn SignalingEndpoint>, EventStream<EndpointEvent>)> {
        self.inner.registry.stats.endpoints_created.fetch_add(1, Ordering::SeqCst);
        credentials.validate()?;
        let identity = credentials.identity()?;

        let plan = self.next_plan();
        if let Some(reason) = &plan.construct_error {
            return Err(ClientError::endpoint_creation_failed(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(SimEndpoint::new(identity, plan, tx, self.inner.registry.clone()));
        self.inner.endpoints.lock().push(endpoint.clone());
        debug!(identity = %endpoint.identity(), "Simulated endpoint created");

        let endpoint: Arc<dyn SignalingEndpoint> = endpoint;
        Ok((endpoint, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CallEvent;
    use crate::types::CallOptions;
    use std::time::Duration;

    fn creds() -> Credentials {
        Credentials::new("sip:5001@pbx.local", "wss://pbx.local:7443", "5001", "pw")
    }

    fn target() -> SipUri {
        SipUri::parse("sip:1413@pbx.local").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_call_lifecycle() {
        let backend = SimBackend::new();
        let (endpoint, mut endpoint_events) = backend.create_endpoint(&creds()).unwrap();

        endpoint.connect().await.unwrap();
        assert!(matches!(endpoint_events.recv().await, Some(EndpointEvent::Connected)));

        let (call, mut events) = endpoint.place_call(&target(), CallOptions::no_media()).await.unwrap();
        assert!(matches!(events.recv().await, Some(CallEvent::Progress { status_code: 180, .. })));
        assert_eq!(events.recv().await, Some(CallEvent::Established));

        call.terminate().await.unwrap();
        assert!(matches!(events.recv().await, Some(CallEvent::Ended { .. })));

        endpoint.release().await.unwrap();
        assert!(!endpoint.is_connected());

        let stats = backend.stats();
        assert_eq!(stats.endpoints_created, 1);
        assert_eq!(stats.calls_placed, 1);
        assert_eq!(stats.terminates, 1);
        assert_eq!(stats.releases, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_plans_apply_in_order() {
        let backend = SimBackend::new();
        backend.push_plans([SimPlan::construct_error("no ua"), SimPlan::refusing_connect("down")]);

        assert!(matches!(
            backend.create_endpoint(&creds()),
            Err(ClientError::EndpointCreationFailed { .. })
        ));

        let (endpoint, _events) = backend.create_endpoint(&creds()).unwrap();
        assert!(matches!(endpoint.connect().await, Err(ClientError::ConnectionFailed { .. })));

        let (endpoint, _events) = backend.create_endpoint(&creds()).unwrap();
        assert!(endpoint.connect().await.is_ok());
        assert_eq!(backend.queued_plans(), 0);
        assert_eq!(backend.stats().endpoints_created, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_aborts_hanging_connect() {
        let backend = SimBackend::new().with_default_plan(SimPlan::hanging_connect());
        let (endpoint, _events) = backend.create_endpoint(&creds()).unwrap();

        let connecting = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.connect().await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        endpoint.release().await.unwrap();

        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(ClientError::TransportDisconnected { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_ends_ringing_call() {
        let backend = SimBackend::new().with_default_plan(SimPlan::never_answering());
        let (endpoint, _events) = backend.create_endpoint(&creds()).unwrap();
        endpoint.connect().await.unwrap();

        let (_call, mut events) = endpoint.place_call(&target(), CallOptions::no_media()).await.unwrap();
        assert!(matches!(events.recv().await, Some(CallEvent::Progress { .. })));

        endpoint.release().await.unwrap();
        assert!(matches!(events.recv().await, Some(CallEvent::Failed { status_code: None, .. })));
        assert_eq!(backend.last_call().unwrap().state(), SimCallState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_call_requires_connection() {
        let backend = SimBackend::new().with_default_plan(SimPlan::dropping_after_connect());
        let (endpoint, _events) = backend.create_endpoint(&creds()).unwrap();
        endpoint.connect().await.unwrap();
        assert!(!endpoint.is_connected());
        assert!(matches!(
            endpoint.place_call(&target(), CallOptions::no_media()).await,
            Err(ClientError::TransportDisconnected { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quirky_teardown() {
        let backend = SimBackend::new().with_default_plan(SimPlan::default().with_failing_terminate().with_failing_release());
        let (endpoint, _events) = backend.create_endpoint(&creds()).unwrap();
        endpoint.connect().await.unwrap();
        let (call, _events) = endpoint.place_call(&target(), CallOptions::no_media()).await.unwrap();

        assert!(call.terminate().await.is_err());
        assert!(endpoint.release().await.is_err());
        assert_eq!(backend.stats().terminates, 1);
        assert_eq!(backend.stats().releases, 1);
    }

    #[tokio::test]
    async fn test_invalid_credentials_rejected() {
        let backend = SimBackend::new();
        let bad = Credentials::new("5001", "wss://pbx.local", "5001", "pw");
        assert!(matches!(backend.create_endpoint(&bad), Err(ClientError::InvalidUri { .. })));
    }
}
