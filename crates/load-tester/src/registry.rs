//! In-flight attempt handles
//!
//! A handle pairs an attempt's endpoint with its call (once placed). Both the
//! attempt's driver and the teardown controller may try to terminate and
//! release the same handle; each action runs at most once and later callers
//! wait for the first one to settle.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use sipconsole_client_core::recovery::best_effort;
use sipconsole_client_core::{CallSession, SignalingEndpoint};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::attempt::AttemptId;

pub struct AttemptHandle {
    id: AttemptId,
    endpoint: Arc<dyn SignalingEndpoint>,
    call: OnceLock<Arc<dyn CallSession>>,
    terminated: OnceCell<bool>,
    released: OnceCell<bool>,
    teardown_timeout: Duration,
}

impl std::fmt::Debug for AttemptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptHandle")
            .field("id", &self.id)
            .field("call", &self.call.get().map(|c| c.id()))
            .field("terminated", &self.terminated.get())
            .field("released", &self.released.get())
            .finish()
    }
}

impl AttemptHandle {
    pub fn new(id: AttemptId, endpoint: Arc<dyn SignalingEndpoint>, teardown_timeout: Duration) -> Self {
        Self {
            id,
            endpoint,
            call: OnceLock::new(),
            terminated: OnceCell::new(),
            released: OnceCell::new(),
            teardown_timeout,
        }
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn endpoint(&self) -> &Arc<dyn SignalingEndpoint> {
        &self.endpoint
    }

    /// Attach the placed call. Only the first call is kept.
    pub fn attach_call(&self, call: Arc<dyn CallSession>) {
        let _ = self.call.set(call);
    }

    pub fn has_call(&self) -> bool {
        self.call.get().is_some()
    }

    /// Terminate the call, at most once.
    ///
    /// Returns `None` when no call was placed, otherwise whether the
    /// termination completed without error or timeout.
    pub async fn terminate(&self) -> Option<bool> {
        let call = self.call.get()?.clone();
        let ok = *self
            .terminated
            .get_or_init(|| async move {
                debug!(attempt = %self.id, call_id = %call.id(), "Terminating call");
                best_effort("terminate", self.teardown_timeout, call.terminate()).await
            })
            .await;
        Some(ok)
    }

    /// Release the endpoint, at most once. A failure or timeout still
    /// leaves the handle released.
    pub async fn release(&self) -> bool {
        *self
            .released
            .get_or_init(|| async {
                debug!(attempt = %self.id, "Releasing endpoint");
                best_effort("release", self.teardown_timeout, self.endpoint.release()).await
            })
            .await
    }

    pub fn is_released(&self) -> bool {
        self.released.initialized()
    }
}

/// Registry of in-flight handles for one run.
///
/// [`drain`](Self::drain) takes every handle and closes the registry in one
/// critical section, so a concurrent [`register`](Self::register) is either
/// captured by the drain or refused.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    handles: HashMap<AttemptId, Arc<AttemptHandle>>,
    closed: bool,
}

impl HandleRegistry {
    /// Track `handle`. Returns `false` if the registry was already drained.
    pub fn register(&self, handle: Arc<AttemptHandle>) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.handles.insert(handle.id(), handle);
        true
    }

    /// Stop tracking an attempt that finished on its own
    pub fn remove(&self, id: AttemptId) {
        self.state.lock().handles.remove(&id);
    }

    /// Take every tracked handle and refuse further registrations
    pub fn drain(&self) -> Vec<Arc<AttemptHandle>> {
        let mut state = self.state.lock();
        state.closed = true;
        let mut handles: Vec<_> = state.handles.drain().map(|(_, h)| h).collect();
        handles.sort_by_key(|h| h.id());
        handles
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipconsole_client_core::sim::{SimBackend, SimPlan};
    use sipconsole_client_core::{CallOptions, Credentials, SignalingBackend, SipUri};

    fn endpoint(backend: &SimBackend) -> Arc<dyn SignalingEndpoint> {
        let creds = Credentials::new("sip:5001@pbx.local", "wss://pbx.local", "5001", "pw");
        backend.create_endpoint(&creds).unwrap().0
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_and_release_run_once() {
        let backend = SimBackend::new();
        let endpoint = endpoint(&backend);
        endpoint.connect().await.unwrap();
        let handle = Arc::new(AttemptHandle::new(AttemptId(1), endpoint.clone(), Duration::from_secs(1)));

        assert_eq!(handle.terminate().await, None);

        let target = SipUri::parse("sip:1413@pbx.local").unwrap();
        let (call, _events) = endpoint.place_call(&target, CallOptions::no_media()).await.unwrap();
        handle.attach_call(call);

        let (a, b) = tokio::join!(handle.terminate(), handle.terminate());
        assert_eq!((a, b), (Some(true), Some(true)));
        assert!(handle.release().await);
        assert!(handle.release().await);
        assert!(handle.is_released());

        let stats = backend.stats();
        assert_eq!(stats.terminates, 1);
        assert_eq!(stats.releases, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_release_is_bounded() {
        let backend = SimBackend::new().with_default_plan(SimPlan::default().with_hanging_release());
        let handle = AttemptHandle::new(AttemptId(0), endpoint(&backend), Duration::from_millis(500));

        assert!(!handle.release().await);
        assert!(handle.is_released());
    }

    #[tokio::test]
    async fn test_drain_closes_registry() {
        let backend = SimBackend::new();
        let registry = HandleRegistry::default();
        for i in [2, 0, 1] {
            assert!(registry.register(Arc::new(AttemptHandle::new(AttemptId(i), endpoint(&backend), Duration::from_secs(1)))));
        }
        registry.remove(AttemptId(1));
        assert_eq!(registry.len(), 2);

        let drained: Vec<_> = registry.drain().iter().map(|h| h.id()).collect();
        assert_eq!(drained, vec![AttemptId(0), AttemptId(2)]);
        assert!(registry.is_closed());
        assert_eq!(registry.len(), 0);

        let late = Arc::new(AttemptHandle::new(AttemptId(3), endpoint(&backend), Duration::from_secs(1)));
        assert!(!registry.register(late));
        assert!(registry.drain().is_empty());
    }
}
