//! Call placement, hangup and incoming call handling

use tracing::{debug, info, warn};

use super::{pump, PhoneEvent, SipPhone};
use crate::error::{ClientError, ClientResult};
use crate::recovery::best_effort;
use crate::types::{CallId, CallOptions};
use crate::uri::SipUri;

impl SipPhone {
    /// Place an outbound call.
    ///
    /// # Arguments
    ///
    /// * `target` - SIP URI of the callee, e.g. `sip:1413@pbx.local`
    /// * `options` - local media constraints; [`CallOptions::default`] is
    ///   audio only with an SDP offer
    ///
    /// # Returns
    ///
    /// The id of the new call. The call is not established yet; watch
    /// [`PhoneStatus::is_established`](super::PhoneStatus) or subscribe to
    /// [`PhoneEvent::CallEstablished`].
    ///
    /// # Errors
    ///
    /// * [`ClientError::NotReady`] - no endpoint registered
    /// * [`ClientError::InvalidUri`] - the target is not a SIP URI
    /// * [`ClientError::CallSetupFailed`] - a call is already in progress
    /// * any placement error from the backend; the call flags are reset
    pub async fn make_call(&self, target: &str, options: CallOptions) -> ClientResult<CallId> {
        let endpoint = self.endpoint()?;
        let target = SipUri::parse(target)?;
        let Some(_claim) = self.inner.claim_placement() else {
            return Err(ClientError::call_setup_failed("a call is already in progress"));
        };

        info!(
            target = %target,
            audio = options.audio,
            video = options.video,
            without_sdp = options.without_sdp,
            "Placing call"
        );
        self.inner.update(|s| {
            s.reset_call();
            s.is_calling = true;
            s.last_error = None;
        });

        let (session, events) = match endpoint.place_call(&target, options).await {
            Ok(placed) => placed,
            Err(e) => {
                warn!(target = %target, error = %e, "Call placement failed");
                self.inner.update(|s| {
                    s.reset_call();
                    s.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        let call_id = session.id();
        *self.inner.active_call.lock() = Some(session);
        tokio::spawn(pump::run_call_pump(self.inner.clone(), call_id, events));
        self.spawn_invite_watchdog(call_id);
        Ok(call_id)
    }

    fn spawn_invite_watchdog(&self, call_id: CallId) {
        let inner = self.inner.clone();
        let delay = inner.config.invite_watchdog;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let stalled = inner.is_active_call(call_id) && !inner.status.borrow().is_established;
            if stalled {
                let status = inner.status.borrow().clone();
                let connected = inner
                    .endpoint
                    .lock()
                    .as_ref()
                    .map(|slot| slot.endpoint.is_connected())
                    .unwrap_or(false);
                warn!(
                    call_id = %call_id,
                    waited_ms = delay.as_millis() as u64,
                    transport_connected = connected,
                    registered = status.is_registered,
                    "Call still not established, check server reachability and media negotiation"
                );
                inner.emit(PhoneEvent::InviteWatchdog { call_id });
            }
        });
    }

    /// Hang up the current call and any pending incoming call.
    ///
    /// Termination errors are logged and swallowed; the call flags are
    /// always reset.
    pub async fn hangup(&self) -> ClientResult<()> {
        let timeout = self.inner.config.teardown_timeout;
        let active = self.inner.active_call.lock().take();
        let incoming = self.inner.incoming_call.lock().take();

        if active.is_none() && incoming.is_none() {
            debug!("Hangup with no call in progress");
        }
        for session in [active, incoming].into_iter().flatten() {
            info!(call_id = %session.id(), "Hanging up");
            best_effort("terminate", timeout, session.terminate()).await;
        }

        self.inner.update(|s| {
            s.reset_call();
            s.clear_incoming();
        });
        Ok(())
    }

    /// Answer the pending incoming call
    pub async fn accept_incoming_call(&self, options: CallOptions) -> ClientResult<CallId> {
        let session = self.inner.incoming_call.lock().clone().ok_or(ClientError::NoIncomingCall)?;
        let call_id = session.id();
        info!(call_id = %call_id, audio = options.audio, video = options.video, "Accepting incoming call");

        // Track it as the active call first so its pump sees the establishment
        let previous = self.inner.active_call.lock().replace(session.clone());
        if let Some(previous) = previous {
            warn!(call_id = %previous.id(), "Accepting while another call is active, dropping it");
        }

        match session.accept(options).await {
            Ok(()) => {
                self.inner.incoming_call.lock().take();
                self.inner.update(|s| {
                    s.clear_incoming();
                    s.is_calling = true;
                });
                Ok(call_id)
            }
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "Failed to accept incoming call");
                self.inner.clear_call(call_id);
                self.inner.update(|s| s.last_error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Decline the pending incoming call. The pending call is cleared even
    /// if the backend fails to reject it.
    pub async fn reject_incoming_call(&self) -> ClientResult<()> {
        let session = self.inner.incoming_call.lock().take().ok_or(ClientError::NoIncomingCall)?;
        info!(call_id = %session.id(), "Rejecting incoming call");
        best_effort("reject", self.inner.config.teardown_timeout, session.reject()).await;
        self.inner.update(|s| s.clear_incoming());
        Ok(())
    }
}
