//! Simulated call session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::plan::AnswerBehavior;
use super::SimStats;
use crate::backend::{CallEvent, CallSession, EventSink};
use crate::error::{ClientError, ClientResult};
use crate::types::{CallId, CallOptions};
use crate::uri::SipUri;

/// Direction of a simulated call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCallDirection {
    Outgoing,
    Incoming,
}

/// Lifecycle of a simulated call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCallState {
    Ringing,
    Established,
    Ended,
}

/// Simulated call behavior taken from the endpoint's plan
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CallQuirks {
    pub fail_terminate: bool,
    pub ignore_terminate: bool,
}

#[derive(Debug)]
pub struct SimCall {
    id: CallId,
    direction: SimCallDirection,
    remote: String,
    options: CallOptions,
    quirks: CallQuirks,
    state: Mutex<SimCallState>,
    events: EventSink<CallEvent>,
    stats: Arc<SimStats>,
    held: AtomicBool,
    muted: AtomicBool,
    dtmf_sent: Mutex<String>,
    referred_to: Mutex<Option<SipUri>>,
}

impl SimCall {
    pub(crate) fn new(
        direction: SimCallDirection,
        remote: impl Into<String>,
        options: CallOptions,
        quirks: CallQuirks,
        events: EventSink<CallEvent>,
        stats: Arc<SimStats>,
    ) -> Self {
        Self {
            id: CallId::new_v4(),
            direction,
            remote: remote.into(),
            options,
            quirks,
            state: Mutex::new(SimCallState::Ringing),
            events,
            stats,
            held: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            dtmf_sent: Mutex::new(String::new()),
            referred_to: Mutex::new(None),
        }
    }

    /// Drive an outbound call according to the far end's behavior
    pub(crate) async fn run_outgoing(self: Arc<Self>, answer: AnswerBehavior, remote_hangup_after: Option<Duration>) {
        let _ = self.events.send(CallEvent::Progress {
            status_code: 180,
            reason: "Ringing".to_string(),
        });

        match answer {
            AnswerBehavior::Answer { after } => {
                tokio::time::sleep(after).await;
                if !self.remote_answer() {
                    return;
                }
                if let Some(hangup_after) = remote_hangup_after {
                    tokio::time::sleep(hangup_after).await;
                    self.remote_hangup();
                }
            }
            AnswerBehavior::Reject { after, status_code, reason } => {
                tokio::time::sleep(after).await;
                self.remote_reject(status_code, reason);
            }
            AnswerBehavior::NoAnswer => {}
        }
    }

    pub fn direction(&self) -> SimCallDirection {
        self.direction
    }

    /// Remote URI as given when the call was created
    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn options(&self) -> CallOptions {
        self.options
    }

    pub fn state(&self) -> SimCallState {
        *self.state.lock()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Tones sent so far, in order
    pub fn dtmf_sent(&self) -> String {
        self.dtmf_sent.lock().clone()
    }

    pub fn referred_to(&self) -> Option<SipUri> {
        self.referred_to.lock().clone()
    }

    /// Far end answers. Returns `false` if the call was no longer ringing.
    pub fn remote_answer(&self) -> bool {
        let mut state = self.state.lock();
        if *state != SimCallState::Ringing {
            return false;
        }
        *state = SimCallState::Established;
        let _ = self.events.send(CallEvent::Established);
        true
    }

    /// Far end declines a ringing call
    pub fn remote_reject(&self, status_code: u16, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if *state != SimCallState::Ringing {
            return;
        }
        *state = SimCallState::Ended;
        let _ = self.events.send(CallEvent::Failed {
            cause: reason.into(),
            status_code: Some(status_code),
        });
    }

    /// Far end hangs up
    pub fn remote_hangup(&self) {
        self.end("remote hangup");
    }

    /// End the call from whatever state it is in. Ringing calls fail,
    /// established calls end. Idempotent.
    pub(crate) fn end(&self, cause: &str) {
        let mut state = self.state.lock();
        let event = match *state {
            SimCallState::Ended => return,
            SimCallState::Ringing => CallEvent::Failed {
                cause: cause.to_string(),
                status_code: None,
            },
            SimCallState::Established => CallEvent::Ended { cause: cause.to_string() },
        };
        *state = SimCallState::Ended;
        debug!(call_id = %self.id, cause = cause, "Simulated call ended");
        let _ = self.events.send(event);
    }

    fn require_established(&self, operation: &str) -> ClientResult<()> {
        if *self.state.lock() == SimCallState::Established {
            Ok(())
        } else {
            Err(ClientError::call_control_failed(operation, "call is not established"))
        }
    }

    fn require_incoming_ringing(&self, operation: &str) -> ClientResult<()> {
        if self.direction == SimCallDirection::Incoming && *self.state.lock() == SimCallState::Ringing {
            Ok(())
        } else {
            Err(ClientError::call_control_failed(operation, "call is not an offered incoming call"))
        }
    }
}

#[async_trait]
impl CallSession for SimCall {
    fn id(&self) -> CallId {
        self.id
    }

    async fn terminate(&self) -> ClientResult<()> {
        self.stats.terminates.fetch_add(1, Ordering::SeqCst);
        if self.quirks.fail_terminate {
            return Err(ClientError::call_control_failed("terminate", "simulated terminate failure"));
        }
        if !self.quirks.ignore_terminate {
            self.end("terminated locally");
        }
        Ok(())
    }

    async fn accept(&self, options: CallOptions) -> ClientResult<()> {
        self.require_incoming_ringing("accept")?;
        debug!(call_id = %self.id, audio = options.audio, video = options.video, "Simulated call accepted");
        self.remote_answer();
        Ok(())
    }

    async fn reject(&self) -> ClientResult<()> {
        self.require_incoming_ringing("reject")?;
        let mut state = self.state.lock();
        *state = SimCallState::Ended;
        let _ = self.events.send(CallEvent::Failed {
            cause: "Rejected".to_string(),
            status_code: Some(486),
        });
        Ok(())
    }

    async fn send_dtmf(&self, tone: char, _duration: Duration) -> ClientResult<()> {
        self.require_established("send_dtmf")?;
        self.dtmf_sent.lock().push(tone);
        Ok(())
    }

    async fn set_hold(&self, hold: bool) -> ClientResult<()> {
        self.require_established(if hold { "hold" } else { "unhold" })?;
        self.held.store(hold, Ordering::SeqCst);
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> ClientResult<()> {
        self.require_established(if muted { "mute" } else { "unmute" })?;
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    async fn refer(&self, target: &SipUri) -> ClientResult<()> {
        self.require_established("refer")?;
        *self.referred_to.lock() = Some(target.clone());
        Ok(())
    }
}
