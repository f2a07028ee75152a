//! Per-attempt state machine
//!
//! ```text
//! Created ─▶ Connecting ─┬─▶ ConnectFailed ──────────────────────────┐
//!                        └─▶ Connected ─▶ CallPlaced ─┬─▶ EstablishFailed ─┤
//!                                                     └─▶ Established ─────┼─▶ Ended
//! (any non-final state) ───────────────────────────────────────────────────┘
//! ```
//!
//! No state is revisited. [`Attempt::finish`] consumes the attempt, so the
//! terminal outcome is produced exactly once.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sipconsole_client_core::SipUri;
use tokio::time::Instant;

use crate::error::{LoadTestError, LoadTestResult};

/// Index of an attempt within its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AttemptId(pub usize);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttemptState {
    Created,
    Connecting,
    ConnectFailed,
    Connected,
    CallPlaced,
    EstablishFailed,
    Established,
    Ended,
}

impl AttemptState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        match (self, next) {
            (Ended, _) => false,
            (_, Ended) => true,
            (Created, Connecting)
            | (Connecting, ConnectFailed)
            | (Connecting, Connected)
            | (Connected, CallPlaced)
            | (CallPlaced, EstablishFailed)
            | (CallPlaced, Established) => true,
            _ => false,
        }
    }
}

/// Terminal outcome of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttemptOutcome {
    /// The call was established
    Succeeded,
    /// The attempt ended without establishing a call
    Failed,
    /// The run was stopped before the call was established
    Aborted,
}

impl AttemptOutcome {
    /// Aborted attempts never established, so they count as failed
    pub fn counts_as_success(self) -> bool {
        self == AttemptOutcome::Succeeded
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Succeeded => write!(f, "succeeded"),
            AttemptOutcome::Failed => write!(f, "failed"),
            AttemptOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// One call attempt, owned and mutated by its driver only
#[derive(Debug)]
pub struct Attempt {
    id: AttemptId,
    target: SipUri,
    started_at: DateTime<Utc>,
    started: Instant,
    state: AttemptState,
    established_at: Option<Instant>,
    stopped: bool,
    cause: Option<String>,
}

impl Attempt {
    pub fn new(id: AttemptId, target: SipUri) -> Self {
        Self {
            id,
            target,
            started_at: Utc::now(),
            started: Instant::now(),
            state: AttemptState::Created,
            established_at: None,
            stopped: false,
            cause: None,
        }
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// The established latch
    pub fn was_established(&self) -> bool {
        self.established_at.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Time since the attempt was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: AttemptState) -> LoadTestResult<()> {
        if next == AttemptState::Ended || !self.state.can_transition_to(next) {
            return Err(LoadTestError::IllegalTransition { from: self.state, to: next });
        }
        if next == AttemptState::Established {
            self.established_at = Some(Instant::now());
        }
        self.state = next;
        Ok(())
    }

    /// Record why the attempt is ending. The first cause wins.
    pub fn set_cause(&mut self, cause: impl Into<String>) {
        if self.cause.is_none() {
            self.cause = Some(cause.into());
        }
    }

    /// Mark the attempt as ended by an external stop
    pub fn mark_stopped(&mut self) {
        self.stopped = true;
        self.set_cause("stopped");
    }

    /// Transition to `Ended` and produce the terminal report
    pub fn finish(self) -> AttemptReport {
        let outcome = if self.was_established() {
            AttemptOutcome::Succeeded
        } else if self.stopped {
            AttemptOutcome::Aborted
        } else {
            AttemptOutcome::Failed
        };

        AttemptReport {
            id: self.id,
            target: self.target.to_string(),
            started_at: self.started_at,
            last_state: self.state,
            outcome,
            cause: self.cause,
            setup_time: self.established_at.map(|at| at.duration_since(self.started)),
            duration: self.started.elapsed(),
        }
    }
}

/// Terminal record of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptReport {
    pub id: AttemptId,
    pub target: String,
    pub started_at: DateTime<Utc>,
    /// State the attempt was in when it ended
    pub last_state: AttemptState,
    pub outcome: AttemptOutcome,
    pub cause: Option<String>,
    /// Time from start to establishment
    pub setup_time: Option<Duration>,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use AttemptState::*;

    fn attempt() -> Attempt {
        Attempt::new(AttemptId(0), SipUri::parse("sip:1413@pbx.local").unwrap())
    }

    #[test]
    fn test_happy_path() {
        let mut a = attempt();
        for next in [Connecting, Connected, CallPlaced, Established] {
            a.transition(next).unwrap();
        }
        assert!(a.was_established());
        a.set_cause("auto hangup");
        let report = a.finish();
        assert_eq!(report.outcome, AttemptOutcome::Succeeded);
        assert_eq!(report.last_state, Established);
        assert_eq!(report.cause.as_deref(), Some("auto hangup"));
        assert!(report.setup_time.is_some());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut a = attempt();
        assert!(matches!(
            a.transition(Established),
            Err(LoadTestError::IllegalTransition { from: Created, to: Established })
        ));
        a.transition(Connecting).unwrap();
        a.transition(ConnectFailed).unwrap();
        assert!(a.transition(Connected).is_err());
        assert!(a.transition(Connecting).is_err());
        // Ended is only reachable through finish()
        assert!(a.transition(Ended).is_err());
        assert_eq!(a.finish().outcome, AttemptOutcome::Failed);
    }

    #[test]
    fn test_no_state_revisited() {
        let states = [Created, Connecting, ConnectFailed, Connected, CallPlaced, EstablishFailed, Established, Ended];
        for from in states {
            assert!(!from.can_transition_to(from), "{:?} must not loop", from);
            assert!(!Ended.can_transition_to(from));
            if from != Ended {
                assert!(from.can_transition_to(Ended));
            }
        }
    }

    #[test]
    fn test_stop_outcomes() {
        let mut connecting = attempt();
        connecting.transition(Connecting).unwrap();
        connecting.mark_stopped();
        let report = connecting.finish();
        assert_eq!(report.outcome, AttemptOutcome::Aborted);
        assert!(!report.outcome.counts_as_success());
        assert_eq!(report.cause.as_deref(), Some("stopped"));

        let mut established = attempt();
        for next in [Connecting, Connected, CallPlaced, Established] {
            established.transition(next).unwrap();
        }
        established.mark_stopped();
        assert_eq!(established.finish().outcome, AttemptOutcome::Succeeded);
    }

    #[test]
    fn test_first_cause_wins() {
        let mut a = attempt();
        a.set_cause("Busy Here");
        a.mark_stopped();
        assert_eq!(a.finish().cause.as_deref(), Some("Busy Here"));
    }
}
