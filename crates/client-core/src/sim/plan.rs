//! Scripted behavior for simulated endpoints

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the transport behaves when the endpoint connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Connect after a delay
    Connect { after: Duration },
    /// Fail to connect after a delay
    Refuse { after: Duration, reason: String },
    /// Report connected, then drop the transport before any call is placed
    DropAfterConnect { after: Duration },
    /// Never resolve until the endpoint is released
    Hang,
}

/// How the far end treats an outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerBehavior {
    Answer { after: Duration },
    Reject { after: Duration, status_code: u16, reason: String },
    /// Keep ringing until terminated
    NoAnswer,
}

/// Behavior of one simulated endpoint and the calls it places
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPlan {
    /// Fail endpoint construction with this reason
    pub construct_error: Option<String>,
    pub connect: ConnectBehavior,
    pub answer: AnswerBehavior,
    /// Remote party hangs up this long after establishment
    pub remote_hangup_after: Option<Duration>,
    /// Fail registration with this reason
    pub register_error: Option<String>,
    /// `terminate` returns an error
    pub fail_terminate: bool,
    /// `terminate` succeeds but the call never reports its end
    pub ignore_terminate: bool,
    /// `release` returns an error
    pub fail_release: bool,
    /// `release` never completes
    pub hang_release: bool,
}

impl Default for SimPlan {
    fn default() -> Self {
        Self::answering(Duration::from_millis(10))
    }
}

impl SimPlan {
    /// Connect immediately and answer after `after`
    pub fn answering(after: Duration) -> Self {
        Self {
            construct_error: None,
            connect: ConnectBehavior::Connect { after: Duration::from_millis(1) },
            answer: AnswerBehavior::Answer { after },
            remote_hangup_after: None,
            register_error: None,
            fail_terminate: false,
            ignore_terminate: false,
            fail_release: false,
            hang_release: false,
        }
    }

    /// Endpoint construction fails
    pub fn construct_error(reason: impl Into<String>) -> Self {
        Self {
            construct_error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Transport refuses to connect
    pub fn refusing_connect(reason: impl Into<String>) -> Self {
        Self {
            connect: ConnectBehavior::Refuse {
                after: Duration::from_millis(1),
                reason: reason.into(),
            },
            ..Self::default()
        }
    }

    /// Transport connects, then drops before the call goes out
    pub fn dropping_after_connect() -> Self {
        Self {
            connect: ConnectBehavior::DropAfterConnect { after: Duration::from_millis(1) },
            ..Self::default()
        }
    }

    /// Transport never connects
    pub fn hanging_connect() -> Self {
        Self {
            connect: ConnectBehavior::Hang,
            ..Self::default()
        }
    }

    /// Far end rejects the call
    pub fn rejecting(status_code: u16, reason: impl Into<String>) -> Self {
        Self {
            answer: AnswerBehavior::Reject {
                after: Duration::from_millis(5),
                status_code,
                reason: reason.into(),
            },
            ..Self::default()
        }
    }

    /// Far end keeps ringing
    pub fn never_answering() -> Self {
        Self {
            answer: AnswerBehavior::NoAnswer,
            ..Self::default()
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect = match self.connect {
            ConnectBehavior::Connect { .. } => ConnectBehavior::Connect { after: delay },
            ConnectBehavior::Refuse { reason, .. } => ConnectBehavior::Refuse { after: delay, reason },
            ConnectBehavior::DropAfterConnect { .. } => ConnectBehavior::DropAfterConnect { after: delay },
            ConnectBehavior::Hang => ConnectBehavior::Hang,
        };
        self
    }

    pub fn with_remote_hangup_after(mut self, after: Duration) -> Self {
        self.remote_hangup_after = Some(after);
        self
    }

    pub fn with_register_error(mut self, reason: impl Into<String>) -> Self {
        self.register_error = Some(reason.into());
        self
    }

    pub fn with_failing_terminate(mut self) -> Self {
        self.fail_terminate = true;
        self
    }

    pub fn with_ignored_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }

    pub fn with_failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn with_hanging_release(mut self) -> Self {
        self.hang_release = true;
        self
    }
}

/// Randomized plan generator for soak runs against the simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimProfile {
    /// Probability (0.0-1.0) that the transport refuses to connect
    pub connect_failure_rate: f64,
    /// Probability (0.0-1.0) that the far end rejects the call
    pub reject_rate: f64,
    pub connect_delay_ms: RangeInclusive<u64>,
    pub answer_delay_ms: RangeInclusive<u64>,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            connect_failure_rate: 0.0,
            reject_rate: 0.0,
            connect_delay_ms: 5..=50,
            answer_delay_ms: 50..=500,
        }
    }
}

impl SimProfile {
    /// Draw one plan
    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R) -> SimPlan {
        let connect_after = Duration::from_millis(sample(rng, &self.connect_delay_ms));
        let answer_after = Duration::from_millis(sample(rng, &self.answer_delay_ms));

        let mut plan = SimPlan::answering(answer_after).with_connect_delay(connect_after);
        if rng.gen_bool(self.connect_failure_rate.clamp(0.0, 1.0)) {
            plan.connect = ConnectBehavior::Refuse {
                after: connect_after,
                reason: "WebSocket connection refused".to_string(),
            };
        } else if rng.gen_bool(self.reject_rate.clamp(0.0, 1.0)) {
            plan.answer = AnswerBehavior::Reject {
                after: answer_after,
                status_code: 486,
                reason: "Busy Here".to_string(),
            };
        }
        plan
    }
}

fn sample<R: Rng + ?Sized>(rng: &mut R, range: &RangeInclusive<u64>) -> u64 {
    if range.start() >= range.end() {
        *range.start()
    } else {
        rng.gen_range(range.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_profile_extremes() {
        let mut rng = SmallRng::seed_from_u64(7);

        let all_refused = SimProfile { connect_failure_rate: 1.0, ..SimProfile::default() };
        assert!(matches!(all_refused.plan(&mut rng).connect, ConnectBehavior::Refuse { .. }));

        let all_rejected = SimProfile { reject_rate: 1.0, ..SimProfile::default() };
        let plan = all_rejected.plan(&mut rng);
        assert!(matches!(plan.connect, ConnectBehavior::Connect { .. }));
        assert!(matches!(plan.answer, AnswerBehavior::Reject { status_code: 486, .. }));

        let clean = SimProfile::default();
        assert!(matches!(clean.plan(&mut rng).answer, AnswerBehavior::Answer { .. }));
    }

    #[test]
    fn test_profile_delays_within_range() {
        let mut rng = SmallRng::seed_from_u64(42);
        let profile = SimProfile {
            connect_delay_ms: 10..=20,
            answer_delay_ms: 30..=30,
            ..SimProfile::default()
        };
        for _ in 0..100 {
            let plan = profile.plan(&mut rng);
            match plan.connect {
                ConnectBehavior::Connect { after } => {
                    assert!(after >= Duration::from_millis(10) && after <= Duration::from_millis(20))
                }
                other => panic!("unexpected connect behavior {:?}", other),
            }
            assert_eq!(plan.answer, AnswerBehavior::Answer { after: Duration::from_millis(30) });
        }
    }
}
