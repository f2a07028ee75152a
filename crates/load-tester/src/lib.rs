//! Load tester: concurrent SIP call-volume orchestration
//!
//! Launches N simultaneous call attempts against one target, each with its
//! own signaling endpoint, tracks aggregate outcomes while they run, and can
//! tear every in-flight attempt down on demand.
//!
//! ## Components
//! - **Call attempt driver** - one task per attempt, endpoint construction to
//!   terminal outcome
//! - **Concurrency coordinator** ([`LoadTester`]) - run state machine,
//!   per-run counters, fan-out and join
//! - **Teardown controller** ([`teardown`]) - terminate and release every
//!   captured handle, each step bounded and best-effort
//!
//! Signaling goes through the [`SignalingBackend`](sipconsole_client_core::SignalingBackend)
//! capability trait, so the same orchestration runs against a real library
//! adapter or the in-process simulator.

pub mod attempt;
pub mod config;
mod context;
pub mod coordinator;
mod driver;
pub mod error;
pub mod events;
pub mod registry;
pub mod stats;
pub mod teardown;

pub use attempt::{AttemptId, AttemptOutcome, AttemptReport, AttemptState};
pub use config::LoadTestConfig;
pub use coordinator::{LoadTester, RunHandle};
pub use error::{LoadTestError, LoadTestResult};
pub use events::LoadTestEvent;
pub use stats::{CounterSnapshot, LoadStats, RunState, RunSummary};
pub use teardown::TeardownReport;
