//! Teardown controller
//!
//! Tears down a set of captured attempt handles: for each one, terminate the
//! call (if any) and then release the endpoint. Handles are torn down
//! concurrently; each step is bounded by the handle's teardown timeout and
//! failures are logged and swallowed, so the returned future always settles.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::registry::AttemptHandle;

/// What a teardown did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Handles captured from the registry
    pub handles: usize,
    /// Handles with a call to terminate
    pub calls: usize,
    /// Terminations that failed or timed out
    pub terminate_failures: usize,
    /// Releases that failed or timed out (the endpoint still counts as released)
    pub release_failures: usize,
}

/// Terminate then release every handle, all handles concurrently
pub async fn teardown_handles(handles: Vec<Arc<AttemptHandle>>) -> TeardownReport {
    let mut report = TeardownReport {
        handles: handles.len(),
        ..TeardownReport::default()
    };
    if handles.is_empty() {
        return report;
    }

    let results = join_all(handles.iter().map(|handle| async move {
        let terminated = handle.terminate().await;
        let released = handle.release().await;
        debug!(attempt = %handle.id(), terminated = ?terminated, released, "Handle torn down");
        (terminated, released)
    }))
    .await;

    for (terminated, released) in results {
        match terminated {
            Some(true) => report.calls += 1,
            Some(false) => {
                report.calls += 1;
                report.terminate_failures += 1;
            }
            None => {}
        }
        if !released {
            report.release_failures += 1;
        }
    }

    info!(
        handles = report.handles,
        calls = report.calls,
        terminate_failures = report.terminate_failures,
        release_failures = report.release_failures,
        "Teardown settled"
    );
    report
}
