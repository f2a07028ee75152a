//! Timeout and best-effort helpers for signaling operations
//!
//! Cleanup paths (hangup, endpoint release) must never block forever on a
//! misbehaving library and must never fail their caller. These helpers bound
//! an operation with a timeout and turn failures into log lines.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{ClientError, ClientResult};

/// Run an operation with a timeout, mapping expiry to [`ClientError::OperationTimeout`]
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, future: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(operation = operation, timeout_ms = timeout.as_millis() as u64, "Operation timed out");
            Err(ClientError::OperationTimeout {
                operation: operation.to_string(),
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Run a cleanup operation, logging and swallowing any failure.
///
/// Returns `true` when the operation completed successfully. A timeout is
/// reported as a failure but the caller is expected to treat the resource as
/// released anyway.
pub async fn best_effort<F>(operation: &str, timeout: Duration, future: F) -> bool
where
    F: Future<Output = ClientResult<()>>,
{
    match with_timeout(operation, timeout, future).await {
        Ok(()) => {
            debug!(operation = operation, "Cleanup step completed");
            true
        }
        Err(e) => {
            warn!(operation = operation, error = %e, category = e.category(), "Cleanup step failed, ignoring");
            false
        }
    }
}
