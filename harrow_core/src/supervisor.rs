//! Deadline enforcement around a single target invocation.
//!
//! Process targets kill their child on expiry, which stops the work for
//! real. Everything else runs on a dedicated worker thread that is raced
//! against the deadline. When the deadline wins the caller gets
//! [`ExecutionStatus::Timeout`] right away and the worker is detached, not
//! joined: it keeps running until the harness function returns on its own.
//! Cancellation of in-process work is therefore best-effort.

use crate::input::Input;
use crate::outcome::ExecutionStatus;
use crate::target::Target;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{error, warn};

/// Invokes `target` with `input`, giving up after `deadline`.
///
/// A result produced in time passes through unchanged. No retries are made.
pub fn invoke_with_timeout(
    target: &Arc<dyn Target>,
    input: &Input,
    deadline: Duration,
) -> ExecutionStatus {
    if let Some(status) = target.invoke_killable(input, deadline) {
        return status;
    }

    let (tx, rx) = mpsc::channel();
    let worker_target = Arc::clone(target);
    let worker_input = input.clone();
    let spawned = thread::Builder::new()
        .name("harrow-invocation".to_string())
        .spawn(move || {
            let status = worker_target.invoke(&worker_input);
            // The receiver is gone if the deadline already fired.
            let _ = tx.send(status);
        });
    if let Err(e) = spawned {
        error!("Failed to spawn invocation worker: {e}");
        return ExecutionStatus::Error(format!("Failed to spawn invocation worker: {e}"));
    }

    match rx.recv_timeout(deadline) {
        Ok(status) => status,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                target_identity = %target.identity(),
                ?deadline,
                "invocation timed out; detaching worker"
            );
            ExecutionStatus::Timeout
        }
        Err(RecvTimeoutError::Disconnected) => {
            ExecutionStatus::Error("invocation worker exited without reporting".to_string())
        }
    }
}
