//! Explicit cancellation and client-disconnect handling.

use listcast_core::CancelReason;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::gate::AdmissionGate;
use crate::runtime::JobRuntime;

const ATTACH_POLL: Duration = Duration::from_millis(10);

/// What an explicit cancel ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing was running.
    NoActiveJob,
    /// This call terminated the active job.
    Cancelled,
    /// The active job finished on its own before the cancel took effect.
    AlreadyFinished,
}

impl CancelOutcome {
    pub fn cancelled(self) -> bool {
        self == CancelOutcome::Cancelled
    }
}

/// Cancels whatever job currently holds the gate.
#[derive(Clone)]
pub struct CancellationHandler {
    gate: AdmissionGate<Arc<JobRuntime>>,
}

impl CancellationHandler {
    pub(crate) fn new(gate: AdmissionGate<Arc<JobRuntime>>) -> Self {
        Self { gate }
    }

    /// Cancel the active job, if there is one.
    ///
    /// Returns [`CancelOutcome::NoActiveJob`] right away when nothing is
    /// running. Otherwise resolves once the process tree is gone and the gate
    /// is free.
    pub async fn cancel_active(&self) -> CancelOutcome {
        let runtime = loop {
            if let Some(runtime) = self.gate.active() {
                break runtime;
            }
            if !self.gate.is_busy() {
                return CancelOutcome::NoActiveJob;
            }
            // Admitted but still spawning.
            tokio::time::sleep(ATTACH_POLL).await;
        };

        // Detached so a dropped caller cannot stop the termination half way.
        let cancel = tokio::spawn(runtime.clone().cancel(CancelReason::Requested));
        let cancelled = match cancel.await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                error!(error = %e, "Cancellation task failed");
                false
            }
        };

        runtime.wait_released().await;
        if cancelled {
            CancelOutcome::Cancelled
        } else {
            CancelOutcome::AlreadyFinished
        }
    }
}

/// Cancel `runtime` if `token` fires before the job is released.
///
/// The token belongs to the caller waiting on the job; it fires when that
/// caller goes away.
pub(crate) fn watch_disconnect(runtime: Arc<JobRuntime>, token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = runtime.wait_released() => {}
            _ = token.cancelled() => {
                if runtime.clone().cancel(CancelReason::Disconnected).await {
                    info!("Client disconnected, job cancelled");
                }
            }
        }
    });
}
