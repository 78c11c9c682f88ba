//! Exactly-once job finalization.
//!
//! Process exit, the watchdog and cancellation all race to finish a job. Each
//! of them calls [`ResultReporter::claim`] first; only the caller that flips
//! the responded flag goes on to build and deliver the report.

use listcast_core::JobReport;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

pub struct ResultReporter {
    responded: AtomicBool,
    reply: Mutex<Option<oneshot::Sender<JobReport>>>,
}

impl ResultReporter {
    /// Create a reporter and the receiver its report is delivered on.
    pub fn new() -> (Self, oneshot::Receiver<JobReport>) {
        let (tx, rx) = oneshot::channel();
        let reporter = Self {
            responded: AtomicBool::new(false),
            reply: Mutex::new(Some(tx)),
        };
        (reporter, rx)
    }

    /// Try to become the path that finalizes the job.
    ///
    /// Returns `true` exactly once over the reporter's lifetime.
    pub fn claim(&self) -> bool {
        self.responded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    /// Send the report. Returns `false` if it was already sent or nobody is
    /// listening anymore.
    pub fn deliver(&self, report: JobReport) -> bool {
        let sender = self
            .reply
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match sender {
            Some(tx) => tx.send(report).is_ok(),
            None => false,
        }
    }
}
