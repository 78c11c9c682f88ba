//! Render job scheduling for the listcast render orchestrator.
//!
//! Admits at most one render at a time and races the pipeline's exit against
//! its deadline and against cancellation, finalizing every job exactly once.

pub mod cancel;
pub mod gate;
pub mod orchestrator;
pub mod reporter;
mod runtime;
pub mod watchdog;

pub use cancel::{CancelOutcome, CancellationHandler};
pub use gate::{AdmissionGate, Ticket};
pub use orchestrator::{RenderOrchestrator, RenderSession};
pub use reporter::ResultReporter;
pub use watchdog::Watchdog;
