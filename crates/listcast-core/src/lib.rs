//! Core domain types and traits for the listcast render orchestrator.
//!
//! This crate contains:
//! - Job identifiers and the render job model with its state machine
//! - Marker-line parsing for the pipeline's stdout contract
//! - The process supervisor trait and process handle types

pub mod error;
pub mod id;
pub mod job;
pub mod marker;
pub mod supervisor;

pub use error::{Error, Result};
pub use id::JobId;
pub use job::{
    CancelReason, DEFAULT_LOG_LIMIT_BYTES, Job, JobOutcome, JobReport, JobState, ListingId, LogBuffer, RenderRequest,
    Variant,
};
pub use marker::{EXTERNAL_URL_KEY, Markers, OUTPUT_KEY, parse_marker};
pub use supervisor::{
    ExitInfo, LogLine, LogStream, PipelineSpec, ProcessHandle, SupervisedProcess, Supervisor,
};
