//! Process supervision backends for the listcast render orchestrator.
//!
//! Provides the local supervisor that runs the render pipeline as an OS
//! process group and tears the whole tree down on timeout or cancellation.

pub mod local;
pub mod tree;

pub use listcast_core::supervisor::{
    ExitInfo, LogLine, LogStream, PipelineSpec, ProcessHandle, SupervisedProcess, Supervisor,
};
pub use local::LocalProcessSupervisor;
pub use tree::{TreeSignal, signal_tree};
