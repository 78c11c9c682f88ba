//! Process supervisor trait and process handle types.
//!
//! Supervisors run the render pipeline as an OS process tree and can tear
//! the whole tree down on request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

use crate::Result;

/// How to launch the pipeline for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Executable to run.
    pub program: String,
    /// Full argument list, including the script and job arguments.
    pub args: Vec<String>,
    /// Extra environment variables on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,
    /// Terminating signal on POSIX.
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// The exit could not be observed (reaper lost).
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Shared handle to a running process.
///
/// Cloning is cheap; every clone observes the same exit event.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    exit: watch::Receiver<Option<ExitInfo>>,
}

impl ProcessHandle {
    /// Create a handle and the sender the reaper uses to publish the exit.
    pub fn channel(pid: u32) -> (watch::Sender<Option<ExitInfo>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { pid, exit: rx })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The exit, if it has already happened.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_info().is_some()
    }

    /// Wait for the process to exit.
    pub async fn wait(&self) -> ExitInfo {
        let mut rx = self.exit.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(info) => (*info).unwrap_or_else(ExitInfo::unknown),
            Err(_) => ExitInfo::unknown(),
        }
    }
}

/// A line of pipeline output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub content: String,
}

impl LogLine {
    pub fn new(stream: LogStream, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A freshly spawned pipeline.
pub struct SupervisedProcess {
    pub handle: ProcessHandle,
    /// stdout and stderr lines, interleaved in arrival order. Ends once both
    /// pipes are closed.
    pub output: BoxStream<'static, LogLine>,
}

/// Trait for process supervisors.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Name of this supervisor.
    fn name(&self) -> &'static str;

    /// Start the pipeline in its own process group.
    async fn spawn(&self, spec: PipelineSpec) -> Result<SupervisedProcess>;

    /// Terminate the process and all of its descendants.
    ///
    /// Sends a graceful signal to the whole tree, waits up to `grace`, then
    /// kills forcefully. Resolves once the process is confirmed gone.
    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Result<()>;

    /// Kill whatever is left of the tree after the leader has exited.
    async fn sweep(&self, handle: &ProcessHandle) -> Result<()>;
}
