//! Local process supervisor.
//!
//! Runs the pipeline as a child of this process, in a process group of its
//! own so the whole tree can be signalled at once.

use async_trait::async_trait;
use listcast_core::supervisor::*;
use listcast_core::{Error, Result};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::tree::{TreeSignal, signal_tree};

/// Buffered output lines between the pipe readers and the consumer.
const OUTPUT_BUFFER: usize = 256;

/// Supervisor that runs pipelines as local OS processes.
#[derive(Debug, Clone, Default)]
pub struct LocalProcessSupervisor;

impl LocalProcessSupervisor {
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &PipelineSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        cmd
    }
}

#[async_trait]
impl Supervisor for LocalProcessSupervisor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn spawn(&self, spec: PipelineSpec) -> Result<SupervisedProcess> {
        let mut child = Self::command(&spec)
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", spec.program, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("process exited before it could be tracked".to_string()))?;

        info!(pid, program = %spec.program, args = ?spec.args, "Spawned pipeline");

        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_lines(stdout, LogStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_lines(stderr, LogStream::Stderr, tx.clone()));
        }
        drop(tx);

        let (exit_tx, handle) = ProcessHandle::channel(pid);
        tokio::spawn(async move {
            let info = match child.wait().await {
                Ok(status) => exit_info(status),
                Err(e) => {
                    warn!(pid, error = %e, "Failed to wait for pipeline");
                    ExitInfo::unknown()
                }
            };
            debug!(pid, ?info, "Pipeline exited");
            let _ = exit_tx.send(Some(info));
        });

        Ok(SupervisedProcess {
            handle,
            output: Box::pin(ReceiverStream::new(rx)),
        })
    }

    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Result<()> {
        let pid = handle.pid();
        info!(pid, grace_ms = grace.as_millis() as u64, "Terminating process tree");

        signal_tree(pid, TreeSignal::Graceful).await?;

        if tokio::time::timeout(grace, handle.wait()).await.is_err() {
            warn!(pid, "Pipeline ignored graceful termination, killing");
        }

        // Descendants may outlive the leader or ignore SIGTERM; sweep the group.
        signal_tree(pid, TreeSignal::Kill).await?;

        let exit = handle.wait().await;
        debug!(pid, ?exit, "Process tree terminated");
        Ok(())
    }

    async fn sweep(&self, handle: &ProcessHandle) -> Result<()> {
        let pid = handle.pid();
        if signal_tree(pid, TreeSignal::Kill).await? {
            warn!(pid, "Killed descendants left behind by the pipeline");
        }
        Ok(())
    }
}

/// Forward lines from a pipe until it closes or the consumer goes away.
async fn read_lines<R>(reader: R, stream: LogStream, tx: mpsc::Sender<LogLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if tx.send(LogLine::new(stream, line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(?stream, error = %e, "Error reading pipeline output");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_info(status: ExitStatus) -> ExitInfo {
    use std::os::unix::process::ExitStatusExt;

    ExitInfo {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_info(status: ExitStatus) -> ExitInfo {
    ExitInfo {
        code: status.code(),
        signal: None,
    }
}
