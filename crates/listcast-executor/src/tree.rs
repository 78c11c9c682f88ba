//! Process-tree signalling.
//!
//! The pipeline spawns its own children (encoders, a headless browser), so
//! termination always targets the whole tree rather than the single pid:
//! - POSIX: the child is a process-group leader and the group is signalled
//!   with `killpg`.
//! - Windows: `taskkill /T` walks the descendant tree.

use listcast_core::Result;
use tracing::debug;

/// Which termination signal to deliver to a process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSignal {
    /// Ask the tree to shut down (SIGTERM).
    Graceful,
    /// Kill the tree outright (SIGKILL).
    Kill,
}

/// Deliver `signal` to the tree rooted at `pid`.
///
/// Returns `false` when nothing was left to signal.
#[cfg(unix)]
pub async fn signal_tree(pid: u32, signal: TreeSignal) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let signo = match signal {
        TreeSignal::Graceful => Signal::SIGTERM,
        TreeSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(pid as i32), signo) {
        Ok(()) => {
            debug!(pid, ?signal, "Signalled process group");
            Ok(true)
        }
        Err(Errno::ESRCH) => {
            debug!(pid, ?signal, "Process group already gone");
            Ok(false)
        }
        Err(errno) => Err(std::io::Error::from(errno).into()),
    }
}

#[cfg(windows)]
pub async fn signal_tree(pid: u32, signal: TreeSignal) -> Result<bool> {
    let mut cmd = tokio::process::Command::new("taskkill");
    cmd.arg("/PID").arg(pid.to_string()).arg("/T");
    if signal == TreeSignal::Kill {
        cmd.arg("/F");
    }

    let output = cmd.output().await?;
    debug!(pid, ?signal, status = ?output.status, "taskkill finished");
    Ok(output.status.success())
}

/// Whether `pid` is still a live (non-zombie) process.
#[cfg(unix)]
pub fn is_running(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // An exited but unreaped child still answers signal 0.
    #[cfg(target_os = "linux")]
    {
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next());
            return state != Some('Z');
        }
    }

    true
}
