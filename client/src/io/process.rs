//! Launching sploit instances with a single combined output stream.

use std::io::{self, PipeReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("create output pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("spawn {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// The executable (or its interpreter from the shebang) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Kill handle for a sploit and everything it started.
///
/// On Unix each sploit leads its own process group, so killing the group
/// also stops helpers that inherited the output pipe (`sleep`, `curl`,
/// Python subprocesses) and the pipe reaches EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    leader: u32,
}

impl ProcessGroup {
    pub fn id(self) -> u32 {
        self.leader
    }

    /// Send `SIGKILL` to every process in the group.
    ///
    /// A group with no processes left is not an error.
    #[cfg(unix)]
    pub fn kill(self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = i32::try_from(self.leader)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }

    /// No process groups here; the worker kills the leader itself at the
    /// deadline.
    #[cfg(not(unix))]
    pub fn kill(self) -> io::Result<()> {
        Ok(())
    }
}

/// A freshly launched sploit: the process handle, its group, and the read
/// end of its merged stdout/stderr pipe.
#[derive(Debug)]
pub struct SploitProcess {
    pub child: Child,
    pub group: ProcessGroup,
    pub output: PipeReader,
}

/// Start `executable` with `address` as its only argument.
///
/// Stdout and stderr share one pipe so flags printed to either are seen in
/// the order the sploit wrote them. The write ends are owned by the child
/// only, so `output` reaches EOF once the sploit (and anything it spawned
/// holding the pipe) exits or is killed. On Unix the child starts a new
/// process group with itself as leader.
pub fn spawn_sploit(executable: &Path, address: &str) -> Result<SploitProcess, LaunchError> {
    let (output, writer) = io::pipe().map_err(LaunchError::Pipe)?;
    let stderr_writer = writer.try_clone().map_err(LaunchError::Pipe)?;

    let mut cmd = Command::new(executable);
    cmd.arg(address)
        // Python only line-buffers stdout when it is a terminal.
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr_writer);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        path: executable.to_path_buf(),
        source,
    })?;
    // Dropping the command closes the parent's copies of the write ends.
    drop(cmd);

    debug!(pid = child.id(), address, "spawned sploit");
    let group = ProcessGroup {
        leader: child.id(),
    };
    Ok(SploitProcess {
        child,
        group,
        output,
    })
}
