//! Process spawning over `std::process`.

use std::collections::HashMap;
use std::os::windows::process::CommandExt;
use std::path::Path;
use std::process::Stdio;

use crate::{error, results::ExitStatus, trace_categories};

use super::pipes::OutputPipe;

/// Identifier of a spawned process.
pub type ProcessId = u32;

/// Writable handle connected to a child's standard input. Dropping the
/// handle closes the child's stdin.
pub type ChildInput = std::process::ChildStdin;

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// A spawned child process.
pub(crate) struct Child {
    pid: ProcessId,
    inner: std::process::Child,
}

impl Child {
    pub(crate) fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Waits for the child to exit. On this platform the raw status word is
    /// the exit code.
    pub(crate) fn wait(&mut self) -> Result<ExitStatus, error::Error> {
        let status = self.inner.wait().map_err(error::ErrorKind::Io)?;
        Ok(ExitStatus::Exited(status.code().unwrap_or(1)))
    }
}

/// Everything the platform backend needs to launch a child.
pub(crate) struct SpawnRequest<'a> {
    /// Resolved path of the program to execute.
    pub executable: &'a Path,
    /// Arguments, including the original program name at index 0.
    pub arguments: &'a [String],
    /// Full replacement environment for the child.
    pub environment: &'a HashMap<String, String>,
    /// Directory the child starts in, when it differs from the parent's.
    pub working_directory: Option<&'a Path>,
    /// Whether the child leads a new process group.
    pub new_process_group: bool,
    /// Whether stdout (and stderr) are piped back to the parent.
    pub redirect_output: bool,
    /// Whether stderr shares stdout's pipe.
    pub merge_stderr: bool,
}

/// The parent's view of a freshly spawned child.
pub(crate) struct Spawned {
    pub child: Child,
    pub stdin: ChildInput,
    pub stdout: Option<OutputPipe>,
    pub stderr: Option<OutputPipe>,
}

/// Launches a child process through the host's spawning primitive.
pub(crate) fn spawn(request: &SpawnRequest<'_>) -> Result<Spawned, error::Error> {
    let mut command = std::process::Command::new(request.executable);
    command.args(&request.arguments[1..]);
    command.env_clear();
    command.envs(request.environment);
    if let Some(dir) = request.working_directory {
        command.current_dir(dir);
    }
    if request.new_process_group {
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    command.stdin(Stdio::piped());

    let mut stdout = None;
    let mut stderr = None;
    if request.redirect_output {
        let (stdout_read, stdout_write) = std::io::pipe().map_err(error::ErrorKind::Io)?;
        if request.merge_stderr {
            command.stderr(Stdio::from(
                stdout_write.try_clone().map_err(error::ErrorKind::Io)?,
            ));
        } else {
            let (stderr_read, stderr_write) = std::io::pipe().map_err(error::ErrorKind::Io)?;
            command.stderr(Stdio::from(stderr_write));
            stderr = Some(OutputPipe::from(stderr_read));
        }
        command.stdout(Stdio::from(stdout_write));
        stdout = Some(OutputPipe::from(stdout_read));
    } else {
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::inherit());
    }

    let mut child = command.spawn().map_err(error::ErrorKind::Io)?;
    let pid = child.id();
    tracing::debug!(target: trace_categories::LAUNCH, "spawned child with pid {pid}");

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| error::ErrorKind::Io(std::io::Error::other("child stdin not piped")))?;

    Ok(Spawned {
        child: Child { pid, inner: child },
        stdin,
        stdout,
        stderr,
    })
}
