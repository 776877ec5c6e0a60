//! Process spawning via the `posix_spawn` family.
//!
//! N.B. nix does not currently expose safe wrappers for `posix_spawn`, its
//! attribute records, or its file-action lists, so this module calls
//! `nix::libc` directly and keeps the unsafety behind small owning wrappers.

use std::collections::HashMap;
use std::ffi::{CString, OsStr};
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use nix::libc;

use crate::{error, results::ExitStatus, trace_categories};

use super::pipes::{self, OutputPipe};

/// Identifier of a spawned process.
pub type ProcessId = i32;

/// Writable handle connected to a child's standard input. Dropping the
/// handle closes the child's stdin.
pub type ChildInput = std::fs::File;

/// A spawned child process, identified by pid.
pub(crate) struct Child {
    pid: ProcessId,
}

impl Child {
    pub(crate) fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Reaps the child, blocking until it terminates.
    pub(crate) fn wait(&mut self) -> Result<ExitStatus, error::Error> {
        loop {
            match nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(self.pid), None) {
                Ok(nix::sys::wait::WaitStatus::Exited(_, code)) => {
                    return Ok(ExitStatus::Exited(code));
                }
                Ok(nix::sys::wait::WaitStatus::Signaled(_, signal, _)) => {
                    return Ok(ExitStatus::Signalled(signal as i32));
                }
                Ok(status) => panic!("unexpected status from waitpid: {status:?}"),
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(error::ErrorKind::WaitpidSyscall(errno).into()),
            }
        }
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

/// Launches a child process.
///
/// The child starts with an empty signal mask and default dispositions for
/// every signal the host allows to be reset. Pipe ends are dup2'd onto the
/// child's stdio and then closed in the child's file-action list, so the
/// child holds no duplicate that would keep the parent from seeing EOF.
pub(crate) fn spawn(request: &SpawnRequest<'_>) -> Result<Spawned, error::Error> {
    let spawn_err = |errno: Errno| {
        error::Error::from(error::ErrorKind::SpawnFailed(
            errno,
            request.arguments.to_vec(),
        ))
    };

    let (stdin_read, stdin_write) = pipes::pipe()?;
    let stdout_pipe = if request.redirect_output {
        Some(pipes::pipe()?)
    } else {
        None
    };
    let stderr_pipe = if request.redirect_output && !request.merge_stderr {
        Some(pipes::pipe()?)
    } else {
        None
    };

    let mut attributes = SpawnAttributes::new().map_err(spawn_err)?;
    attributes.reset_signal_handling().map_err(spawn_err)?;

    let mut flags = libc::POSIX_SPAWN_SETSIGMASK | libc::POSIX_SPAWN_SETSIGDEF;
    if request.new_process_group {
        flags |= libc::POSIX_SPAWN_SETPGROUP;
        attributes.set_process_group(0).map_err(spawn_err)?;
    }
    attributes.set_flags(flags).map_err(spawn_err)?;

    let mut actions = FileActions::new().map_err(spawn_err)?;

    if let Some(dir) = request.working_directory {
        if !FileActions::supports_chdir() {
            return Err(error::ErrorKind::WorkingDirectoryUnsupported.into());
        }
        actions.add_chdir(dir).map_err(spawn_err)?;
    }

    actions
        .add_dup2(stdin_read.as_raw_fd(), 0)
        .map_err(spawn_err)?;
    actions.add_close(stdin_read.as_raw_fd()).map_err(spawn_err)?;
    actions
        .add_close(stdin_write.as_raw_fd())
        .map_err(spawn_err)?;

    if let Some((stdout_read, stdout_write)) = &stdout_pipe {
        actions
            .add_dup2(stdout_write.as_raw_fd(), 1)
            .map_err(spawn_err)?;
        actions
            .add_close(stdout_read.as_raw_fd())
            .map_err(spawn_err)?;
        actions
            .add_close(stdout_write.as_raw_fd())
            .map_err(spawn_err)?;

        if let Some((stderr_read, stderr_write)) = &stderr_pipe {
            actions
                .add_dup2(stderr_write.as_raw_fd(), 2)
                .map_err(spawn_err)?;
            actions
                .add_close(stderr_read.as_raw_fd())
                .map_err(spawn_err)?;
            actions
                .add_close(stderr_write.as_raw_fd())
                .map_err(spawn_err)?;
        } else {
            actions.add_dup2(1, 2).map_err(spawn_err)?;
        }
    } else {
        // Inherited stdio, stated explicitly in the action list so the
        // descriptor layout is the same in both modes.
        actions.add_dup2(1, 1).map_err(spawn_err)?;
        actions.add_dup2(2, 2).map_err(spawn_err)?;
    }

    let executable = to_cstring(request.executable.as_os_str()).map_err(spawn_err)?;

    let mut argv: Vec<CString> = request
        .arguments
        .iter()
        .map(|arg| to_cstring(OsStr::new(arg)))
        .collect::<Result<_, _>>()
        .map_err(spawn_err)?;
    if request.working_directory.is_some() {
        // The spawn-time chdir takes effect before argv[0] is interpreted,
        // so a relative program name would resolve against the wrong
        // directory. Substitute the resolved path.
        argv[0] = executable.clone();
    }

    let envp: Vec<CString> = request
        .environment
        .iter()
        .map(|(name, value)| to_cstring(OsStr::new(&format!("{name}={value}"))))
        .collect::<Result<_, _>>()
        .map_err(spawn_err)?;

    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());
    let mut envp_ptrs: Vec<*const libc::c_char> = envp.iter().map(|var| var.as_ptr()).collect();
    envp_ptrs.push(std::ptr::null());

    let mut pid: libc::pid_t = 0;
    // SAFETY: the attribute record and file-action list are initialized; the
    // argv/envp arrays are NUL-terminated and their CString backing stores
    // outlive the call.
    let ret = unsafe {
        libc::posix_spawn(
            &mut pid,
            executable.as_ptr(),
            actions.as_ptr(),
            attributes.as_ptr(),
            argv_ptrs.as_ptr().cast(),
            envp_ptrs.as_ptr().cast(),
        )
    };
    if ret != 0 {
        return Err(spawn_err(Errno::from_raw(ret)));
    }

    tracing::debug!(target: trace_categories::LAUNCH, "spawned child with pid {pid}");

    // The child's ends are dead weight in the parent; holding the write
    // sides open would also suppress EOF on the capture pipes.
    pipes::close(stdin_read)?;
    let stdout = match stdout_pipe {
        Some((read_end, write_end)) => {
            pipes::close(write_end)?;
            Some(OutputPipe::from(read_end))
        }
        None => None,
    };
    let stderr = match stderr_pipe {
        Some((read_end, write_end)) => {
            pipes::close(write_end)?;
            Some(OutputPipe::from(read_end))
        }
        None => None,
    };

    Ok(Spawned {
        child: Child { pid },
        stdin: ChildInput::from(stdin_write),
        stdout,
        stderr,
    })
}

fn to_cstring(s: &OsStr) -> Result<CString, Errno> {
    CString::new(s.as_bytes()).map_err(|_| Errno::EINVAL)
}

fn check(ret: libc::c_int) -> Result<(), Errno> {
    if ret == 0 {
        Ok(())
    } else {
        Err(Errno::from_raw(ret))
    }
}

/// Owning wrapper around `posix_spawnattr_t`.
struct SpawnAttributes {
    inner: MaybeUninit<libc::posix_spawnattr_t>,
}

impl SpawnAttributes {
    fn new() -> Result<Self, Errno> {
        let mut inner = MaybeUninit::uninit();
        // SAFETY: init fills the record before any other use.
        check(unsafe { libc::posix_spawnattr_init(inner.as_mut_ptr()) })?;
        Ok(Self { inner })
    }

    fn as_ptr(&mut self) -> *mut libc::posix_spawnattr_t {
        self.inner.as_mut_ptr()
    }

    /// Arranges for the child to start with an empty signal mask and the
    /// default disposition for every signal other than SIGKILL and SIGSTOP,
    /// which cannot be reset.
    fn reset_signal_handling(&mut self) -> Result<(), Errno> {
        // SAFETY: both signal sets are fully written by sigemptyset /
        // sigfillset before being handed to the attribute record.
        unsafe {
            let mut no_signals: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut no_signals);
            check(libc::posix_spawnattr_setsigmask(self.as_ptr(), &no_signals))?;

            let mut default_signals: libc::sigset_t = std::mem::zeroed();
            libc::sigfillset(&mut default_signals);
            libc::sigdelset(&mut default_signals, libc::SIGKILL);
            libc::sigdelset(&mut default_signals, libc::SIGSTOP);
            check(libc::posix_spawnattr_setsigdefault(
                self.as_ptr(),
                &default_signals,
            ))?;
        }

        Ok(())
    }

    fn set_process_group(&mut self, pgid: libc::pid_t) -> Result<(), Errno> {
        // SAFETY: the record was initialized in new().
        check(unsafe { libc::posix_spawnattr_setpgroup(self.as_ptr(), pgid) })
    }

    fn set_flags(&mut self, flags: libc::c_int) -> Result<(), Errno> {
        // SAFETY: the record was initialized in new().
        check(unsafe { libc::posix_spawnattr_setflags(self.as_ptr(), flags as libc::c_short) })
    }
}

impl Drop for SpawnAttributes {
    fn drop(&mut self) {
        // SAFETY: new() initialized the record.
        unsafe {
            libc::posix_spawnattr_destroy(self.inner.as_mut_ptr());
        }
    }
}

/// Owning wrapper around `posix_spawn_file_actions_t`.
struct FileActions {
    inner: MaybeUninit<libc::posix_spawn_file_actions_t>,
}

impl FileActions {
    fn new() -> Result<Self, Errno> {
        let mut inner = MaybeUninit::uninit();
        // SAFETY: init fills the list before any other use.
        check(unsafe { libc::posix_spawn_file_actions_init(inner.as_mut_ptr()) })?;
        Ok(Self { inner })
    }

    fn as_ptr(&mut self) -> *mut libc::posix_spawn_file_actions_t {
        self.inner.as_mut_ptr()
    }

    /// Whether the host can change the working directory between fork and
    /// exec.
    const fn supports_chdir() -> bool {
        cfg!(any(
            all(target_os = "linux", target_env = "gnu"),
            target_vendor = "apple"
        ))
    }

    #[cfg(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple"))]
    fn add_chdir(&mut self, dir: &Path) -> Result<(), Errno> {
        let dir = to_cstring(dir.as_os_str())?;
        // SAFETY: the list was initialized in new(); the directory string
        // is copied by the call.
        check(unsafe {
            libc::posix_spawn_file_actions_addchdir_np(self.as_ptr(), dir.as_ptr())
        })
    }

    #[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")))]
    fn add_chdir(&mut self, _dir: &Path) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    fn add_dup2(&mut self, fd: i32, new_fd: i32) -> Result<(), Errno> {
        // SAFETY: the list was initialized in new().
        check(unsafe { libc::posix_spawn_file_actions_adddup2(self.as_ptr(), fd, new_fd) })
    }

    fn add_close(&mut self, fd: i32) -> Result<(), Errno> {
        // SAFETY: the list was initialized in new().
        check(unsafe { libc::posix_spawn_file_actions_addclose(self.as_ptr(), fd) })
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        // SAFETY: new() initialized the list.
        unsafe {
            libc::posix_spawn_file_actions_destroy(self.inner.as_mut_ptr());
        }
    }
}
