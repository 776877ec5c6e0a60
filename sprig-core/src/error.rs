//! Error facilities

use crate::results;

/// Unified error type for this crate. Contains just a kind for now,
/// but will be extended later with additional context.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error {
    /// The kind of error.
    kind: ErrorKind,
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

/// Monolithic error type for the subprocess engine
#[derive(thiserror::Error, Debug)]
pub enum ErrorKind {
    /// No executable could be resolved for the named program.
    #[error("could not find executable for '{0}'")]
    MissingExecutableProgram(String),

    /// The host has no way to change the working directory at spawn time.
    #[error("working directory not supported on this platform")]
    WorkingDirectoryUnsupported,

    /// The spawn primitive returned a nonzero result.
    #[cfg(unix)]
    #[error("failed to spawn {command}: {0}", command = crate::escape::render_arguments(.1))]
    SpawnFailed(nix::errno::Errno, Vec<String>),

    /// Pipe creation failed.
    #[cfg(unix)]
    #[error("failed to create pipe: {0}")]
    PipeSyscall(nix::errno::Errno),

    /// Closing a known-open file descriptor failed.
    #[cfg(unix)]
    #[error("failed to close file descriptor: {0}")]
    CloseSyscall(nix::errno::Errno),

    /// Reading from a captured stream failed with something other than EINTR.
    #[cfg(unix)]
    #[error("failed to read from pipe: {0}")]
    ReadSyscall(nix::errno::Errno),

    /// Reaping the child failed for a reason other than EINTR.
    #[cfg(unix)]
    #[error("waitpid failed: {0}")]
    WaitpidSyscall(nix::errno::Errno),

    /// Captured bytes are not valid UTF-8.
    #[error("illegal UTF-8 sequence in captured output")]
    IllegalUtf8(#[from] std::string::FromUtf8Error),

    /// The child did not exit with a zero status.
    #[error("non-zero exit: {0}")]
    NonZeroExit(results::ProcessResult),

    /// An I/O error occurred while interacting with the host's process
    /// spawning primitives.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl<T> From<T> for Error
where
    ErrorKind: From<T>,
{
    fn from(convertible_to_kind: T) -> Self {
        Self {
            kind: convertible_to_kind.into(),
        }
    }
}

impl From<results::OutputError> for ErrorKind {
    fn from(err: results::OutputError) -> Self {
        match err {
            #[cfg(unix)]
            results::OutputError::ReadSyscall(errno) => Self::ReadSyscall(errno),
            #[cfg(unix)]
            results::OutputError::CloseSyscall(errno) => Self::CloseSyscall(errno),
            results::OutputError::Io(kind) => Self::Io(kind.into()),
        }
    }
}
