//! Pipe allocation and draining.

use std::os::fd::{IntoRawFd, OwnedFd, RawFd};

use crate::{
    error,
    results::{OutputError, OutputResult},
    trace_categories,
};

/// Largest number of bytes consumed from a pipe per read.
const READ_CHUNK_SIZE: usize = 4096;

/// Creates a new pipe, returning its read and write ends.
pub(crate) fn pipe() -> Result<(OwnedFd, OwnedFd), error::Error> {
    let (read_end, write_end) =
        nix::unistd::pipe().map_err(error::ErrorKind::PipeSyscall)?;
    Ok((read_end, write_end))
}

/// Closes the given descriptor, surfacing the errno on failure.
pub(crate) fn close(fd: OwnedFd) -> Result<(), error::Error> {
    nix::unistd::close(fd.into_raw_fd()).map_err(error::ErrorKind::CloseSyscall)?;
    Ok(())
}

/// The parent-side read end of a child output pipe.
///
/// Ownership of the descriptor passes to [`drain`](Self::drain), which closes
/// it once the child's write side reaches EOF.
pub(crate) struct OutputPipe {
    fd: RawFd,
}

impl From<OwnedFd> for OutputPipe {
    fn from(fd: OwnedFd) -> Self {
        Self {
            fd: fd.into_raw_fd(),
        }
    }
}

impl OutputPipe {
    /// Reads the pipe to EOF, accumulating the bytes seen and handing each
    /// chunk to `on_chunk` when one is provided.
    ///
    /// Interrupted reads are retried. On a read failure the descriptor is
    /// deliberately left open: the child may still be writing, and closing
    /// the read end could raise SIGPIPE in it. The descriptor is reclaimed
    /// when the process exits.
    pub(crate) fn drain(
        self,
        on_chunk: Option<&(dyn Fn(&[u8]) + Send + Sync)>,
    ) -> OutputResult {
        let mut contents: Vec<u8> = vec![];
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match nix::unistd::read(self.fd, &mut chunk) {
                Ok(0) => {
                    nix::unistd::close(self.fd).map_err(OutputError::CloseSyscall)?;
                    return Ok(contents);
                }
                Ok(bytes_read) => {
                    let data = &chunk[..bytes_read];
                    if let Some(on_chunk) = on_chunk {
                        on_chunk(data);
                    }
                    contents.extend_from_slice(data);
                }
                Err(nix::errno::Errno::EINTR) => {}
                Err(errno) => {
                    tracing::debug!(
                        target: trace_categories::READERS,
                        "read from fd {} failed: {errno}",
                        self.fd
                    );
                    return Err(OutputError::ReadSyscall(errno));
                }
            }
        }
    }

}
