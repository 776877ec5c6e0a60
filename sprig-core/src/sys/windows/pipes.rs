//! Pipe draining over the host's anonymous pipes.

use std::io::Read;

use crate::{
    results::{OutputError, OutputResult},
    trace_categories,
};

const READ_CHUNK_SIZE: usize = 4096;

/// The parent-side read end of a child output pipe.
pub(crate) struct OutputPipe {
    inner: std::io::PipeReader,
}

impl From<std::io::PipeReader> for OutputPipe {
    fn from(inner: std::io::PipeReader) -> Self {
        Self { inner }
    }
}

impl OutputPipe {
    /// Reads the pipe to EOF, accumulating the bytes seen and handing each
    /// chunk to `on_chunk` when one is provided.
    pub(crate) fn drain(
        mut self,
        on_chunk: Option<&(dyn Fn(&[u8]) + Send + Sync)>,
    ) -> OutputResult {
        let mut contents: Vec<u8> = vec![];
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(contents),
                Ok(bytes_read) => {
                    let data = &chunk[..bytes_read];
                    if let Some(on_chunk) = on_chunk {
                        on_chunk(data);
                    }
                    contents.extend_from_slice(data);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    tracing::debug!(
                        target: trace_categories::READERS,
                        "read from pipe failed: {err}"
                    );
                    return Err(OutputError::Io(err.kind()));
                }
            }
        }
    }
}
