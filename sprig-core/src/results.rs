//! Encapsulation of process execution results.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use crate::{error, escape};

/// How a child process terminated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    /// The process exited on its own with the given code.
    Exited(i32),

    /// The process was terminated by the given signal.
    #[cfg(unix)]
    Signalled(i32),
}

impl ExitStatus {
    /// Returns whether the status represents a clean zero exit.
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "terminated({code})"),
            #[cfg(unix)]
            Self::Signalled(signal) => write!(f, "signalled({signal})"),
        }
    }
}

/// Failure recorded while draining one captured stream.
///
/// Stream failures travel with the result rather than aborting the wait;
/// the other stream and the exit status are still reported.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum OutputError {
    /// A read from the capture pipe failed with something other than EINTR.
    #[cfg(unix)]
    #[error("failed to read from pipe: {0}")]
    ReadSyscall(nix::errno::Errno),

    /// Closing the capture pipe at EOF failed.
    #[cfg(unix)]
    #[error("failed to close pipe: {0}")]
    CloseSyscall(nix::errno::Errno),

    /// The host's read primitive failed.
    #[error("i/o error draining output: {0}")]
    Io(std::io::ErrorKind),
}

/// Bytes captured from one stream, or the failure that cut capture short.
pub type OutputResult = Result<Vec<u8>, OutputError>;

/// Immutable record of a completed process execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessResult {
    /// The arguments the process was launched with.
    pub arguments: Vec<String>,
    /// The environment the process was launched with.
    pub environment: HashMap<String, String>,
    /// How the process terminated.
    pub exit_status: ExitStatus,
    /// Bytes captured from the child's stdout.
    pub stdout: OutputResult,
    /// Bytes captured from the child's stderr. Empty when stderr was merged
    /// into stdout.
    pub stderr: OutputResult,
}

impl ProcessResult {
    /// Returns the captured stdout decoded as UTF-8.
    pub fn utf8_output(&self) -> Result<String, error::Error> {
        let bytes = self.stdout.clone().map_err(error::ErrorKind::from)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Returns the captured stderr decoded as UTF-8.
    pub fn utf8_stderr(&self) -> Result<String, error::Error> {
        let bytes = self.stderr.clone().map_err(error::ErrorKind::from)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// The arguments to display: `sandbox-exec` wrappers carry a profile
    /// preamble in their first three arguments that only adds noise.
    fn displayed_arguments(&self) -> &[String] {
        if self.arguments.first().is_some_and(|arg| arg == "sandbox-exec")
            && self.arguments.len() > 3
        {
            &self.arguments[3..]
        } else {
            &self.arguments
        }
    }
}

impl fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.exit_status,
            escape::render_arguments(self.displayed_arguments())
        )?;

        for stream in [&self.stdout, &self.stderr] {
            if let Ok(bytes) = stream {
                if !bytes.is_empty() {
                    let text = String::from_utf8_lossy(bytes);
                    for line in text.lines() {
                        f.write_char('\n')?;
                        write!(f, "    {line}")?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(arguments: Vec<&str>, exit_status: ExitStatus) -> ProcessResult {
        ProcessResult {
            arguments: arguments.into_iter().map(Into::into).collect(),
            environment: HashMap::new(),
            exit_status,
            stdout: Ok(vec![]),
            stderr: Ok(vec![]),
        }
    }

    #[test]
    fn test_success_predicate() {
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Exited(7).success());
        #[cfg(unix)]
        assert!(!ExitStatus::Signalled(9).success());
    }

    #[test]
    fn test_display_terminated() {
        let result = result_with(vec!["/bin/sh", "-c", "exit 7"], ExitStatus::Exited(7));
        assert_eq!(result.to_string(), "terminated(7): /bin/sh -c 'exit 7'");
    }

    #[cfg(unix)]
    #[test]
    fn test_display_signalled() {
        let result = result_with(vec!["/bin/cat"], ExitStatus::Signalled(9));
        assert_eq!(result.to_string(), "signalled(9): /bin/cat");
    }

    #[test]
    fn test_display_indents_output() {
        let mut result = result_with(vec!["/bin/echo", "hi"], ExitStatus::Exited(0));
        result.stdout = Ok(b"one\ntwo\n".to_vec());
        assert_eq!(
            result.to_string(),
            "terminated(0): /bin/echo hi\n    one\n    two"
        );
    }

    #[test]
    fn test_display_strips_sandbox_exec_preamble() {
        let result = result_with(
            vec!["sandbox-exec", "-p", "(version 1)", "/bin/echo", "hi"],
            ExitStatus::Exited(0),
        );
        assert_eq!(result.to_string(), "terminated(0): /bin/echo hi");
    }

    #[test]
    fn test_utf8_decoding() {
        let mut result = result_with(vec!["/bin/echo"], ExitStatus::Exited(0));
        result.stdout = Ok(b"hello\n".to_vec());
        assert_eq!(result.utf8_output().unwrap(), "hello\n");

        result.stdout = Ok(vec![0xff, 0xfe]);
        let err = result.utf8_output().unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::IllegalUtf8(_)
        ));
    }
}
