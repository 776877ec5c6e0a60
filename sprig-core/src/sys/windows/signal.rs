//! Signal delivery, approximated with the host's termination facilities.

use crate::trace_categories;

use super::process::ProcessId;

const SIGINT: i32 = 2;

/// Delivers a best-effort equivalent of `signum` to the given process.
///
/// An interrupt request asks the process to stop; anything else terminates
/// it forcefully. When `process_group` is set the process's descendants are
/// included. Delivery failures are ignored.
pub(crate) fn send_signal(pid: ProcessId, signum: i32, process_group: bool) {
    let mut command = std::process::Command::new("taskkill");
    command.args(["/pid", &pid.to_string()]);
    if signum != SIGINT {
        command.arg("/f");
    }
    if process_group {
        command.arg("/t");
    }
    command.stdin(std::process::Stdio::null());
    command.stdout(std::process::Stdio::null());
    command.stderr(std::process::Stdio::null());

    match command.status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::debug!(
                target: trace_categories::SIGNALS,
                "taskkill for {pid} exited with {status}"
            );
        }
        Err(err) => {
            tracing::debug!(
                target: trace_categories::SIGNALS,
                "failed to run taskkill for {pid}: {err}"
            );
        }
    }
}
