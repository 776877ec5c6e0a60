//! Signal delivery.

use crate::trace_categories;

use super::process::ProcessId;

/// Delivers `signum` to the given process, or to its entire process group
/// when `process_group` is set.
///
/// Delivery failures are ignored: the child may already have exited and been
/// reaped, in which case there is nothing left to signal.
pub(crate) fn send_signal(pid: ProcessId, signum: i32, process_group: bool) {
    let Ok(signal) = nix::sys::signal::Signal::try_from(signum) else {
        tracing::warn!(target: trace_categories::SIGNALS, "unknown signal number {signum}");
        return;
    };

    let pid = nix::unistd::Pid::from_raw(pid);
    let delivery = if process_group {
        nix::sys::signal::killpg(pid, signal)
    } else {
        nix::sys::signal::kill(pid, signal)
    };

    if let Err(errno) = delivery {
        tracing::debug!(
            target: trace_categories::SIGNALS,
            "failed to deliver {signal} to {pid}: {errno}"
        );
    }
}
