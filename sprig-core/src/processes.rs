//! Process lifecycle management: launching, output capture, waiting, and
//! signal delivery.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use crate::{
    error, escape, resolve,
    results::{OutputResult, ProcessResult},
    sys::{self, pipes::OutputPipe},
    trace_categories,
};

pub use crate::sys::process::{ChildInput, ProcessId};

/// Callback receiving chunks of child output as they are read.
///
/// Callbacks run on the reader threads: they must not block on locks held
/// by whoever calls [`Process::wait`].
pub type OutputCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// How a child's output streams are handled.
#[derive(Clone)]
pub enum OutputRedirection {
    /// The child inherits the parent's stdout and stderr; nothing is
    /// captured.
    None,

    /// Both streams are captured into the result. With `merge_stderr`, the
    /// child's stderr is pointed at its stdout at the descriptor level and
    /// the captured stderr is empty.
    Collect {
        /// Whether stderr shares stdout's pipe.
        merge_stderr: bool,
    },

    /// Streams are captured and additionally delivered chunk-by-chunk to
    /// the given callbacks as they arrive.
    Stream {
        /// Receives chunks of the child's stdout.
        on_stdout: OutputCallback,
        /// Receives chunks of the child's stderr. Unused when merging.
        on_stderr: OutputCallback,
        /// Whether stderr shares stdout's pipe.
        merge_stderr: bool,
    },
}

impl Default for OutputRedirection {
    fn default() -> Self {
        Self::Collect {
            merge_stderr: false,
        }
    }
}

impl OutputRedirection {
    fn redirects(&self) -> bool {
        !matches!(self, Self::None)
    }

    fn merges_stderr(&self) -> bool {
        match self {
            Self::None => false,
            Self::Collect { merge_stderr } | Self::Stream { merge_stderr, .. } => *merge_stderr,
        }
    }

    fn stdout_callback(&self) -> Option<OutputCallback> {
        match self {
            Self::Stream { on_stdout, .. } => Some(on_stdout.clone()),
            _ => None,
        }
    }

    fn stderr_callback(&self) -> Option<OutputCallback> {
        match self {
            Self::Stream { on_stderr, .. } => Some(on_stderr.clone()),
            _ => None,
        }
    }
}

/// Where a launched process is in its lifecycle.
///
/// Transitions run strictly forward (`Idle` → `Capturing` →
/// `ResultPending` → `Complete`) and are serialized by the state mutex.
enum ProcessState {
    /// Not yet launched.
    Idle,

    /// The child is running and readers are draining its output pipes.
    Capturing {
        /// Completion group the readers leave as they finish.
        readers: Arc<CompletionGroup>,
    },

    /// Every reader has finished; the child may not have been reaped yet.
    ResultPending {
        stdout: OutputResult,
        stderr: OutputResult,
    },

    /// The child has been reaped and the result is final.
    Complete(ProcessResult),
}

/// Counts outstanding readers and wakes waiters when the last one leaves.
struct CompletionGroup {
    outstanding: Mutex<usize>,
    finished: Condvar,
}

impl CompletionGroup {
    fn new(count: usize) -> Self {
        Self {
            outstanding: Mutex::new(count),
            finished: Condvar::new(),
        }
    }

    fn leave(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.finished.notify_all();
        }
    }

    fn wait(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        while *outstanding > 0 {
            outstanding = self.finished.wait(outstanding).unwrap();
        }
    }
}

/// A captured stream's identity at the rendezvous.
#[derive(Clone, Copy, Debug)]
enum CapturedStream {
    Stdout,
    Stderr,
}

/// Meeting point for the stream readers: the last reader to arrive
/// publishes the combined results into the process state.
///
/// When only one reader was started (merged stderr), its arrival is the
/// terminal one and the missing partner is published as successful empty
/// output.
struct OutputRendezvous {
    state: Arc<Mutex<ProcessState>>,
    readers: Arc<CompletionGroup>,
    slot: Mutex<RendezvousSlot>,
}

struct RendezvousSlot {
    remaining: usize,
    stdout: Option<OutputResult>,
    stderr: Option<OutputResult>,
}

impl OutputRendezvous {
    fn new(
        state: Arc<Mutex<ProcessState>>,
        readers: Arc<CompletionGroup>,
        expected: usize,
    ) -> Self {
        Self {
            state,
            readers,
            slot: Mutex::new(RendezvousSlot {
                remaining: expected,
                stdout: None,
                stderr: None,
            }),
        }
    }

    fn arrive(&self, stream: CapturedStream, result: OutputResult) {
        tracing::debug!(target: trace_categories::READERS, "{stream:?} reader finished");

        let published = {
            let mut slot = self.slot.lock().unwrap();
            match stream {
                CapturedStream::Stdout => slot.stdout = Some(result),
                CapturedStream::Stderr => slot.stderr = Some(result),
            }
            slot.remaining -= 1;

            if slot.remaining == 0 {
                Some((
                    slot.stdout.take().unwrap_or_else(|| Ok(vec![])),
                    slot.stderr.take().unwrap_or_else(|| Ok(vec![])),
                ))
            } else {
                None
            }
        };

        if let Some((stdout, stderr)) = published {
            let mut state = self.state.lock().unwrap();
            debug_assert!(matches!(*state, ProcessState::Capturing { .. }));
            *state = ProcessState::ResultPending { stdout, stderr };
        }

        // Leave the group only after any publication, so a waiter woken by
        // the last reader always observes `ResultPending`.
        self.readers.leave();
    }
}

/// A child process: configuration, launch, output capture, wait, and
/// signalling.
///
/// Configuration is fixed at construction via the builder methods; a handle
/// can be launched exactly once. All operations take `&self`, so a handle
/// can be shared across threads once launched (for instance to `wait` on
/// one thread while another delivers signals).
pub struct Process {
    arguments: Vec<String>,
    environment: HashMap<String, String>,
    working_directory: Option<PathBuf>,
    redirection: OutputRedirection,
    verbose: bool,
    new_process_group: bool,

    launched: AtomicBool,
    pid: OnceLock<ProcessId>,
    child: Mutex<Option<sys::process::Child>>,
    state: Arc<Mutex<ProcessState>>,
}

impl Process {
    /// Creates a process that will run the given arguments, with
    /// `arguments[0]` naming the program. The child inherits the parent's
    /// environment, collects its output, and leads its own process group
    /// unless reconfigured.
    pub fn new<I, S>(arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            arguments: arguments.into_iter().map(Into::into).collect(),
            environment: std::env::vars().collect(),
            working_directory: None,
            redirection: OutputRedirection::default(),
            verbose: false,
            new_process_group: true,
            launched: AtomicBool::new(false),
            pid: OnceLock::new(),
            child: Mutex::new(None),
            state: Arc::new(Mutex::new(ProcessState::Idle)),
        }
    }

    /// Replaces the child's environment.
    #[must_use]
    pub fn environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the directory the child starts in.
    #[must_use]
    pub fn working_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(directory.into());
        self
    }

    /// Sets how the child's output streams are handled.
    #[must_use]
    pub fn output_redirection(mut self, redirection: OutputRedirection) -> Self {
        self.redirection = redirection;
        self
    }

    /// Sets whether the launch is traced with the shell-quoted argv.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets whether the child leads a new process group. Group leaders do
    /// not receive signals generated by the parent's controlling terminal.
    #[must_use]
    pub fn new_process_group(mut self, new_process_group: bool) -> Self {
        self.new_process_group = new_process_group;
        self
    }

    /// Returns the child's process id, once launched.
    pub fn pid(&self) -> Option<ProcessId> {
        self.pid.get().copied()
    }

    /// Returns whether the process has been launched.
    pub fn launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    /// Returns the process result without blocking, once a call to
    /// [`wait`](Self::wait) has completed.
    pub fn result(&self) -> Option<ProcessResult> {
        match &*self.state.lock().unwrap() {
            ProcessState::Complete(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Launches the process, returning a writable handle connected to the
    /// child's stdin. Dropping the handle closes the child's stdin.
    ///
    /// # Panics
    ///
    /// Panics if the argument vector does not name a program, or if the
    /// process was already launched. Both are caller bugs, not runtime
    /// failures.
    pub fn launch(&self) -> Result<ChildInput, error::Error> {
        assert!(
            !self.arguments.is_empty() && !self.arguments[0].is_empty(),
            "process arguments must name a program"
        );
        let already_launched = self.launched.swap(true, Ordering::SeqCst);
        assert!(!already_launched, "process can only be launched once");

        if self.verbose {
            tracing::info!(
                target: trace_categories::LAUNCH,
                "{}",
                escape::render_arguments(&self.arguments)
            );
        }

        let executable =
            resolve::resolve_executable(&self.arguments[0], self.working_directory.as_deref())
                .ok_or_else(|| {
                    error::ErrorKind::MissingExecutableProgram(self.arguments[0].clone())
                })?;

        let request = sys::process::SpawnRequest {
            executable: &executable,
            arguments: &self.arguments,
            environment: &self.environment,
            working_directory: self.working_directory.as_deref(),
            new_process_group: self.new_process_group,
            redirect_output: self.redirection.redirects(),
            merge_stderr: self.redirection.merges_stderr(),
        };
        let spawned = sys::process::spawn(&request)?;

        let _ = self.pid.set(spawned.child.pid());
        *self.child.lock().unwrap() = Some(spawned.child);

        self.start_capture(spawned.stdout, spawned.stderr);

        Ok(spawned.stdin)
    }

    /// Starts one reader per captured stream. The state must read as
    /// `Capturing` before the first reader exists: a fast child could
    /// otherwise have its reader publish while the state is still `Idle`.
    fn start_capture(&self, stdout: Option<OutputPipe>, stderr: Option<OutputPipe>) {
        let Some(stdout) = stdout else {
            *self.state.lock().unwrap() = ProcessState::ResultPending {
                stdout: Ok(vec![]),
                stderr: Ok(vec![]),
            };
            return;
        };

        let reader_count = 1 + usize::from(stderr.is_some());
        let readers = Arc::new(CompletionGroup::new(reader_count));
        let rendezvous = Arc::new(OutputRendezvous::new(
            self.state.clone(),
            readers.clone(),
            reader_count,
        ));

        *self.state.lock().unwrap() = ProcessState::Capturing { readers };

        spawn_reader(
            CapturedStream::Stdout,
            stdout,
            self.redirection.stdout_callback(),
            rendezvous.clone(),
        );
        if let Some(stderr) = stderr {
            spawn_reader(
                CapturedStream::Stderr,
                stderr,
                self.redirection.stderr_callback(),
                rendezvous,
            );
        }
    }

    /// Waits for the readers to drain the output and for the child to
    /// terminate, returning the process result.
    ///
    /// Safe to call from multiple threads and idempotent: every call after
    /// the first returns the same result.
    ///
    /// # Panics
    ///
    /// Panics if the process was never launched.
    pub fn wait(&self) -> Result<ProcessResult, error::Error> {
        assert!(self.launched(), "process was not launched");

        loop {
            let mut state = self.state.lock().unwrap();
            match &*state {
                ProcessState::Idle => unreachable!("launched process cannot be idle"),
                ProcessState::Complete(result) => return Ok(result.clone()),
                ProcessState::Capturing { readers } => {
                    let readers = readers.clone();
                    drop(state);
                    readers.wait();
                }
                ProcessState::ResultPending { .. } => return self.reap(&mut state),
            }
        }
    }

    /// Reaps the child and publishes the terminal result.
    ///
    /// Called with the state lock held and the state known to be
    /// `ResultPending`. Holding the lock across the reap is what makes
    /// concurrent `wait` calls agree: the first caller performs the reap,
    /// the rest are served from `Complete`.
    fn reap(&self, state: &mut ProcessState) -> Result<ProcessResult, error::Error> {
        let (stdout, stderr) = match std::mem::replace(state, ProcessState::Idle) {
            ProcessState::ResultPending { stdout, stderr } => (stdout, stderr),
            _ => unreachable!("reap requires a pending result"),
        };

        let reaped = {
            let mut child = self.child.lock().unwrap();
            let Some(child) = child.as_mut() else {
                unreachable!("launched process has no child record")
            };
            child.wait()
        };

        let exit_status = match reaped {
            Ok(exit_status) => exit_status,
            Err(err) => {
                // The reap can be retried; put the stream results back.
                *state = ProcessState::ResultPending { stdout, stderr };
                return Err(err);
            }
        };

        let result = ProcessResult {
            arguments: self.arguments.clone(),
            environment: self.environment.clone(),
            exit_status,
            stdout,
            stderr,
        };
        *state = ProcessState::Complete(result.clone());

        Ok(result)
    }

    /// Delivers the given signal to the child, or to its process group when
    /// the child leads one. Delivery failures are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the process was never launched.
    pub fn send_signal(&self, signal: i32) {
        assert!(self.launched(), "process was not launched");

        // The pid records a hair after the launch latch flips; a signal
        // racing that window has nothing to hit yet.
        let Some(pid) = self.pid() else {
            return;
        };
        sys::signal::send_signal(pid, signal, self.new_process_group);
    }

    /// Runs the given arguments to completion with collected output,
    /// returning the process result.
    pub fn popen<I, S>(
        arguments: I,
        environment: HashMap<String, String>,
    ) -> Result<ProcessResult, error::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let process = Self::new(arguments).environment(environment);
        // The returned stdin handle drops here, closing the child's stdin.
        process.launch()?;
        process.wait()
    }

    /// Runs the given arguments to completion and returns the child's
    /// stdout as UTF-8, failing unless the child exited cleanly with zero.
    pub fn check_non_zero_exit<I, S>(
        arguments: I,
        environment: HashMap<String, String>,
    ) -> Result<String, error::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let result = Self::popen(arguments, environment)?;
        if !result.exit_status.success() {
            return Err(error::ErrorKind::NonZeroExit(result).into());
        }

        result.utf8_output()
    }
}

fn spawn_reader(
    stream: CapturedStream,
    pipe: OutputPipe,
    callback: Option<OutputCallback>,
    rendezvous: Arc<OutputRendezvous>,
) {
    std::thread::spawn(move || {
        let result = pipe.drain(callback.as_deref());
        rendezvous.arrive(stream, result);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> Arc<Mutex<ProcessState>> {
        Arc::new(Mutex::new(ProcessState::Capturing {
            readers: Arc::new(CompletionGroup::new(0)),
        }))
    }

    fn pending_results(state: &Mutex<ProcessState>) -> (OutputResult, OutputResult) {
        match &*state.lock().unwrap() {
            ProcessState::ResultPending { stdout, stderr } => (stdout.clone(), stderr.clone()),
            _ => panic!("expected a pending result"),
        }
    }

    #[test]
    fn test_second_arrival_publishes_both_results() {
        let state = fresh_state();
        let readers = Arc::new(CompletionGroup::new(2));
        let rendezvous = OutputRendezvous::new(state.clone(), readers.clone(), 2);

        rendezvous.arrive(CapturedStream::Stderr, Ok(b"err".to_vec()));
        assert!(matches!(
            &*state.lock().unwrap(),
            ProcessState::Capturing { .. }
        ));

        rendezvous.arrive(CapturedStream::Stdout, Ok(b"out".to_vec()));
        let (stdout, stderr) = pending_results(&state);
        assert_eq!(stdout.unwrap(), b"out");
        assert_eq!(stderr.unwrap(), b"err");

        // Both readers have left; a waiter would not block.
        readers.wait();
    }

    #[test]
    fn test_sole_arrival_publishes_empty_partner() {
        let state = fresh_state();
        let readers = Arc::new(CompletionGroup::new(1));
        let rendezvous = OutputRendezvous::new(state.clone(), readers.clone(), 1);

        rendezvous.arrive(CapturedStream::Stdout, Ok(b"merged".to_vec()));
        let (stdout, stderr) = pending_results(&state);
        assert_eq!(stdout.unwrap(), b"merged");
        assert_eq!(stderr.unwrap(), b"");
    }

    #[test]
    fn test_stream_errors_travel_with_the_rendezvous() {
        let state = fresh_state();
        let readers = Arc::new(CompletionGroup::new(2));
        let rendezvous = OutputRendezvous::new(state.clone(), readers, 2);

        rendezvous.arrive(
            CapturedStream::Stdout,
            Err(crate::results::OutputError::Io(
                std::io::ErrorKind::BrokenPipe,
            )),
        );
        rendezvous.arrive(CapturedStream::Stderr, Ok(vec![]));

        let (stdout, stderr) = pending_results(&state);
        assert!(stdout.is_err());
        assert!(stderr.is_ok());
    }

    #[test]
    fn test_completion_group_blocks_until_all_leave() {
        let group = Arc::new(CompletionGroup::new(2));
        let waited = Arc::new(AtomicBool::new(false));

        let waiter = {
            let group = group.clone();
            let waited = waited.clone();
            std::thread::spawn(move || {
                group.wait();
                waited.store(true, Ordering::SeqCst);
            })
        };

        group.leave();
        assert!(!waited.load(Ordering::SeqCst));
        group.leave();

        waiter.join().unwrap();
        assert!(waited.load(Ordering::SeqCst));
    }

    #[test]
    fn test_redirection_accessors() {
        assert!(!OutputRedirection::None.redirects());
        assert!(OutputRedirection::default().redirects());
        assert!(!OutputRedirection::default().merges_stderr());
        assert!(OutputRedirection::Collect { merge_stderr: true }.merges_stderr());

        let callback: OutputCallback = Arc::new(|_chunk: &[u8]| {});
        let streaming = OutputRedirection::Stream {
            on_stdout: callback.clone(),
            on_stderr: callback,
            merge_stderr: false,
        };
        assert!(streaming.redirects());
        assert!(streaming.stdout_callback().is_some());
        assert!(OutputRedirection::default().stdout_callback().is_none());
    }

    #[test]
    fn test_observers_before_launch() {
        let process = Process::new(["/bin/true"]);
        assert!(!process.launched());
        assert_eq!(process.pid(), None);
    }
}
