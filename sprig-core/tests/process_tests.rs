//! End-to-end tests that launch real child processes.

#![cfg(unix)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use sprig_core::{ErrorKind, ExitStatus, OutputCallback, OutputRedirection, Process};

fn inherited_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[test]
fn zero_exit_capture() {
    let result = Process::popen(["/bin/echo", "hello"], inherited_env()).unwrap();

    assert_eq!(result.exit_status, ExitStatus::Exited(0));
    assert_eq!(result.utf8_output().unwrap(), "hello\n");
    assert_eq!(result.utf8_stderr().unwrap(), "");
}

#[test]
fn non_zero_exit() {
    let result = Process::popen(["/bin/sh", "-c", "exit 7"], inherited_env()).unwrap();
    assert_eq!(result.exit_status, ExitStatus::Exited(7));

    let err = Process::check_non_zero_exit(["/bin/sh", "-c", "exit 7"], inherited_env())
        .unwrap_err();
    match err.kind() {
        ErrorKind::NonZeroExit(result) => {
            assert_eq!(result.exit_status, ExitStatus::Exited(7));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn check_non_zero_exit_returns_stdout() {
    let output = Process::check_non_zero_exit(["/bin/echo", "ok"], inherited_env()).unwrap();
    assert_eq!(output, "ok\n");
}

#[test]
fn signal_termination() {
    let result = Process::popen(["/bin/sh", "-c", "kill -9 $$"], inherited_env()).unwrap();
    assert_eq!(result.exit_status, ExitStatus::Signalled(9));
}

#[test]
fn separate_streams() {
    let result = Process::popen(
        ["/bin/sh", "-c", "echo out; echo err 1>&2"],
        inherited_env(),
    )
    .unwrap();

    assert_eq!(result.utf8_output().unwrap(), "out\n");
    assert_eq!(result.utf8_stderr().unwrap(), "err\n");
}

#[test]
fn stderr_merge() {
    let process = Process::new(["/bin/sh", "-c", "echo out; echo err 1>&2"])
        .output_redirection(OutputRedirection::Collect { merge_stderr: true });
    process.launch().unwrap();
    let result = process.wait().unwrap();

    let output = result.utf8_output().unwrap();
    assert!(output.contains("out\n"));
    assert!(output.contains("err\n"));
    assert_eq!(result.utf8_stderr().unwrap(), "");
}

#[test]
fn missing_program() {
    let process = Process::new(["definitely-not-a-program-xyz"]);
    let err = process.launch().unwrap_err();

    match err.kind() {
        ErrorKind::MissingExecutableProgram(name) => {
            assert_eq!(name, "definitely-not-a-program-xyz");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
#[should_panic(expected = "process can only be launched once")]
fn double_launch_is_a_contract_error() {
    let process = Process::new(["/bin/echo", "once"]);
    process.launch().unwrap();
    let _ = process.launch();
}

#[test]
fn large_output_does_not_deadlock() {
    let result = Process::popen(
        ["/bin/sh", "-c", "yes | head -c 1048576"],
        inherited_env(),
    )
    .unwrap();

    assert_eq!(result.exit_status, ExitStatus::Exited(0));
    assert_eq!(result.stdout.unwrap().len(), 1_048_576);
}

#[test]
fn wait_is_idempotent() {
    let process = Process::new(["/bin/echo", "repeat"]);
    process.launch().unwrap();
    assert_eq!(process.result(), None);

    let first = process.wait().unwrap();
    let second = process.wait().unwrap();
    assert_eq!(first, second);
    assert_eq!(process.result(), Some(second));
}

#[test]
fn concurrent_waiters_agree() {
    let process = Process::new(["/bin/sh", "-c", "sleep 1; echo done"]);
    process.launch().unwrap();

    std::thread::scope(|scope| {
        let first = scope.spawn(|| process.wait().unwrap());
        let second = scope.spawn(|| process.wait().unwrap());
        assert_eq!(first.join().unwrap(), second.join().unwrap());
    });
}

#[test]
fn stdin_reaches_the_child() {
    let process = Process::new(["/bin/cat"]);
    let mut stdin = process.launch().unwrap();

    stdin.write_all(b"hello stdin").unwrap();
    drop(stdin);

    let result = process.wait().unwrap();
    assert_eq!(result.utf8_output().unwrap(), "hello stdin");
}

#[test]
fn streaming_callbacks_receive_every_chunk() {
    let streamed: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(vec![]));
    let sink = streamed.clone();
    let on_stdout: OutputCallback = Arc::new(move |chunk: &[u8]| {
        sink.lock().unwrap().extend_from_slice(chunk);
    });

    let process = Process::new(["/bin/sh", "-c", "echo one; echo two"]).output_redirection(
        OutputRedirection::Stream {
            on_stdout,
            on_stderr: Arc::new(|_chunk: &[u8]| {}),
            merge_stderr: false,
        },
    );
    process.launch().unwrap();
    let result = process.wait().unwrap();

    let captured = result.stdout.unwrap();
    assert_eq!(captured, b"one\ntwo\n");
    assert_eq!(*streamed.lock().unwrap(), captured);
}

#[test]
fn working_directory_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path().canonicalize().unwrap();

    let process = Process::new(["/bin/sh", "-c", "pwd"]).working_directory(&dir);
    process.launch().unwrap();
    let result = process.wait().unwrap();

    assert_eq!(
        result.utf8_output().unwrap().trim_end(),
        dir.to_string_lossy()
    );
}

#[test]
fn environment_is_fully_replaced() {
    let mut env = HashMap::new();
    env.insert("SPRIG_TEST_VALUE".to_owned(), "hello".to_owned());

    let result = Process::popen(["/bin/sh", "-c", "echo \"$SPRIG_TEST_VALUE\""], env).unwrap();
    assert_eq!(result.utf8_output().unwrap(), "hello\n");
}

#[test]
fn sigterm_interrupts_a_sleeping_child() {
    let process = Process::new(["/bin/sleep", "30"]);
    process.launch().unwrap();

    // Give the child a moment to finish its pre-exec setup.
    std::thread::sleep(std::time::Duration::from_millis(50));
    process.send_signal(15);
    let result = process.wait().unwrap();
    assert_eq!(result.exit_status, ExitStatus::Signalled(15));
}

#[test]
fn observers_reflect_the_launch() {
    let process = Process::new(["/bin/echo", "pid"]);
    assert!(!process.launched());

    process.launch().unwrap();
    assert!(process.launched());
    assert!(process.pid().is_some());

    process.wait().unwrap();
}

#[test]
fn unredirected_output_is_not_captured() {
    let process = Process::new(["/bin/sh", "-c", "exit 3"])
        .output_redirection(OutputRedirection::None);
    process.launch().unwrap();
    let result = process.wait().unwrap();

    assert_eq!(result.exit_status, ExitStatus::Exited(3));
    assert_eq!(result.stdout.unwrap(), b"");
    assert_eq!(result.stderr.unwrap(), b"");
}
