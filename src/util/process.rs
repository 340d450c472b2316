//! Running external programs with a timeout and cooperative cancellation.

use std::fs::File;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use derive_more::{Display, Error};

use super::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors of a single external program invocation.
#[derive(Debug, Display, Error)]
pub enum ProcessError {
    /// The program could not be started at all.
    #[display("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    /// Polling the child process failed.
    #[display("Waiting for {program} failed: {source}")]
    Wait { program: String, source: io::Error },
    /// The program terminated with a non-zero exit status.
    #[display("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    /// The program ran longer than allowed and was killed.
    #[display("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    /// The run was cancelled before or while the program was running.
    #[display("{program} was interrupted")]
    Cancelled { program: String },
}

impl ProcessError {
    /// Whether the program was stopped because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Default, Clone)]
pub struct Output {
    /// Empty if stdout was redirected into a file.
    pub stdout: String,
    pub stderr: String,
}

/// How to supervise a program.
#[derive(Debug, Default)]
pub struct RunOptions {
    timeout: Option<Duration>,
    cancel: CancelToken,
    stdout: Option<File>,
}

impl RunOptions {
    pub fn new(cancel: &CancelToken) -> Self {
        Self {
            cancel: cancel.clone(),
            ..Default::default()
        }
    }

    /// Kill the program once it ran for longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stream stdout into `file` instead of capturing it.
    pub fn stdout_to(mut self, file: File) -> Self {
        self.stdout = Some(file);
        self
    }
}

/// Run `command` to completion.
///
/// Stdin is closed, stderr is always captured. The child is killed when the
/// timeout elapses or the [CancelToken] fires.
pub fn run(command: &mut Command, options: RunOptions) -> Result<Output, ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let RunOptions {
        timeout,
        cancel,
        stdout,
    } = options;

    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled { program });
    }

    command.stdin(Stdio::null()).stderr(Stdio::piped());
    let captures_stdout = stdout.is_none();
    match stdout {
        Some(file) => command.stdout(file),
        None => command.stdout(Stdio::piped()),
    };

    log::trace!(target: "util::process", "Running: {command:?}");
    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                kill(&mut child, &program);
                return Err(ProcessError::Wait { program, source });
            }
        }

        if cancel.is_cancelled() {
            kill(&mut child, &program);
            return Err(ProcessError::Cancelled { program });
        }

        if let Some(timeout) = timeout.filter(|timeout| started.elapsed() >= *timeout) {
            kill(&mut child, &program);
            return Err(ProcessError::TimedOut { program, timeout });
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = if captures_stdout {
        collect(stdout_reader)
    } else {
        String::new()
    };
    let stderr = collect(stderr_reader);

    if !status.success() {
        return Err(ProcessError::Failed {
            program,
            status,
            stderr: stderr.trim_end().to_string(),
        });
    }

    Ok(Output { stdout, stderr })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

// Reader threads of a killed child are detached: a grandchild may still hold
// the pipe open.
fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        log::warn!(target: "util::process", "Killing {program} failed: {e}");
    }
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let output = run(
            &mut sh("echo hello; echo warning >&2"),
            RunOptions::new(&CancelToken::new()),
        )
        .unwrap();

        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "warning");
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let err = run(
            &mut sh("echo 'access denied' >&2; exit 3"),
            RunOptions::new(&CancelToken::new()),
        )
        .unwrap_err();

        match err {
            ProcessError::Failed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "access denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = run(
            &mut Command::new("definitely-not-an-installed-program"),
            RunOptions::new(&CancelToken::new()),
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn slow_program_times_out() {
        let started = Instant::now();
        let err = run(
            &mut sh("sleep 5"),
            RunOptions::new(&CancelToken::new()).timeout(Some(Duration::from_millis(200))),
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn cancelled_token_prevents_start() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let err = run(
            &mut sh(&format!("touch {}", marker.display())),
            RunOptions::new(&cancel),
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::Cancelled { .. }));
        assert!(!marker.exists());
    }

    #[test]
    fn cancellation_kills_running_program() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run(&mut sh("sleep 5"), RunOptions::new(&cancel)).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, ProcessError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn stdout_can_be_streamed_into_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let file = File::create(&target).unwrap();

        let output = run(
            &mut sh("echo dumped"),
            RunOptions::new(&CancelToken::new()).stdout_to(file),
        )
        .unwrap();

        assert!(output.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(target).unwrap(), "dumped\n");
    }
}
