//! Bounded-wait subprocess runner for the local OCR tools

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::BackendError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const MAX_STDERR_CHARS: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` to completion, killing it once `timeout` has elapsed.
///
/// Output pipes are drained on reader threads so a chatty child cannot block
/// on a full pipe while we poll. A non-zero exit is an error carrying stderr.
pub fn run_with_timeout(
    mut command: Command,
    program: &str,
    timeout: Duration,
) -> Result<CommandOutput, BackendError> {
    debug!(program, ?timeout, "spawning");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| BackendError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            warn!(program, ?timeout, "process exceeded deadline, killing");
            if let Err(err) = child.kill() {
                warn!(program, error = %err, "failed to kill process");
            }
            // Reap so the child does not linger as a zombie
            child.wait()?;
            return Err(BackendError::Timeout {
                what: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = collect(stdout_reader)?;
    let stderr = collect(stderr_reader)?;

    if !status.success() {
        return Err(BackendError::ExitStatus {
            program: program.to_string(),
            status: status.to_string(),
            stderr: stderr.trim().chars().take(MAX_STDERR_CHARS).collect(),
        });
    }

    debug!(program, elapsed = ?started.elapsed(), bytes = stdout.len(), "process finished");
    Ok(CommandOutput { stdout, stderr })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<String, BackendError> {
    let bytes = reader
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe reader thread panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn test_captures_stdout() {
        let output = run_with_timeout(shell("echo hello"), "sh", Duration::from_secs(5)).unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_non_zero_exit_reports_stderr() {
        let err = run_with_timeout(shell("echo broken >&2; exit 3"), "sh", Duration::from_secs(5))
            .unwrap_err();
        match err {
            BackendError::ExitStatus { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deadline_kills_process() {
        let started = Instant::now();
        let err = run_with_timeout(shell("sleep 10"), "sh", Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program() {
        let err = run_with_timeout(
            Command::new("marksheet-no-such-program"),
            "marksheet-no-such-program",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }
}
