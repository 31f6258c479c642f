//! Elevated command runner
//!
//! Every external command goes through the elevation program (`pkexec` by
//! default) and runs under a process-wide lock: neither the elevation layer
//! nor `wg`/`wg-quick` tolerate concurrent invocation.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[cfg(test)]
use mockall::automock;

/// Serializes external command execution across every runner in the process
static COMMAND_LOCK: Mutex<()> = Mutex::new(());

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Prefix of the failure message produced when a command hits its deadline
pub const TIMEOUT_MARKER: &str = "Timeout";

/// Result of a single command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    /// Standard output on success; standard error (or the timeout/spawn
    /// message) on failure
    pub output: String,
}

impl CommandOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into() }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into() }
    }
}

/// Coarse classification of a failed command's error text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The elevation prompt was dismissed or the user is not authorized
    AuthorizationDenied,
    /// The program (or the elevation program) could not be found
    ExecutableNotFound,
    PermissionDenied,
    Timeout,
    Other,
}

impl FailureKind {
    /// Classify failure text. Case-insensitive except for the timeout marker,
    /// which is produced by this module.
    pub fn classify(output: &str) -> Self {
        if output.starts_with(TIMEOUT_MARKER) {
            return Self::Timeout;
        }

        let lower = output.to_lowercase();
        if lower.contains("authentication canceled")
            || lower.contains("authentication cancelled")
            || lower.contains("not authorized")
        {
            Self::AuthorizationDenied
        } else if lower.contains("not found") || lower.contains("no such file or directory") {
            Self::ExecutableNotFound
        } else if lower.contains("permission denied") {
            Self::PermissionDenied
        } else {
            Self::Other
        }
    }

    /// Whether repeating the same command could change the outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Other)
    }
}

/// Seam between the orchestrator and the operating system
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` (program followed by its arguments) with a hard deadline
    fn run(&self, command: &[String], timeout: Duration) -> CommandOutcome;
}

/// Runs commands through an elevation program such as `pkexec`
#[derive(Debug, Clone)]
pub struct ElevatedRunner {
    elevate: String,
}

impl ElevatedRunner {
    pub fn new(elevate: impl Into<String>) -> Self {
        Self { elevate: elevate.into() }
    }

    /// Name of the elevation program prepended to every command
    pub fn elevate_command(&self) -> &str {
        &self.elevate
    }

    fn execute(&self, command: &[String], timeout: Duration) -> CommandOutcome {
        let cmdline = command.join(" ");
        debug!("Running command: {} {}", self.elevate, cmdline);

        let mut child = match Command::new(&self.elevate)
            .args(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start '{} {}': {}", self.elevate, cmdline, e);
                let reason = if e.kind() == std::io::ErrorKind::NotFound {
                    "executable not found".to_string()
                } else {
                    e.to_string()
                };
                return CommandOutcome::failure(format!("Failed to start {}: {}", self.elevate, reason));
            }
        };

        // Drain the pipes on their own threads so a chatty child cannot block
        // on a full pipe while we wait for it.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let started = Instant::now();
        let deadline = started + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    error!("Command timed out after {:?}: {}", timeout, cmdline);
                    return CommandOutcome::failure(timeout_message(timeout, &cmdline));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    error!("Failed to wait for '{}': {}", cmdline, e);
                    return CommandOutcome::failure(format!("Failed to wait for {}: {}", cmdline, e));
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        // A background process started by the command can inherit the pipes
        // and hold them open long after the command itself has exited
        let (Some(stdout), Some(stderr)) = (drain_reader(stdout, deadline), drain_reader(stderr, deadline)) else {
            error!("Output of '{}' still open after {:?}, abandoning it", cmdline, timeout);
            return CommandOutcome::failure(timeout_message(timeout, &cmdline));
        };

        if status.success() {
            debug!(command = %cmdline, elapsed_ms, "Command succeeded");
            return CommandOutcome::success(stdout);
        }

        let code = status.code();
        match FailureKind::classify(&stderr) {
            FailureKind::AuthorizationDenied => {
                warn!(command = %cmdline, ?code, elapsed_ms, "Authorization cancelled or denied");
            }
            FailureKind::ExecutableNotFound => {
                error!(command = %cmdline, ?code, "Command not found: {}", stderr.trim());
            }
            FailureKind::PermissionDenied => {
                error!(command = %cmdline, ?code, "Permission denied: {}", stderr.trim());
            }
            FailureKind::Timeout | FailureKind::Other => {
                error!(command = %cmdline, ?code, elapsed_ms, "Command failed: {}", stderr.trim());
            }
        }

        if stderr.trim().is_empty() {
            let fallback = match code {
                Some(code) => format!("{} exited with code {}", cmdline, code),
                None => format!("{} terminated by signal", cmdline),
            };
            return CommandOutcome::failure(fallback);
        }
        CommandOutcome::failure(stderr)
    }
}

impl CommandExecutor for ElevatedRunner {
    fn run(&self, command: &[String], timeout: Duration) -> CommandOutcome {
        let _guard = COMMAND_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.execute(command, timeout)
    }
}

fn timeout_message(timeout: Duration, cmdline: &str) -> String {
    format!("{} ({} seconds): {}", TIMEOUT_MARKER, timeout.as_secs_f32(), cmdline)
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Collect a pipe's contents, waiting no later than `deadline`. `None` when
/// the pipe is still open at the deadline.
fn drain_reader(reader: Option<mpsc::Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(reader) = reader else {
        return Some(String::new());
    };
    match reader.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
    }
}

/// Build an owned command line from string literals
pub fn command_line(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // `env` stands in for the elevation program: `env <cmd>` just runs <cmd>.
    fn runner() -> ElevatedRunner {
        ElevatedRunner::new("env")
    }

    #[test]
    fn test_classify_failures() {
        assert_eq!(
            FailureKind::classify("Error executing command as another user: Not authorized"),
            FailureKind::AuthorizationDenied
        );
        assert_eq!(
            FailureKind::classify("Authentication canceled by user"),
            FailureKind::AuthorizationDenied
        );
        assert_eq!(FailureKind::classify("bash: wg: command not found"), FailureKind::ExecutableNotFound);
        assert_eq!(FailureKind::classify("Permission denied"), FailureKind::PermissionDenied);
        assert_eq!(FailureKind::classify("Timeout (30 seconds): wg show"), FailureKind::Timeout);
        assert_eq!(FailureKind::classify("RTNETLINK answers: File exists"), FailureKind::Other);
    }

    #[test]
    fn test_only_other_is_retryable() {
        assert!(FailureKind::Other.is_retryable());
        assert!(!FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::PermissionDenied.is_retryable());
        assert!(!FailureKind::ExecutableNotFound.is_retryable());
        assert!(!FailureKind::AuthorizationDenied.is_retryable());
    }

    #[test]
    fn test_success_returns_stdout() {
        let outcome = runner().run(&command_line(&["echo", "interface: wg0"]), Duration::from_secs(5));
        assert!(outcome.success);
        assert_eq!(outcome.output.trim(), "interface: wg0");
    }

    #[test]
    fn test_failure_returns_stderr() {
        let outcome = runner().run(
            &command_line(&["sh", "-c", "echo out; echo 'Permission denied' >&2; exit 1"]),
            Duration::from_secs(5),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.output.trim(), "Permission denied");
    }

    #[test]
    fn test_failure_without_stderr_reports_exit_code() {
        let outcome = runner().run(&command_line(&["sh", "-c", "exit 3"]), Duration::from_secs(5));
        assert!(!outcome.success);
        assert!(outcome.output.contains("code 3"));
    }

    #[test]
    #[serial]
    fn test_timeout_kills_command() {
        let started = Instant::now();
        let outcome = runner().run(&command_line(&["sleep", "5"]), Duration::from_millis(200));
        assert!(!outcome.success);
        assert_eq!(FailureKind::classify(&outcome.output), FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    #[serial]
    fn test_timeout_covers_inherited_output_pipes() {
        // The shell exits at once, but the backgrounded sleep keeps stdout open
        let started = Instant::now();
        let outcome = runner().run(
            &command_line(&["sh", "-c", "sleep 3 & echo up"]),
            Duration::from_millis(500),
        );
        assert!(!outcome.success);
        assert_eq!(FailureKind::classify(&outcome.output), FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn test_commands_never_overlap() {
        let started = Instant::now();
        let handles: Vec<_> = (0..2)
            .map(|_| {
                thread::spawn(|| {
                    // Separate runner instances still share the process-wide lock
                    let runner = ElevatedRunner::new("env");
                    let begin = Instant::now();
                    let outcome = runner.run(&command_line(&["sh", "-c", "sleep 0.3"]), Duration::from_secs(5));
                    (begin, Instant::now(), outcome.success)
                })
            })
            .collect();
        let spans: Vec<(Instant, Instant, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(spans.iter().all(|(_, _, success)| *success));
        assert!(started.elapsed() >= Duration::from_millis(600));
        let (first_end, second_end) = (spans[0].1, spans[1].1);
        let gap = if first_end > second_end { first_end - second_end } else { second_end - first_end };
        assert!(gap >= Duration::from_millis(250), "commands ran concurrently");
    }

    #[test]
    fn test_missing_elevation_program() {
        let outcome = ElevatedRunner::new("wgctl-no-such-elevator")
            .run(&command_line(&["wg", "show"]), Duration::from_secs(1));
        assert!(!outcome.success);
        assert!(outcome.output.contains("wgctl-no-such-elevator"));
        assert_eq!(FailureKind::classify(&outcome.output), FailureKind::ExecutableNotFound);
    }
}
