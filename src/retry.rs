//! Bounded retry around a `CommandExecutor`

use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::runner::{CommandExecutor, CommandOutcome, FailureKind};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fixed-delay retry policy. There is no backoff growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Run `command` until it succeeds, a non-retryable failure is seen, or
    /// the attempts are exhausted. Returns the last failure's output when no
    /// attempt succeeds.
    pub fn run(
        &self,
        executor: &dyn CommandExecutor,
        command: &[String],
        timeout: Duration,
    ) -> CommandOutcome {
        self.run_with_attempts(executor, command, timeout, self.max_attempts)
    }

    /// Like `run`, overriding the attempt budget for this call only
    pub fn run_with_attempts(
        &self,
        executor: &dyn CommandExecutor,
        command: &[String],
        timeout: Duration,
        max_attempts: u32,
    ) -> CommandOutcome {
        let max_attempts = max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = executor.run(command, timeout);
            if outcome.success {
                if attempt > 1 {
                    info!("Command '{}' succeeded on attempt {}", command.join(" "), attempt);
                }
                return outcome;
            }

            warn!("Attempt {}/{} failed: {}", attempt, max_attempts, outcome.output.trim());
            last_error = outcome.output;

            let kind = FailureKind::classify(&last_error);
            if !kind.is_retryable() {
                warn!("Not retrying '{}' after {:?} failure", command.join(" "), kind);
                break;
            }

            if attempt < max_attempts {
                thread::sleep(self.delay);
            }
        }

        error!("Command '{}' failed: {}", command.join(" "), last_error.trim());
        CommandOutcome::failure(last_error)
    }
}
