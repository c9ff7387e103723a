//! Phase executor - drives one phase through wait, attempts and handler dispatch
//!
//! Each execution walks an explicit state machine:
//!
//! ```text
//! Pending -> Waiting -> Attempting -> Succeeded -> HandlerDispatched
//!               |          |  ^
//!               |          +--+ (retry)
//!               +----------+-----------> Failed -> HandlerDispatched
//! ```
//!
//! A failed phase is a value, not an error. Only malformed configuration or a
//! broken transition table produce `Err`.

use crate::cancel::CancelToken;
use crate::context::{AlwaysSucceed, AttemptOutcome, AttemptPolicy, LogNotifier, NotificationSink};
use crate::error::{Error, Result};
use crate::types::{ExecutionResult, Labels, Phase, PhaseStatus};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of one phase execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Pending,
    Waiting,
    Attempting,
    Succeeded,
    Failed,
    HandlerDispatched,
}

impl PhaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::Attempting => "attempting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::HandlerDispatched => "handler_dispatched",
        }
    }

    fn allowed_transitions(self) -> &'static [PhaseState] {
        match self {
            Self::Pending => &[Self::Waiting],
            // Cancellation during the wait fails the phase without an attempt
            Self::Waiting => &[Self::Attempting, Self::Failed],
            Self::Attempting => &[Self::Attempting, Self::Succeeded, Self::Failed],
            Self::Succeeded | Self::Failed => &[Self::HandlerDispatched],
            Self::HandlerDispatched => &[],
        }
    }

    pub fn can_transition(self, to: PhaseState) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Check a transition against the table
    pub fn validate_transition(self, to: PhaseState) -> Result<()> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable bookkeeping of a single execution
struct Run {
    state: PhaseState,
    logs: Vec<String>,
    attempts: u32,
    timed_out: bool,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PhaseState::Pending,
            logs: Vec::new(),
            attempts: 0,
            timed_out: false,
        }
    }

    fn transition(&mut self, to: PhaseState) -> Result<()> {
        self.state.validate_transition(to)?;
        log::trace!("phase state {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }

    fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }
}

/// Executes phases with injected attempt and notification collaborators
///
/// The executor holds no per-phase state, so one instance may run many
/// phases concurrently.
#[derive(Clone)]
pub struct PhaseExecutor {
    policy: Arc<dyn AttemptPolicy>,
    notifier: Arc<dyn NotificationSink>,
}

impl Default for PhaseExecutor {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysSucceed), Arc::new(LogNotifier))
    }
}

impl fmt::Debug for PhaseExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseExecutor").finish_non_exhaustive()
    }
}

impl PhaseExecutor {
    pub fn new(policy: Arc<dyn AttemptPolicy>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { policy, notifier }
    }

    /// Replace the attempt policy
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn AttemptPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the notification sink
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Execute one phase
    ///
    /// Timeout and retry configuration are parsed before anything waits, so
    /// a malformed value fails fast. Cancellation is observed during the
    /// wait and before each attempt; it yields a `TimedOut` result and
    /// dispatches the failure handler.
    ///
    /// # Errors
    /// - [`Error::InvalidTimeout`] / [`Error::InvalidRetry`] for malformed configuration
    /// - [`Error::InvalidTransition`] if the state machine is driven out of table
    pub fn execute(&self, phase: &Phase, cancel: &CancelToken) -> Result<ExecutionResult> {
        let wait = phase.spec.wait_duration()?;
        let max_attempts = phase.spec.retry.max_attempts(&phase.id)?;

        let message = format!("Executing phase {}", phase.display_name());
        log::debug!("{message}");

        let mut run = Run::new();
        run.log(message.clone());
        run.transition(PhaseState::Waiting)?;

        if !wait.is_zero() {
            run.log(format!(
                "Sleeping for timeout: {} seconds",
                wait.as_secs_f64()
            ));
            if cancel.sleep(wait).is_err() {
                run.timed_out = true;
                run.log("Cancelled while waiting");
            }
        }

        let succeeded = if run.timed_out {
            false
        } else {
            self.attempt_loop(phase, max_attempts, cancel, &mut run)?
        };

        if succeeded {
            run.transition(PhaseState::Succeeded)?;
            run.log("Phase execution succeeded");
        } else {
            run.transition(PhaseState::Failed)?;
            run.log(if run.timed_out {
                "Phase execution timed out"
            } else {
                "Phase execution failed"
            });
        }

        let labels = self.dispatch_handler(phase, succeeded, &mut run)?;

        let status = match (succeeded, run.timed_out) {
            (true, _) => PhaseStatus::Succeeded,
            (false, true) => PhaseStatus::TimedOut,
            (false, false) => PhaseStatus::Failed,
        };
        log::info!(
            "Phase {} {} after {} attempt(s)",
            phase.id,
            status.as_str(),
            run.attempts
        );

        Ok(ExecutionResult {
            success: succeeded,
            status,
            message,
            logs: run.logs,
            labels,
            attempts: run.attempts,
        })
    }

    /// Up to `max_attempts` attempts, stopping at the first success
    fn attempt_loop(
        &self,
        phase: &Phase,
        max_attempts: u32,
        cancel: &CancelToken,
        run: &mut Run,
    ) -> Result<bool> {
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                run.timed_out = true;
                run.log(format!("Cancelled before attempt {attempt} of {max_attempts}"));
                return Ok(false);
            }

            run.transition(PhaseState::Attempting)?;
            run.attempts = attempt;
            run.log(format!("Attempt {attempt} of {max_attempts}"));

            match self.policy.attempt(phase, attempt) {
                AttemptOutcome::Succeeded => return Ok(true),
                AttemptOutcome::Failed { reason } => {
                    log::debug!("Phase {} attempt {attempt} failed: {reason}", phase.id);
                    run.log(format!("Attempt {attempt} failed: {reason}"));
                }
            }
        }
        Ok(false)
    }

    /// Append handler output to the log and return the handler labels
    fn dispatch_handler(&self, phase: &Phase, succeeded: bool, run: &mut Run) -> Result<Labels> {
        let labels = match phase.spec.handler(succeeded) {
            Some(handler) => {
                run.logs.extend(handler.message.iter().cloned());

                if !handler.notify.is_empty() {
                    run.log(format!("Notify targets: {}", handler.notify_summary()));
                    let outcome = if succeeded { "succeeded" } else { "failed" };
                    let text = format!("Phase {} {outcome}", phase.display_name());
                    for (channel, target) in &handler.notify {
                        let target = match target {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        self.notifier.notify(channel, &target, &text);
                    }
                }

                handler.labels.clone()
            }
            None => Labels::new(),
        };

        run.transition(PhaseState::HandlerDispatched)?;
        Ok(labels)
    }
}
