//! Ordered remote command execution with per-step failure policy.
//!
//! A sequence runs strictly forward: each command completes (exit status
//! retrieved) before the next is issued. A failing step either halts the
//! remainder of the sequence or, when explicitly marked as tolerated,
//! logs a warning and lets execution continue. The policy lives on the
//! step itself; it is never inferred from the command text.

use std::io::Write;

use thiserror::Error;

use crate::remote::{ExecOutput, RemoteSession, SessionError};
use crate::report::Reporter;

/// What to do when a step exits non-zero or loses its exit status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailurePolicy {
    /// Skip every remaining step and report the halt.
    Halt,
    /// Warn and continue with the next step.
    ContinueWithWarning,
}

/// One step of a command sequence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlannedCommand {
    /// Human-readable description of the step.
    pub label: String,
    /// Shell command executed on the remote host.
    pub command: String,
    /// Policy applied when the command fails.
    pub on_failure: FailurePolicy,
}

impl PlannedCommand {
    /// Creates a step that halts the sequence on failure.
    #[must_use]
    pub fn halting(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            on_failure: FailurePolicy::Halt,
        }
    }

    /// Creates a step whose failure is tolerated with a warning.
    #[must_use]
    pub fn tolerated(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            on_failure: FailurePolicy::ContinueWithWarning,
        }
    }
}

/// Record of one executed step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepReport {
    /// Label of the step that ran.
    pub label: String,
    /// Command that was executed.
    pub command: String,
    /// Captured result of the command.
    pub output: ExecOutput,
}

/// Result of driving a sequence to completion or halt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SequenceReport {
    /// Steps that were executed, in order.
    pub steps: Vec<StepReport>,
    /// Index of the step that halted the sequence, when one did.
    pub halted_at: Option<usize>,
}

impl SequenceReport {
    /// Returns `true` when every step ran and none halted the sequence.
    #[must_use]
    pub const fn completed(&self) -> bool {
        self.halted_at.is_none()
    }

    /// Returns the step that halted the sequence, when one did.
    #[must_use]
    pub fn halting_step(&self) -> Option<&StepReport> {
        self.halted_at.and_then(|_| self.steps.last())
    }
}

/// Errors raised while driving a sequence.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// Raised when a step cannot be executed at all, as opposed to
    /// executing and failing.
    #[error("step '{label}' failed to execute: {source}")]
    Transport {
        /// Label of the step that could not be executed.
        label: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
}

/// Runs `plan` strictly in order against `session`, reporting each step.
///
/// A step is successful only when its exit status is exactly zero; a
/// missing exit status counts as failure. The returned report records
/// every executed step and, when a halting step failed, the index at
/// which the sequence stopped.
///
/// # Errors
///
/// Returns [`SequenceError::Transport`] when a command cannot be issued;
/// remote commands that execute and fail are reported through the
/// [`SequenceReport`] instead.
pub async fn run_sequence<S, W>(
    session: &S,
    plan: &[PlannedCommand],
    reporter: &mut Reporter<W>,
) -> Result<SequenceReport, SequenceError>
where
    S: RemoteSession,
    W: Write,
{
    let mut steps = Vec::with_capacity(plan.len());
    for (index, planned) in plan.iter().enumerate() {
        reporter.step(&planned.label);
        reporter.command(&planned.command);
        let output = session
            .exec(&planned.command)
            .await
            .map_err(|source| SequenceError::Transport {
                label: planned.label.clone(),
                source,
            })?;
        reporter.output(&output);

        let success = output.is_success();
        steps.push(StepReport {
            label: planned.label.clone(),
            command: planned.command.clone(),
            output,
        });

        if !success {
            match planned.on_failure {
                FailurePolicy::ContinueWithWarning => {
                    reporter.warn(&format!("'{}' failed; continuing", planned.label));
                }
                FailurePolicy::Halt => {
                    reporter.warn(&format!(
                        "'{}' failed; skipping the remaining steps",
                        planned.label
                    ));
                    return Ok(SequenceReport {
                        steps,
                        halted_at: Some(index),
                    });
                }
            }
        }
    }

    Ok(SequenceReport {
        steps,
        halted_at: None,
    })
}
