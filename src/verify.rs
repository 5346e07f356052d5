//! Post-deployment HTTP verification.
//!
//! Probes run on the remote host through its command-line HTTP client and
//! read back only the numeric status code. Verification is advisory: a
//! rejected probe dumps diagnostics for the operator but never retries,
//! rolls back, or changes the process exit code.

use std::io::Write;

use shell_escape::unix::escape;
use thiserror::Error;

use crate::config::TargetConfig;
use crate::manager::ManagerCommands;
use crate::remote::{RemoteSession, SessionError};
use crate::report::Reporter;

/// HTTP status codes treated as a healthy response.
pub const ACCEPTED_STATUS_CODES: &[u16] = &[200, 302];

/// Lines of process-manager log tailed when the loopback probe is
/// rejected.
pub const REJECTION_LOG_LINES: u32 = 30;

/// Result of one HTTP probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProbeOutcome {
    /// Parsed HTTP status code, when the probe produced one.
    pub status: Option<u16>,
    /// Whether the status is in [`ACCEPTED_STATUS_CODES`].
    pub accepted: bool,
}

/// Errors raised while verifying a deployment.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Raised when a probe or log dump cannot be executed.
    #[error("verification probe failed to execute: {0}")]
    Transport(#[from] SessionError),
}

/// Issues loopback and public probes over the remote session.
#[derive(Debug)]
pub struct Verifier<'a> {
    config: &'a TargetConfig,
    manager: ManagerCommands,
}

impl<'a> Verifier<'a> {
    /// Creates a verifier for the configured target.
    #[must_use]
    pub fn new(config: &'a TargetConfig) -> Self {
        Self {
            config,
            manager: ManagerCommands::new(config),
        }
    }

    /// Probes the application on the loopback interface. A rejected
    /// probe dumps a bounded tail of the process-manager logs.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Transport`] when the probe or the log dump
    /// cannot be executed.
    pub async fn check_loopback<S, W>(
        &self,
        session: &S,
        reporter: &mut Reporter<W>,
    ) -> Result<ProbeOutcome, VerifyError>
    where
        S: RemoteSession,
        W: Write,
    {
        let url = format!("http://127.0.0.1:{}/", self.config.app_port);
        reporter.step(&format!("probe the application on port {}", self.config.app_port));
        let output = session.exec(&probe_command(&url)).await?;
        let outcome = classify(&output.stdout);
        report_status(reporter, "loopback", outcome);

        if !outcome.accepted {
            reporter.warn("loopback probe rejected; dumping recent process-manager logs");
            let logs = session
                .exec(&self.manager.logs(&self.config.app_name, REJECTION_LOG_LINES))
                .await?;
            reporter.output(&logs);
        }

        Ok(outcome)
    }

    /// Probes the public URL. Advisory only; a rejected probe is
    /// reported but triggers no diagnostics — fresh deployments can lag
    /// behind the public edge.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Transport`] when the probe cannot be
    /// executed.
    pub async fn check_public<S, W>(
        &self,
        session: &S,
        reporter: &mut Reporter<W>,
    ) -> Result<ProbeOutcome, VerifyError>
    where
        S: RemoteSession,
        W: Write,
    {
        reporter.step(&format!("probe the public URL {}", self.config.public_url));
        let output = session.exec(&probe_command(&self.config.public_url)).await?;
        let outcome = classify(&output.stdout);
        report_status(reporter, "public", outcome);

        if !outcome.accepted {
            reporter.warn(
                "public probe rejected; the edge may need time to pick up the new process",
            );
        }

        Ok(outcome)
    }
}

/// Builds the remote probe command for `url`, printing only the status
/// code.
#[must_use]
pub fn probe_command(url: &str) -> String {
    format!(
        "curl -s -o /dev/null -w '%{{http_code}}' {}",
        escape(url.into())
    )
}

/// Classifies probe output against the acceptance set. Unparseable
/// output is rejected with no status.
#[must_use]
pub fn classify(stdout: &str) -> ProbeOutcome {
    let status = stdout.trim().parse::<u16>().ok();
    let accepted = status.is_some_and(|code| ACCEPTED_STATUS_CODES.contains(&code));
    ProbeOutcome { status, accepted }
}

fn report_status<W: Write>(reporter: &mut Reporter<W>, which: &str, outcome: ProbeOutcome) {
    let status_text = outcome
        .status
        .map_or_else(|| String::from("unreadable"), |code| code.to_string());
    let verdict = if outcome.accepted { "ok" } else { "rejected" };
    reporter.note(&format!("{which} probe returned {status_text} ({verdict})"));
}
