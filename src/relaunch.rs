//! Configuration refresh and process relaunch workflow.
//!
//! Used when the application must move to a new internal port or pick up
//! changed reverse-proxy settings without a full redeploy: refreshed
//! config files are pushed, every managed process is stopped, the
//! application is restarted from the process-manager configuration file,
//! the process list is persisted, and the result is verified.

use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::TargetConfig;
use crate::manager::ManagerCommands;
use crate::remote::{RemoteSession, SessionError};
use crate::report::Reporter;
use crate::sequence::{run_sequence, PlannedCommand, SequenceError, SequenceReport};
use crate::verify::{ProbeOutcome, Verifier, VerifyError};

/// Delay between stopping processes and starting replacements, giving
/// the old listeners time to release their ports.
const PORT_RELEASE_DELAY: Duration = Duration::from_secs(3);

/// Delay between starting the application and probing it.
const STARTUP_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Errors surfaced while relaunching the application.
#[derive(Debug, Error)]
pub enum RelaunchError {
    /// Raised when a refreshed configuration file cannot be read.
    #[error("failed to read {path}: {message}")]
    ReadConfig {
        /// Local file that could not be read.
        path: Utf8PathBuf,
        /// Operating system error description.
        message: String,
    },
    /// Raised when a refreshed configuration file cannot be transferred.
    #[error("failed to upload {what}: {source}")]
    Upload {
        /// Description of the artifact being transferred.
        what: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// Raised when a remote command cannot be issued.
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    /// Raised when the application fails to start from the manager
    /// configuration file.
    #[error("relaunch halted at step '{label}' (exit status {status_text})")]
    Halted {
        /// Label of the failed step.
        label: String,
        /// Exit status of the failed step, or `unknown`.
        status_text: String,
    },
    /// Raised when a verification probe cannot be executed.
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// Result of a completed relaunch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelaunchOutcome {
    /// Loopback probe result.
    pub loopback: ProbeOutcome,
    /// Public probe result.
    pub public: ProbeOutcome,
}

/// Executes the relaunch workflow against one open session.
#[derive(Debug)]
pub struct RelaunchOrchestrator<'a> {
    config: &'a TargetConfig,
    port_release: Duration,
    startup_settle: Duration,
}

impl<'a> RelaunchOrchestrator<'a> {
    /// Creates an orchestrator for the configured target.
    #[must_use]
    pub const fn new(config: &'a TargetConfig) -> Self {
        Self {
            config,
            port_release: PORT_RELEASE_DELAY,
            startup_settle: STARTUP_SETTLE_DELAY,
        }
    }

    /// Overrides the port release delay.
    ///
    /// This is primarily used by tests to keep scenarios fast.
    #[must_use]
    pub const fn with_port_release(mut self, delay: Duration) -> Self {
        self.port_release = delay;
        self
    }

    /// Overrides the startup settle delay.
    ///
    /// This is primarily used by tests to keep scenarios fast.
    #[must_use]
    pub const fn with_startup_settle(mut self, delay: Duration) -> Self {
        self.startup_settle = delay;
        self
    }

    /// Runs the full relaunch and returns the probe outcomes.
    ///
    /// Probe results are advisory: a rejected probe is reported but does
    /// not fail the relaunch.
    ///
    /// # Errors
    ///
    /// Returns [`RelaunchError`] when a configuration file cannot be
    /// read or transferred, when the start step fails, or when a probe
    /// cannot be executed.
    pub async fn execute<S, W>(
        &self,
        session: &S,
        source: &Utf8Path,
        reporter: &mut Reporter<W>,
    ) -> Result<RelaunchOutcome, RelaunchError>
    where
        S: RemoteSession,
        W: Write,
    {
        self.push_refreshed_configs(session, source, reporter).await?;

        let manager = ManagerCommands::new(self.config);
        let stop_plan = [
            PlannedCommand::tolerated("delete all managed processes", manager.delete_all()),
            PlannedCommand::tolerated(
                "kill stray application processes",
                manager.kill_stray(&self.config.app_script),
            ),
        ];
        run_sequence(session, &stop_plan, reporter).await?;
        pause(reporter, self.port_release, "ports to release").await;

        let start_plan = [PlannedCommand::halting(
            "start from the manager configuration",
            manager.start_config(&self.config.manager_config_file),
        )];
        ensure_completed(&run_sequence(session, &start_plan, reporter).await?)?;
        pause(reporter, self.startup_settle, "the application to start").await;

        let persist_plan = [
            PlannedCommand::tolerated("persist the process list", manager.save()),
            PlannedCommand::tolerated("process-manager status", manager.list()),
        ];
        run_sequence(session, &persist_plan, reporter).await?;

        let verifier = Verifier::new(self.config);
        let loopback = verifier.check_loopback(session, reporter).await?;
        let public = verifier.check_public(session, reporter).await?;

        let show_plan = [PlannedCommand::tolerated(
            "deployed rewrite rules",
            manager.in_workdir("cat .htaccess"),
        )];
        run_sequence(session, &show_plan, reporter).await?;

        Ok(RelaunchOutcome { loopback, public })
    }

    async fn push_refreshed_configs<S, W>(
        &self,
        session: &S,
        source: &Utf8Path,
        reporter: &mut Reporter<W>,
    ) -> Result<(), RelaunchError>
    where
        S: RemoteSession,
        W: Write,
    {
        reporter.step("push refreshed configuration files");
        let transfers = [
            (self.config.rewrite_file.as_str(), ".htaccess"),
            (self.config.proxy_file.as_str(), self.config.proxy_file.as_str()),
            (
                self.config.manager_config_file.as_str(),
                self.config.manager_config_file.as_str(),
            ),
        ];

        for (local_name, remote_name) in transfers {
            let local_path = source.join(local_name);
            if !local_path.is_file() {
                reporter.warn(&format!("{local_path} not found; skipping"));
                continue;
            }

            let bytes = std::fs::read(&local_path).map_err(|err| RelaunchError::ReadConfig {
                path: local_path.clone(),
                message: err.to_string(),
            })?;
            let remote_path = format!("{}/{remote_name}", self.config.remote_dir);
            session
                .upload(&bytes, &remote_path)
                .await
                .map_err(|source_err| RelaunchError::Upload {
                    what: format!("{local_name} to {remote_path}"),
                    source: source_err,
                })?;
            reporter.note(&format!("uploaded {local_name} as {remote_name}"));
        }

        Ok(())
    }
}

async fn pause<W: Write>(reporter: &mut Reporter<W>, delay: Duration, waiting_for: &str) {
    if delay.is_zero() {
        return;
    }
    reporter.note(&format!(
        "waiting {} seconds for {waiting_for}",
        delay.as_secs()
    ));
    sleep(delay).await;
}

/// Converts a halted sequence report into a [`RelaunchError::Halted`].
fn ensure_completed(report: &SequenceReport) -> Result<(), RelaunchError> {
    report.halting_step().map_or(Ok(()), |step| {
        Err(RelaunchError::Halted {
            label: step.label.clone(),
            status_text: step
                .output
                .exit_code
                .map_or_else(|| String::from("unknown"), |code| code.to_string()),
        })
    })
}
