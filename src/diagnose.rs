//! Remote state inspection workflow.
//!
//! Runs a fixed list of read-only commands against the deployment
//! directory and echoes their output. Every step tolerates failure: the
//! point of a diagnosis is to see as much as possible, not to stop at
//! the first broken probe.

use std::io::Write;

use thiserror::Error;

use crate::config::TargetConfig;
use crate::manager::ManagerCommands;
use crate::remote::RemoteSession;
use crate::report::Reporter;
use crate::sequence::{run_sequence, PlannedCommand, SequenceError, SequenceReport};

/// Lines of process-manager log tailed during a diagnosis.
pub const DIAGNOSTIC_LOG_LINES: u32 = 20;

/// Errors surfaced while diagnosing the remote host.
#[derive(Debug, Error)]
pub enum DiagnoseError {
    /// Raised when an inspection command cannot be issued.
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Executes the inspection workflow against one open session.
#[derive(Debug)]
pub struct DiagnoseRunner<'a> {
    config: &'a TargetConfig,
}

impl<'a> DiagnoseRunner<'a> {
    /// Creates a runner for the configured target.
    #[must_use]
    pub const fn new(config: &'a TargetConfig) -> Self {
        Self { config }
    }

    /// Runs every inspection command and returns the collected report.
    ///
    /// # Errors
    ///
    /// Returns [`DiagnoseError::Sequence`] when a command cannot be
    /// issued; commands that execute and fail are tolerated and appear
    /// in the report.
    pub async fn execute<S, W>(
        &self,
        session: &S,
        reporter: &mut Reporter<W>,
    ) -> Result<SequenceReport, DiagnoseError>
    where
        S: RemoteSession,
        W: Write,
    {
        let manager = ManagerCommands::new(self.config);
        let report = run_sequence(session, &self.plan(&manager), reporter).await?;
        Ok(report)
    }

    fn plan(&self, manager: &ManagerCommands) -> Vec<PlannedCommand> {
        vec![
            PlannedCommand::tolerated("process-manager status", manager.list()),
            PlannedCommand::tolerated(
                "recent application logs",
                manager.logs(&self.config.app_name, DIAGNOSTIC_LOG_LINES),
            ),
            PlannedCommand::tolerated(
                "loopback response",
                manager.in_workdir(&format!(
                    "curl -v http://127.0.0.1:{}/",
                    self.config.app_port
                )),
            ),
            PlannedCommand::tolerated("deployed rewrite rules", manager.in_workdir("cat .htaccess")),
            PlannedCommand::tolerated("deployment directory listing", manager.in_workdir("ls -la")),
        ]
    }
}
