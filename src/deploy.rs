//! End-to-end deployment workflow.
//!
//! Packages the application, uploads it with the rewrite rules, unpacks
//! and installs on the remote host, restarts the managed process, and
//! verifies the result. The local package is removed on every path,
//! successful or not; the caller owns the session and closes it
//! unconditionally.

use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;
use tokio::time::sleep;

use crate::archive::{ArchiveBuilder, ArchiveError};
use crate::config::TargetConfig;
use crate::manager::ManagerCommands;
use crate::remote::{RemoteSession, SessionError};
use crate::report::Reporter;
use crate::sequence::{run_sequence, PlannedCommand, SequenceError, SequenceReport};
use crate::verify::{ProbeOutcome, Verifier, VerifyError};

/// Delay between starting the application and probing it.
const STARTUP_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Errors surfaced while performing a deployment.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Raised when the deployment package cannot be built.
    #[error("failed to build the deployment package: {0}")]
    Package(#[from] ArchiveError),
    /// Raised when the built package cannot be read back for upload.
    #[error("failed to read the package at {path}: {message}")]
    ReadPackage {
        /// Local package path.
        path: Utf8PathBuf,
        /// Operating system error description.
        message: String,
    },
    /// Raised when an artifact cannot be transferred.
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
    /// Raised when a halting step of the deployment sequence fails.
    #[error("deployment halted at step '{label}' (exit status {status_text})")]
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

/// Result of a completed deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOutcome {
    /// Report of the remote command sequence.
    pub sequence: SequenceReport,
    /// Loopback probe result.
    pub loopback: ProbeOutcome,
    /// Public probe result.
    pub public: ProbeOutcome,
}

/// Executes the deployment workflow against one open session.
#[derive(Debug)]
pub struct DeployOrchestrator<'a> {
    config: &'a TargetConfig,
    startup_settle: Duration,
}

impl<'a> DeployOrchestrator<'a> {
    /// Creates an orchestrator for the configured target.
    #[must_use]
    pub const fn new(config: &'a TargetConfig) -> Self {
        Self {
            config,
            startup_settle: STARTUP_SETTLE_DELAY,
        }
    }

    /// Overrides the startup settle delay.
    ///
    /// This is primarily used by tests to keep scenarios fast.
    #[must_use]
    pub const fn with_startup_settle(mut self, delay: Duration) -> Self {
        self.startup_settle = delay;
        self
    }

    /// Runs the full deployment and returns the collected outcome.
    ///
    /// Probe results are advisory: a rejected probe is reported but does
    /// not fail the deployment. The local package is removed before this
    /// method returns, on success and failure alike.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when packaging, transfer, a halting
    /// remote step, or probe execution fails.
    pub async fn execute<S, W>(
        &self,
        session: &S,
        source: &Utf8Path,
        reporter: &mut Reporter<W>,
    ) -> Result<DeployOutcome, DeployError>
    where
        S: RemoteSession,
        W: Write,
    {
        reporter.step("build the deployment package");
        let archive_path = source.join(self.config.archive_name.as_str());
        let built = ArchiveBuilder::new()
            .exclude_name(self.config.archive_name.as_str())
            .exclude_name(self.config.rewrite_file.as_str())
            .build(source, &archive_path);
        let summary = match built {
            Ok(summary) => summary,
            Err(err) => {
                remove_package(&archive_path, reporter);
                return Err(DeployError::Package(err));
            }
        };
        reporter.note(&format!(
            "packaged {} files into {}",
            summary.file_count, summary.path
        ));

        let result = self
            .run_with_package(session, source, &archive_path, reporter)
            .await;
        remove_package(&archive_path, reporter);
        result
    }

    async fn run_with_package<S, W>(
        &self,
        session: &S,
        source: &Utf8Path,
        archive_path: &Utf8Path,
        reporter: &mut Reporter<W>,
    ) -> Result<DeployOutcome, DeployError>
    where
        S: RemoteSession,
        W: Write,
    {
        self.upload_artifacts(session, source, archive_path, reporter)
            .await?;

        let manager = ManagerCommands::new(self.config);
        let sequence = run_sequence(session, &self.plan(&manager), reporter).await?;
        ensure_completed(&sequence)?;

        if !self.startup_settle.is_zero() {
            reporter.note(&format!(
                "waiting {} seconds for the application to settle",
                self.startup_settle.as_secs()
            ));
            sleep(self.startup_settle).await;
        }

        let verifier = Verifier::new(self.config);
        let loopback = verifier.check_loopback(session, reporter).await?;
        let public = verifier.check_public(session, reporter).await?;
        reporter.note(&format!(
            "deployment complete; the application should be reachable at {}",
            self.config.public_url
        ));

        Ok(DeployOutcome {
            sequence,
            loopback,
            public,
        })
    }

    async fn upload_artifacts<S, W>(
        &self,
        session: &S,
        source: &Utf8Path,
        archive_path: &Utf8Path,
        reporter: &mut Reporter<W>,
    ) -> Result<(), DeployError>
    where
        S: RemoteSession,
        W: Write,
    {
        let prepare = [PlannedCommand::halting(
            "create the deployment directory",
            format!("mkdir -p {}", escape(self.config.remote_dir.as_str().into())),
        )];
        ensure_completed(&run_sequence(session, &prepare, reporter).await?)?;

        reporter.step("upload the deployment package");
        let bytes = std::fs::read(archive_path).map_err(|err| DeployError::ReadPackage {
            path: archive_path.to_path_buf(),
            message: err.to_string(),
        })?;
        let remote_archive = format!("{}/{}", self.config.remote_dir, self.config.archive_name);
        session
            .upload(&bytes, &remote_archive)
            .await
            .map_err(|source_err| DeployError::Upload {
                what: format!("the deployment package to {remote_archive}"),
                source: source_err,
            })?;
        reporter.note(&format!("uploaded {} bytes", bytes.len()));

        let rewrite_source = source.join(self.config.rewrite_file.as_str());
        if rewrite_source.is_file() {
            let rewrite_bytes =
                std::fs::read(&rewrite_source).map_err(|err| DeployError::ReadPackage {
                    path: rewrite_source.clone(),
                    message: err.to_string(),
                })?;
            let remote_rewrite = format!("{}/.htaccess", self.config.remote_dir);
            session
                .upload(&rewrite_bytes, &remote_rewrite)
                .await
                .map_err(|source_err| DeployError::Upload {
                    what: format!("rewrite rules to {remote_rewrite}"),
                    source: source_err,
                })?;
            reporter.note("uploaded rewrite rules as .htaccess");
        } else {
            reporter.warn(&format!(
                "rewrite file {rewrite_source} not found; skipping"
            ));
        }

        Ok(())
    }

    fn plan(&self, manager: &ManagerCommands) -> Vec<PlannedCommand> {
        let archive_ref = escape(self.config.archive_name.as_str().into()).into_owned();
        vec![
            PlannedCommand::halting(
                "unpack the package",
                manager.in_workdir(&format!("unzip -o {archive_ref}")),
            ),
            PlannedCommand::halting(
                "remove the uploaded package",
                manager.in_workdir(&format!("rm {archive_ref}")),
            ),
            PlannedCommand::halting(
                "install production dependencies",
                manager.with_env("npm install --production"),
            ),
            PlannedCommand::halting(
                "install the process manager",
                manager.with_env("npm install pm2"),
            ),
            PlannedCommand::tolerated(
                "stop the previous process",
                manager.delete(&self.config.app_name),
            ),
            PlannedCommand::halting(
                "start the application",
                manager.start_script(
                    &self.config.app_script,
                    &self.config.app_name,
                    self.config.app_port,
                ),
            ),
        ]
    }
}

/// Converts a halted sequence report into a [`DeployError::Halted`].
fn ensure_completed(report: &SequenceReport) -> Result<(), DeployError> {
    report.halting_step().map_or(Ok(()), |step| {
        Err(DeployError::Halted {
            label: step.label.clone(),
            status_text: step
                .output
                .exit_code
                .map_or_else(|| String::from("unknown"), |code| code.to_string()),
        })
    })
}

/// Best-effort removal of the local package; failures are reported as
/// warnings because the deployment outcome is already decided.
fn remove_package<W: Write>(archive_path: &Utf8Path, reporter: &mut Reporter<W>) {
    if !archive_path.exists() {
        return;
    }
    match std::fs::remove_file(archive_path) {
        Ok(()) => reporter.note(&format!("removed local package {archive_path}")),
        Err(err) => reporter.warn(&format!(
            "failed to remove local package {archive_path}: {err}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> TargetConfig {
        TargetConfig {
            host: String::from("host.example"),
            port: 22,
            username: String::from("account"),
            password: String::from("secret"),
            remote_dir: String::from("/srv/app"),
            public_url: String::from("https://app.example/"),
            app_name: String::from("app"),
            app_script: String::from("server.js"),
            app_port: 3006,
            manager_bin: String::from("./node_modules/.bin/pm2"),
            manager_home: None,
            node_bin_dir: None,
            archive_name: String::from("deploy_package.zip"),
            rewrite_file: String::from("site.htaccess"),
            proxy_file: String::from("proxy.php"),
            manager_config_file: String::from("ecosystem.config.js"),
        }
    }

    #[rstest]
    fn plan_orders_unpack_install_restart(config: TargetConfig) {
        let orchestrator = DeployOrchestrator::new(&config);
        let manager = ManagerCommands::new(&config);
        let plan = orchestrator.plan(&manager);

        let commands: Vec<&str> = plan.iter().map(|step| step.command.as_str()).collect();
        assert_eq!(
            commands,
            vec![
                "cd /srv/app && unzip -o deploy_package.zip",
                "cd /srv/app && rm deploy_package.zip",
                "cd /srv/app && npm install --production",
                "cd /srv/app && npm install pm2",
                "cd /srv/app && ./node_modules/.bin/pm2 delete app",
                "cd /srv/app && PORT=3006 ./node_modules/.bin/pm2 start server.js \
                 --name app --update-env",
            ]
        );
    }

    #[rstest]
    fn plan_tolerates_only_the_previous_process_stop(config: TargetConfig) {
        let orchestrator = DeployOrchestrator::new(&config);
        let manager = ManagerCommands::new(&config);
        let plan = orchestrator.plan(&manager);

        let tolerated: Vec<&str> = plan
            .iter()
            .filter(|step| step.on_failure == crate::sequence::FailurePolicy::ContinueWithWarning)
            .map(|step| step.label.as_str())
            .collect();
        assert_eq!(tolerated, vec!["stop the previous process"]);
    }
}
