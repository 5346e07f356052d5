//! Binary entry point for the Gantry CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;

use gantry::{
    DeployError, DeployOrchestrator, DiagnoseError, DiagnoseRunner, RelaunchError,
    RelaunchOrchestrator, RemoteSession, Reporter, SessionError, SshSession, TargetConfig,
};

mod cli;

use crate::cli::{Cli, DeployCommand, DiagnoseCommand, RelaunchCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("deploy failed: {0}")]
    Deploy(#[from] DeployError),
    #[error("diagnosis failed: {0}")]
    Diagnose(#[from] DiagnoseError),
    #[error("relaunch failed: {0}")]
    Relaunch(#[from] RelaunchError),
    #[error("invalid source directory: {0}")]
    InvalidSource(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Deploy(command) => run_deploy(command).await,
        Cli::Diagnose(command) => run_diagnose(command).await,
        Cli::Relaunch(command) => run_relaunch(command).await,
    }
}

async fn run_deploy(command: DeployCommand) -> Result<(), CliError> {
    let config = load_config()?;
    let source = source_dir(command.source)?;
    let mut reporter = Reporter::new(io::stdout());

    let session = connect(&config, &mut reporter).await?;
    let result = DeployOrchestrator::new(&config)
        .execute(&session, &source, &mut reporter)
        .await;
    close_session(&session, &mut reporter).await;

    result.map(|_outcome| ()).map_err(CliError::from)
}

async fn run_diagnose(_command: DiagnoseCommand) -> Result<(), CliError> {
    let config = load_config()?;
    let mut reporter = Reporter::new(io::stdout());

    let session = connect(&config, &mut reporter).await?;
    let result = DiagnoseRunner::new(&config)
        .execute(&session, &mut reporter)
        .await;
    close_session(&session, &mut reporter).await;

    result.map(|_report| ()).map_err(CliError::from)
}

async fn run_relaunch(command: RelaunchCommand) -> Result<(), CliError> {
    let config = load_config()?;
    let source = source_dir(command.source)?;
    let mut reporter = Reporter::new(io::stdout());

    let session = connect(&config, &mut reporter).await?;
    let result = RelaunchOrchestrator::new(&config)
        .execute(&session, &source, &mut reporter)
        .await;
    close_session(&session, &mut reporter).await;

    result.map(|_outcome| ()).map_err(CliError::from)
}

fn load_config() -> Result<TargetConfig, CliError> {
    let config =
        TargetConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    Ok(config)
}

fn source_dir(argument: Option<String>) -> Result<Utf8PathBuf, CliError> {
    match argument {
        Some(path) => Ok(Utf8PathBuf::from(path)),
        None => {
            let cwd =
                std::env::current_dir().map_err(|err| CliError::InvalidSource(err.to_string()))?;
            Utf8PathBuf::from_path_buf(cwd)
                .map_err(|path| CliError::InvalidSource(path.display().to_string()))
        }
    }
}

async fn connect<W: Write>(
    config: &TargetConfig,
    reporter: &mut Reporter<W>,
) -> Result<SshSession, CliError> {
    reporter.step(&format!("connect to {}:{}", config.host, config.port));
    let session = SshSession::connect(config).await?;
    reporter.note("connected");
    Ok(session)
}

async fn close_session<W: Write>(session: &SshSession, reporter: &mut Reporter<W>) {
    if let Err(err) = session.close().await {
        reporter.warn(&format!("failed to close the session cleanly: {err}"));
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
