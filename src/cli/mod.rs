//! Command-line interface definitions for the `gantry` binary.
//!
//! This module centralises the clap parser structures so both the main
//! binary and the build script can reuse them when generating the manual
//! page.

use clap::Parser;

/// Top-level CLI for the `gantry` binary.
#[derive(Debug, Parser)]
#[command(
    name = "gantry",
    about = "Package a web application and deploy it to a shared host over SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Package, upload, install, restart, and verify the application.
    #[command(
        name = "deploy",
        about = "Package, upload, install, restart, and verify the application"
    )]
    Deploy(DeployCommand),
    /// Inspect the remote process manager and application state.
    #[command(
        name = "diagnose",
        about = "Inspect the remote process manager and application state"
    )]
    Diagnose(DiagnoseCommand),
    /// Push refreshed proxy configuration and restart from the manager
    /// configuration file.
    #[command(
        name = "relaunch",
        about = "Push refreshed proxy configuration and restart from the manager config file"
    )]
    Relaunch(RelaunchCommand),
}

/// Arguments for the `gantry deploy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DeployCommand {
    /// Source directory to package; defaults to the current directory.
    #[arg(long, value_name = "DIR")]
    pub(crate) source: Option<String>,
}

/// Arguments for the `gantry diagnose` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DiagnoseCommand {}

/// Arguments for the `gantry relaunch` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RelaunchCommand {
    /// Directory containing the refreshed configuration files; defaults
    /// to the current directory.
    #[arg(long, value_name = "DIR")]
    pub(crate) source: Option<String>,
}
