//! Remote session abstraction combining command execution and file
//! transfer over one authenticated connection.
//!
//! Workflows depend on the [`RemoteSession`] trait so tests can substitute
//! a scripted fake; the production implementation lives in [`ssh`].

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub mod ssh;

pub use ssh::SshSession;

/// Result of executing one remote command to completion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutput {
    /// Exit status reported by the remote shell, if the channel delivered
    /// one before closing.
    pub exit_code: Option<u32>,
    /// Captured standard output, decoded lossily as UTF-8.
    pub stdout: String,
    /// Captured standard error, decoded lossily as UTF-8.
    pub stderr: String,
}

impl ExecOutput {
    /// Returns `true` when the remote command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Errors raised by remote sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Raised when the transport connection or handshake fails.
    #[error("connection to {host}:{port} failed: {message}")]
    Connect {
        /// Host the connection was attempted against.
        host: String,
        /// Port the connection was attempted against.
        port: u16,
        /// Transport error description.
        message: String,
    },
    /// Raised when the server rejects the configured credentials.
    #[error("authentication failed for {username}: {message}")]
    Auth {
        /// Username presented to the server.
        username: String,
        /// Failure description.
        message: String,
    },
    /// Raised when a command cannot be started or its channel breaks.
    #[error("remote command failed to execute: {message}")]
    Exec {
        /// Failure description.
        message: String,
    },
    /// Raised when a file transfer cannot be carried out.
    #[error("upload to {remote_path} failed: {message}")]
    Upload {
        /// Destination path on the remote host.
        remote_path: String,
        /// Failure description.
        message: String,
    },
    /// Raised when the receiving command on the remote host exits
    /// non-zero, for example because the destination is not writable.
    #[error("upload to {remote_path} rejected with exit status {status}: {stderr}")]
    UploadRejected {
        /// Destination path on the remote host.
        remote_path: String,
        /// Exit status of the receiving command.
        status: u32,
        /// Captured standard error of the receiving command.
        stderr: String,
    },
    /// Raised when closing the session fails.
    #[error("failed to close the session: {message}")]
    Close {
        /// Failure description.
        message: String,
    },
}

/// Future returned by session operations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// One authenticated connection to the deployment target.
///
/// Implementations run every operation to completion before returning;
/// there is no streaming interface and no concurrency across operations.
pub trait RemoteSession {
    /// Executes `command` in a remote shell and captures its result.
    fn exec<'a>(&'a self, command: &'a str) -> SessionFuture<'a, ExecOutput>;

    /// Writes `data` to `remote_path` on the remote host.
    fn upload<'a>(&'a self, data: &'a [u8], remote_path: &'a str) -> SessionFuture<'a, ()>;

    /// Tears the session down. Safe to call exactly once, after which the
    /// session must not be used.
    fn close(&self) -> SessionFuture<'_, ()>;
}
