//! Test support utilities shared across unit and behaviour tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::remote::{ExecOutput, RemoteSession, SessionError, SessionFuture};

/// Scripted remote session returning pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without opening network
/// connections. Executed commands and uploads are recorded for
/// assertions. State lives behind `Arc<Mutex<…>>` because the session
/// futures must be `Send`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSession {
    responses: Arc<Mutex<VecDeque<ExecOutput>>>,
    commands: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<UploadRecord>>>,
}

/// Records a single upload made through [`ScriptedSession`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadRecord {
    /// Destination path passed to the upload.
    pub remote_path: String,
    /// Number of bytes that were transferred.
    pub byte_count: usize,
}

impl ScriptedSession {
    /// Creates a session with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every command executed so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns every upload recorded so far, in order.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queues a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Queues a specific exit code.
    pub fn push_exit_code(&self, code: u32) {
        self.push_output(Some(code), "", "");
    }

    /// Queues a failing exit code with stderr text.
    pub fn push_failure(&self, code: u32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Queues a response with no exit status to simulate an abnormally
    /// closed channel.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Queues an explicit command output.
    pub fn push_output(&self, code: Option<u32>, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ExecOutput {
                exit_code: code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            });
    }
}

impl RemoteSession for ScriptedSession {
    fn exec<'a>(&'a self, command: &'a str) -> SessionFuture<'a, ExecOutput> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_owned());
        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Box::pin(async move {
            response.ok_or_else(|| SessionError::Exec {
                message: String::from("no scripted response available"),
            })
        })
    }

    fn upload<'a>(&'a self, data: &'a [u8], remote_path: &'a str) -> SessionFuture<'a, ()> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(UploadRecord {
                remote_path: remote_path.to_owned(),
                byte_count: data.len(),
            });
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> SessionFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
