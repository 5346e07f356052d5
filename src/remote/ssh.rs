//! Production SSH session built on `russh` with password authentication.
//!
//! Shared hosting accounts expose password-authenticated SSH on a custom
//! port and rotate host keys without notice, so the client accepts any
//! server identity. One session is opened per CLI invocation; each command
//! runs on a fresh channel of that session and blocks until the channel
//! reports an exit status or closes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use shell_escape::unix::escape;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{ExecOutput, RemoteSession, SessionError, SessionFuture};
use crate::config::TargetConfig;

/// Upper bound on TCP connect plus SSH handshake and authentication.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client handler that accepts any server identity.
struct AcceptingHandler;

#[async_trait]
impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Authenticated SSH session to the deployment target.
pub struct SshSession {
    handle: Mutex<client::Handle<AcceptingHandler>>,
}

impl SshSession {
    /// Connects to the configured host and authenticates with the account
    /// password.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] when the transport cannot be
    /// established within the connect timeout, and [`SessionError::Auth`]
    /// when the server rejects the credentials.
    pub async fn connect(config: &TargetConfig) -> Result<Self, SessionError> {
        let client_config = Arc::new(client::Config::default());
        let address = (config.host.clone(), config.port);

        let mut handle = timeout(
            CONNECT_TIMEOUT,
            client::connect(client_config, address, AcceptingHandler),
        )
        .await
        .map_err(|_| SessionError::Connect {
            host: config.host.clone(),
            port: config.port,
            message: format!("timed out after {} seconds", CONNECT_TIMEOUT.as_secs()),
        })?
        .map_err(|err| SessionError::Connect {
            host: config.host.clone(),
            port: config.port,
            message: err.to_string(),
        })?;

        let authenticated = handle
            .authenticate_password(config.username.clone(), config.password.as_str())
            .await
            .map_err(|err| SessionError::Auth {
                username: config.username.clone(),
                message: err.to_string(),
            })?;
        if !authenticated {
            return Err(SessionError::Auth {
                username: config.username.clone(),
                message: String::from("password rejected by the server"),
            });
        }

        Ok(Self {
            handle: Mutex::new(handle),
        })
    }

    async fn open_channel(&self) -> Result<russh::Channel<client::Msg>, SessionError> {
        let guard = self.handle.lock().await;
        guard
            .channel_open_session()
            .await
            .map_err(|err| SessionError::Exec {
                message: err.to_string(),
            })
    }

    async fn exec_command(&self, command: &str) -> Result<ExecOutput, SessionError> {
        let mut channel = self.open_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(|err| SessionError::Exec {
                message: err.to_string(),
            })?;

        let collected = drain_channel(&mut channel).await;
        channel.close().await.ok();
        Ok(collected)
    }

    async fn upload_bytes(&self, data: &[u8], remote_path: &str) -> Result<(), SessionError> {
        let receiver = format!("cat > {}", escape(remote_path.into()));
        let mut channel = self.open_channel().await?;
        channel
            .exec(true, receiver.as_str())
            .await
            .map_err(|err| upload_error(remote_path, &err))?;
        channel
            .data(data)
            .await
            .map_err(|err| upload_error(remote_path, &err))?;
        channel
            .eof()
            .await
            .map_err(|err| upload_error(remote_path, &err))?;

        let collected = drain_channel(&mut channel).await;
        channel.close().await.ok();
        match collected.exit_code {
            Some(0) => Ok(()),
            Some(status) => Err(SessionError::UploadRejected {
                remote_path: remote_path.to_owned(),
                status,
                stderr: collected.stderr,
            }),
            None => Err(SessionError::Upload {
                remote_path: remote_path.to_owned(),
                message: String::from("channel closed without an exit status"),
            }),
        }
    }

    async fn close_session(&self) -> Result<(), SessionError> {
        let guard = self.handle.lock().await;
        guard
            .disconnect(Disconnect::ByApplication, "", "")
            .await
            .map_err(|err| SessionError::Close {
                message: err.to_string(),
            })
    }
}

impl RemoteSession for SshSession {
    fn exec<'a>(&'a self, command: &'a str) -> SessionFuture<'a, ExecOutput> {
        Box::pin(self.exec_command(command))
    }

    fn upload<'a>(&'a self, data: &'a [u8], remote_path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(self.upload_bytes(data, remote_path))
    }

    fn close(&self) -> SessionFuture<'_, ()> {
        Box::pin(self.close_session())
    }
}

/// Collects channel traffic until the channel closes, keeping the last
/// exit status seen. Output arriving after the exit status is still
/// captured; the server closes the channel when the command is done.
async fn drain_channel(channel: &mut russh::Channel<client::Msg>) -> ExecOutput {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                stderr.extend_from_slice(data);
            }
            ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
            _ => {}
        }
    }

    ExecOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}

fn upload_error(remote_path: &str, err: &russh::Error) -> SessionError {
    SessionError::Upload {
        remote_path: remote_path.to_owned(),
        message: err.to_string(),
    }
}
