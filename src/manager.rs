//! Remote process-manager command construction.
//!
//! The workflows need process-manager and shell commands in a predictable
//! working directory with the hosting account's Node.js toolchain on
//! `PATH` and the manager pointed at its dedicated state directory. This
//! module centralises the string building so the workflows stay focused on
//! orchestration; every interpolated value is shell-escaped.

use shell_escape::unix::escape;

use crate::config::TargetConfig;

/// Builds shell command strings for the remote process manager.
#[derive(Clone, Debug)]
pub struct ManagerCommands {
    bin: String,
    preamble: String,
    workdir: String,
}

impl ManagerCommands {
    /// Creates a command builder for the configured target.
    #[must_use]
    pub fn new(config: &TargetConfig) -> Self {
        let mut preamble = String::new();
        if let Some(ref node_bin_dir) = config.node_bin_dir {
            preamble.push_str("export PATH=");
            preamble.push_str(escape(node_bin_dir.as_str().into()).as_ref());
            preamble.push_str(":\"$PATH\" && ");
        }
        if let Some(ref manager_home) = config.manager_home {
            preamble.push_str("export PM2_HOME=");
            preamble.push_str(escape(manager_home.as_str().into()).as_ref());
            preamble.push_str(" && ");
        }

        Self {
            bin: escape(config.manager_bin.as_str().into()).into_owned(),
            preamble,
            workdir: config.remote_dir.clone(),
        }
    }

    /// Wraps `command` with a change into the deployment directory.
    #[must_use]
    pub fn in_workdir(&self, command: &str) -> String {
        format!(
            "cd {} && {command}",
            escape(self.workdir.as_str().into())
        )
    }

    /// Wraps `command` with the toolchain environment exports and a change
    /// into the deployment directory.
    #[must_use]
    pub fn with_env(&self, command: &str) -> String {
        format!("{}{}", self.preamble, self.in_workdir(command))
    }

    /// Lists managed processes.
    #[must_use]
    pub fn list(&self) -> String {
        self.with_env(&format!("{} list", self.bin))
    }

    /// Deletes the named process from the manager.
    #[must_use]
    pub fn delete(&self, name: &str) -> String {
        self.with_env(&format!("{} delete {}", self.bin, escape(name.into())))
    }

    /// Deletes every process the manager knows about.
    #[must_use]
    pub fn delete_all(&self) -> String {
        self.with_env(&format!("{} delete all", self.bin))
    }

    /// Starts `script` under `name`, exporting `PORT` so the application
    /// binds the configured port.
    #[must_use]
    pub fn start_script(&self, script: &str, name: &str, port: u16) -> String {
        self.with_env(&format!(
            "PORT={port} {} start {} --name {} --update-env",
            self.bin,
            escape(script.into()),
            escape(name.into())
        ))
    }

    /// Starts processes from the manager's configuration file.
    #[must_use]
    pub fn start_config(&self, config_file: &str) -> String {
        self.with_env(&format!("{} start {}", self.bin, escape(config_file.into())))
    }

    /// Persists the current process list so it survives host restarts.
    #[must_use]
    pub fn save(&self) -> String {
        self.with_env(&format!("{} save", self.bin))
    }

    /// Tails the named process's log without streaming.
    #[must_use]
    pub fn logs(&self, name: &str, lines: u32) -> String {
        self.with_env(&format!(
            "{} logs {} --lines {lines} --nostream",
            self.bin,
            escape(name.into())
        ))
    }

    /// Kills application processes that escaped the manager. Runs outside
    /// the deployment directory because the processes may hold it open.
    #[must_use]
    pub fn kill_stray(&self, script: &str) -> String {
        format!("pkill -f {}", escape(format!("node.*{script}").into()))
    }
}
