//! Deployment target configuration loaded via `ortho-config`.
//!
//! This module defines [`TargetConfig`] for the hosting account, remote
//! paths, and process manager settings. Configuration merges defaults,
//! configuration files, and environment variables; site-specific values
//! (host, credentials, deployment directory, public URL) are required and
//! validated with actionable messages.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default name of the process started on the remote host.
pub const DEFAULT_APP_NAME: &str = "app";

/// Default entry script handed to the process manager.
pub const DEFAULT_APP_SCRIPT: &str = "server.js";

/// Default path to the process manager executable, relative to the
/// deployment directory. Shared hosts commonly forbid global installs, so
/// the manager is expected under the application's own `node_modules`.
pub const DEFAULT_MANAGER_BIN: &str = "./node_modules/.bin/pm2";

/// Default file name for the uploaded deployment package.
pub const DEFAULT_ARCHIVE_NAME: &str = "deploy_package.zip";

/// Deployment target settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GANTRY",
    discovery(
        app_name = "gantry",
        env_var = "GANTRY_CONFIG_PATH",
        config_file_name = "gantry.toml",
        dotfile_name = ".gantry.toml",
        project_file_name = "gantry.toml"
    )
)]
pub struct TargetConfig {
    /// Hostname or address of the hosting account.
    pub host: String,
    /// SSH port on the hosting account.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Account username used for authentication.
    pub username: String,
    /// Account password used for authentication.
    pub password: String,
    /// Absolute deployment directory on the remote host.
    pub remote_dir: String,
    /// Public URL probed after a deployment or relaunch.
    pub public_url: String,
    /// Name the application is registered under with the process manager.
    #[ortho_config(default = DEFAULT_APP_NAME.to_owned())]
    pub app_name: String,
    /// Entry script the process manager starts.
    #[ortho_config(default = DEFAULT_APP_SCRIPT.to_owned())]
    pub app_script: String,
    /// TCP port the application listens on behind the reverse proxy.
    #[ortho_config(default = 3000)]
    pub app_port: u16,
    /// Path to the process manager executable. Relative paths resolve
    /// inside the deployment directory.
    #[ortho_config(default = DEFAULT_MANAGER_BIN.to_owned())]
    pub manager_bin: String,
    /// Dedicated state directory for the process manager, exported as
    /// `PM2_HOME` so the deployment keeps its own process list. Optional;
    /// when not provided the manager uses its default home.
    pub manager_home: Option<String>,
    /// Directory containing the Node.js toolchain, prepended to `PATH`
    /// before manager and npm commands. Optional; shared hosts often keep
    /// the toolchain outside the default path.
    pub node_bin_dir: Option<String>,
    /// File name for the deployment package, locally and inside the
    /// deployment directory.
    #[ortho_config(default = DEFAULT_ARCHIVE_NAME.to_owned())]
    pub archive_name: String,
    /// Local rewrite-rule file uploaded to the remote host as `.htaccess`.
    #[ortho_config(default = "site.htaccess".to_owned())]
    pub rewrite_file: String,
    /// Local reverse-proxy script refreshed during a relaunch.
    #[ortho_config(default = "proxy.php".to_owned())]
    pub proxy_file: String,
    /// Local process-manager configuration file refreshed during a
    /// relaunch and used to start the application.
    #[ortho_config(default = "ecosystem.config.js".to_owned())]
    pub manager_config_file: String,
}

/// Errors raised when loading the configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

/// Errors raised by semantic validation of a loaded configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Raised when a required value is missing or blank. The message
    /// includes guidance on how to provide the value via environment
    /// variable or configuration file.
    #[error("missing {field}: set GANTRY_{env_suffix} or add {field} to gantry.toml", env_suffix = field.to_uppercase())]
    MissingField {
        /// Configuration field that failed validation.
        field: String,
    },
}

impl TargetConfig {
    /// Loads configuration using defaults, configuration files, and
    /// environment variables, without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("gantry")])
            .map_err(|err| ConfigLoadError::Parse(err.to_string()))
    }

    /// Loads configuration using the default argument iterator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Parse`] when merging sources fails.
    pub fn load_from_sources() -> Result<Self, ConfigLoadError> {
        Self::load().map_err(|err| ConfigLoadError::Parse(err.to_string()))
    }

    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when any required field is
    /// empty or an optional field is present but blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_value(&self.host, "host")?;
        Self::require_value(&self.username, "username")?;
        Self::require_value(&self.password, "password")?;
        Self::require_value(&self.remote_dir, "remote_dir")?;
        Self::require_value(&self.public_url, "public_url")?;
        Self::require_value(&self.app_name, "app_name")?;
        Self::require_value(&self.app_script, "app_script")?;
        Self::require_value(&self.manager_bin, "manager_bin")?;
        Self::require_value(&self.archive_name, "archive_name")?;
        Self::require_value(&self.rewrite_file, "rewrite_file")?;
        Self::require_value(&self.proxy_file, "proxy_file")?;
        Self::require_value(&self.manager_config_file, "manager_config_file")?;
        Self::require_optional_value(self.manager_home.as_deref(), "manager_home")?;
        Self::require_optional_value(self.node_bin_dir.as_deref(), "node_bin_dir")?;
        Ok(())
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        Self::require_optional_value(Some(value), field)
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), ConfigError> {
        match value {
            None => Ok(()), // Not configured; the feature is skipped
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(ConfigError::MissingField {
                field: field.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn base_config() -> TargetConfig {
        TargetConfig {
            host: String::from("host.example"),
            port: 22,
            username: String::from("account"),
            password: String::from("secret"),
            remote_dir: String::from("/home/account/public_html/app"),
            public_url: String::from("https://app.example/"),
            app_name: String::from("app"),
            app_script: String::from("server.js"),
            app_port: 3000,
            manager_bin: String::from(DEFAULT_MANAGER_BIN),
            manager_home: Some(String::from("/home/account/.pm2-app")),
            node_bin_dir: Some(String::from("/opt/node/bin")),
            archive_name: String::from(DEFAULT_ARCHIVE_NAME),
            rewrite_file: String::from("site.htaccess"),
            proxy_file: String::from("proxy.php"),
            manager_config_file: String::from("ecosystem.config.js"),
        }
    }

    #[test]
    fn validate_accepts_complete_configuration() {
        assert!(base_config().validate().is_ok());
    }

    #[rstest]
    #[case::host("host")]
    #[case::password("password")]
    #[case::remote_dir("remote_dir")]
    #[case::public_url("public_url")]
    fn validate_rejects_blank_required_fields(#[case] field: &str) {
        let mut config = base_config();
        match field {
            "host" => config.host = String::from("  "),
            "password" => config.password = String::new(),
            "remote_dir" => config.remote_dir = String::from("\t"),
            _ => config.public_url = String::new(),
        }

        let err = config.validate().expect_err("blank field should be rejected");
        assert!(
            matches!(err, ConfigError::MissingField { field: ref name } if name == field),
            "unexpected error for {field}: {err}"
        );
    }

    #[test]
    fn validate_rejects_blank_optional_fields() {
        let config = TargetConfig {
            manager_home: Some(String::from("   ")),
            ..base_config()
        };

        let err = config.validate().expect_err("blank optional should be rejected");
        assert!(
            matches!(err, ConfigError::MissingField { ref field } if field == "manager_home"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn validate_accepts_absent_optional_fields() {
        let config = TargetConfig {
            manager_home: None,
            node_bin_dir: None,
            ..base_config()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_field_error_names_environment_variable() {
        let err = ConfigError::MissingField {
            field: String::from("public_url"),
        };

        let rendered = err.to_string();
        assert!(
            rendered.contains("GANTRY_PUBLIC_URL"),
            "expected env guidance, got: {rendered}"
        );
    }
}
