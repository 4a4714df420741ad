//! Process settings: command-line flags with environment fallbacks.

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use remediation::GatewayError;

/// ServiceNow connection settings
#[derive(Debug, Clone, Args)]
pub struct ServiceNowArgs {
    /// Full base URL of the instance (overrides --instance)
    #[arg(long = "sn-base-url", env = "SN_BASE_URL")]
    pub base_url: Option<String>,

    /// Instance name, expanded to https://<instance>.service-now.com
    #[arg(long = "sn-instance", env = "SN_INSTANCE")]
    pub instance: Option<String>,

    #[arg(long = "sn-username", env = "SN_USERNAME")]
    pub username: Option<String>,

    #[arg(long = "sn-password", env = "SN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long = "sn-timeout", env = "SN_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl ServiceNowArgs {
    /// Base URL without a trailing slash
    pub fn resolved_base_url(&self) -> Result<String, GatewayError> {
        if let Some(url) = self.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.trim().trim_end_matches('/').to_string());
        }
        match self.instance.as_deref().map(str::trim) {
            Some(instance) if !instance.is_empty() => {
                Ok(format!("https://{instance}.service-now.com"))
            }
            _ => Err(GatewayError::NotConfigured(
                "set SN_BASE_URL or SN_INSTANCE".to_string(),
            )),
        }
    }

    pub fn credentials(&self) -> Result<(String, String), GatewayError> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => {
                Ok((user.to_string(), password.to_string()))
            }
            _ => Err(GatewayError::NotConfigured(
                "set SN_USERNAME and SN_PASSWORD".to_string(),
            )),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Remote execution settings for the process-backed transport
#[derive(Debug, Clone, Args)]
pub struct TransportArgs {
    /// SSH login user; the local default applies when unset
    #[arg(long = "ssh-user", env = "REMEDIATION_SSH_USER")]
    pub ssh_user: Option<String>,

    /// SSH identity file
    #[arg(long = "ssh-key", env = "REMEDIATION_SSH_KEY")]
    pub ssh_key: Option<PathBuf>,

    /// PowerShell executable used for WinRM
    #[arg(long = "pwsh", env = "REMEDIATION_PWSH", default_value = "pwsh")]
    pub pwsh: String,

    /// WinRM user; the password is read from REMEDIATION_WINRM_PASSWORD
    #[arg(long = "winrm-user", env = "REMEDIATION_WINRM_USER")]
    pub winrm_user: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long = "command-timeout", env = "REMEDIATION_COMMAND_TIMEOUT", default_value_t = 120)]
    pub command_timeout_secs: u64,
}

impl TransportArgs {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

impl Default for TransportArgs {
    fn default() -> Self {
        Self {
            ssh_user: None,
            ssh_key: None,
            pwsh: "pwsh".to_string(),
            winrm_user: None,
            command_timeout_secs: 120,
        }
    }
}
