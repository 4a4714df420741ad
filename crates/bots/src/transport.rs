//! Process-backed [`RemoteTransport`]: `ping`, `ssh` and `pwsh` on the
//! bot host.

use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use remediation::{RemoteTransport, TransportError};

use crate::settings::TransportArgs;

/// Environment variable the WinRM password is handed over in
pub const WINRM_PASSWORD_ENV: &str = "REMEDIATION_WINRM_PASSWORD";

const SSH_CONNECT_TIMEOUT_SECS: u32 = 10;

pub struct ProcessTransport {
    ssh_user: Option<String>,
    ssh_key: Option<String>,
    pwsh: String,
    winrm_user: Option<String>,
    timeout: Duration,
}

impl ProcessTransport {
    pub fn new(args: &TransportArgs) -> Self {
        Self {
            ssh_user: args.ssh_user.clone().filter(|u| !u.is_empty()),
            ssh_key: args.ssh_key.as_ref().map(|p| p.display().to_string()),
            pwsh: args.pwsh.clone(),
            winrm_user: args.winrm_user.clone().filter(|u| !u.is_empty()),
            timeout: args.command_timeout(),
        }
    }

    fn ssh_target(&self, host: &str) -> String {
        match &self.ssh_user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }

    fn ssh_args(&self, host: &str, remote: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={SSH_CONNECT_TIMEOUT_SECS}"),
        ];
        if let Some(key) = &self.ssh_key {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args.push(self.ssh_target(host));
        args.push(remote.to_string());
        args
    }

    /// Wrap `body` so it runs on `host` through `Invoke-Command`
    fn winrm_command(&self, host: &str, body: &str) -> String {
        let host = host.replace('\'', "''");
        match &self.winrm_user {
            Some(user) => format!(
                "$cred = New-Object System.Management.Automation.PSCredential('{}', \
                 (ConvertTo-SecureString $env:{WINRM_PASSWORD_ENV} -AsPlainText -Force)); \
                 Invoke-Command -ComputerName '{host}' -Credential $cred -ScriptBlock {{ {body} }}",
                user.replace('\'', "''"),
            ),
            None => format!("Invoke-Command -ComputerName '{host}' -ScriptBlock {{ {body} }}"),
        }
    }

    fn pwsh_args(command: &str) -> Vec<String> {
        vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            command.to_string(),
        ]
    }

    async fn exec(&self, program: &str, args: &[String], host: &str) -> Result<Output, TransportError> {
        debug!(program, host, "Spawning remote command");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Launch {
                program: program.to_string(),
                details: e.to_string(),
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(TransportError::Other(format!("{program}: {e}"))),
            Err(_) => Err(TransportError::Timeout {
                host: host.to_string(),
            }),
        }
    }

    /// Run and capture stdout, failing on a non-zero exit
    async fn capture(&self, program: &str, args: &[String], host: &str) -> Result<Option<String>, TransportError> {
        let output = self.exec(program, args, host).await?;
        if !output.status.success() {
            return Err(TransportError::CommandFailed {
                host: host.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(non_empty(&output.stdout))
    }

    async fn succeeds(&self, program: &str, args: &[String], host: &str) -> Result<bool, TransportError> {
        Ok(self.exec(program, args, host).await?.status.success())
    }
}

fn non_empty(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Echo count and per-reply wait flags of the local `ping`.
///
/// Windows counts with `-n` and waits in milliseconds. macOS waits in
/// milliseconds with `-W`. Linux waits in seconds.
fn ping_flags() -> (&'static str, &'static str, &'static str) {
    if cfg!(windows) {
        ("-n", "-w", "2000")
    } else if cfg!(target_os = "macos") {
        ("-c", "-W", "2000")
    } else {
        ("-c", "-W", "2")
    }
}

fn ping_args(host: &str, count: u32) -> Vec<String> {
    let (count_flag, wait_flag, wait) = ping_flags();
    vec![
        count_flag.to_string(),
        count.max(1).to_string(),
        wait_flag.to_string(),
        wait.to_string(),
        host.to_string(),
    ]
}

/// Remote command line, optionally elevated with non-interactive sudo
fn remote_command(command: &str, use_sudo: bool) -> String {
    if use_sudo {
        format!("sudo -n sh -c '{}'", command.replace('\'', r"'\''"))
    } else {
        command.to_string()
    }
}

#[async_trait]
impl RemoteTransport for ProcessTransport {
    async fn ping_reachable(&self, host: &str, count: u32) -> Result<bool, TransportError> {
        self.succeeds("ping", &ping_args(host, count), host).await
    }

    async fn ssh_reachable(&self, host: &str) -> Result<bool, TransportError> {
        self.succeeds("ssh", &self.ssh_args(host, "pwd"), host).await
    }

    async fn winrm_reachable(&self, host: &str) -> Result<bool, TransportError> {
        let command = format!(
            "Test-WSMan -ComputerName '{}' -ErrorAction Stop | Out-Null",
            host.replace('\'', "''")
        );
        self.succeeds(&self.pwsh, &Self::pwsh_args(&command), host).await
    }

    async fn run_ssh(
        &self,
        host: &str,
        command: &str,
        use_sudo: bool,
    ) -> Result<Option<String>, TransportError> {
        let remote = remote_command(command, use_sudo);
        self.capture("ssh", &self.ssh_args(host, &remote), host).await
    }

    async fn run_winrm_script(
        &self,
        host: &str,
        script: &str,
    ) -> Result<Option<String>, TransportError> {
        let command = self.winrm_command(host, script);
        self.capture(&self.pwsh, &Self::pwsh_args(&command), host).await
    }

    async fn ping_output(&self, host: &str, count: u32) -> Result<Option<String>, TransportError> {
        // An unanswered ping still produces the transcript worth keeping
        let output = self.exec("ping", &ping_args(host, count), host).await?;
        let mut transcript = String::from_utf8_lossy(&output.stdout).into_owned();
        transcript.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(non_empty(transcript.as_bytes()))
    }
}
