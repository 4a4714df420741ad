//! Remote transports and the ping → SSH/WinRM reachability check.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{RemediationError, TransportError};
use crate::types::{DeviceConfig, ReachabilityResult};

/// Remote execution against managed devices.
///
/// Implementations own credentials and timeouts. `Ok(None)` from the run
/// methods means the command produced no usable output.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Send `count` echo requests; true when the host answered
    async fn ping_reachable(&self, host: &str, count: u32) -> Result<bool, TransportError>;

    /// Open an SSH session and run a trivial command
    async fn ssh_reachable(&self, host: &str) -> Result<bool, TransportError>;

    /// Perform a remote-management capability handshake
    async fn winrm_reachable(&self, host: &str) -> Result<bool, TransportError>;

    async fn run_ssh(
        &self,
        host: &str,
        command: &str,
        use_sudo: bool,
    ) -> Result<Option<String>, TransportError>;

    async fn run_winrm_script(
        &self,
        host: &str,
        script: &str,
    ) -> Result<Option<String>, TransportError>;

    /// Full transcript of a ping run
    async fn ping_output(&self, host: &str, count: u32) -> Result<Option<String>, TransportError>;
}

/// Sequential, short-circuiting reachability check
pub struct ReachabilityProber<'a> {
    transport: &'a dyn RemoteTransport,
}

impl<'a> ReachabilityProber<'a> {
    pub fn new(transport: &'a dyn RemoteTransport) -> Self {
        Self { transport }
    }

    /// Probe a device.
    ///
    /// A transport error at any stage counts as that stage failing. The only
    /// error returned is a configuration without a device name.
    pub async fn probe(
        &self,
        config: &DeviceConfig,
        retry_count: u32,
    ) -> Result<ReachabilityResult, RemediationError> {
        let host = config.require_device_name()?;

        let pinged = self
            .transport
            .ping_reachable(host, retry_count.max(1))
            .await
            .unwrap_or_else(|e| stage_failed(host, "ping", &e));
        if !pinged {
            info!(device = host, retries = retry_count, "Device did not answer ping");
            return Ok(ReachabilityResult::PingFailure);
        }

        let result = if config.is_linux {
            let ok = self
                .transport
                .ssh_reachable(host)
                .await
                .unwrap_or_else(|e| stage_failed(host, "ssh", &e));
            if ok {
                ReachabilityResult::Success
            } else {
                ReachabilityResult::SshFailure
            }
        } else {
            let ok = self
                .transport
                .winrm_reachable(host)
                .await
                .unwrap_or_else(|e| stage_failed(host, "winrm", &e));
            if ok {
                ReachabilityResult::Success
            } else {
                ReachabilityResult::WinrmFailure
            }
        };

        debug!(device = host, result = result.label(), "Reachability probe finished");
        Ok(result)
    }
}

fn stage_failed(host: &str, stage: &str, err: &TransportError) -> bool {
    warn!(
        device = host,
        stage,
        error = %err,
        category = err.category(),
        "Reachability stage failed"
    );
    false
}
