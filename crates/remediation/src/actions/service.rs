//! Service restart: leave running services alone, start stopped ones.

use async_trait::async_trait;
use tracing::{info, warn};

use super::commands;
use super::{
    required_field, ActionContext, ActionOutcome, RemediationAction, SERVICE_RESTART_WORKFLOW,
};
use crate::error::ActionError;
use crate::formatter::ResultExtra;
use crate::types::{status, DeviceConfig};

pub const INVALID_SERVICE: &str = "Invalid Service";
pub const SERVICE_START_FAILURE: &str = "Service Start Failure";

pub(crate) const SERVICE_STATUSES: &[&str] = &[
    status::RUNNING,
    status::RESOLVED,
    status::RESTART_FAILURE,
    status::ESCALATE,
    status::ESCALATE_DEVICE_UNREACHABLE,
];

/// State reported by the remote service manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped(String),
    Invalid,
}

impl ServiceState {
    /// Interpret `Get-Service` or `systemctl is-active` output
    pub fn parse(output: &str) -> Self {
        let state = output.trim();
        if state.eq_ignore_ascii_case("running") || state.eq_ignore_ascii_case("active") {
            ServiceState::Running
        } else if state.eq_ignore_ascii_case("invalid") {
            ServiceState::Invalid
        } else {
            ServiceState::Stopped(state.to_string())
        }
    }
}

/// Restarts a stopped service named by the incident
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceRestartAction;

#[async_trait]
impl RemediationAction for ServiceRestartAction {
    fn name(&self) -> &'static str {
        SERVICE_RESTART_WORKFLOW
    }

    fn statuses(&self) -> &'static [&'static str] {
        SERVICE_STATUSES
    }

    async fn remediate(
        &self,
        config: &mut DeviceConfig,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        ensure_service(config, ctx, SERVICE_RESTART_WORKFLOW, None).await
    }
}

/// Shared running/restart policy. `extra` is attached to every outcome.
pub(crate) async fn ensure_service(
    config: &mut DeviceConfig,
    ctx: &ActionContext<'_>,
    workflow: &str,
    extra: Option<ResultExtra>,
) -> Result<ActionOutcome, ActionError> {
    let service = required_field(config.service_name.as_deref(), workflow, "serviceName")?.to_string();
    let host = required_field(config.device_name.as_deref(), workflow, "deviceName")?.to_string();

    let state = if config.is_linux {
        ctx.transport
            .run_ssh(&host, &commands::linux_service_status(&service), true)
            .await?
    } else {
        ctx.transport
            .run_winrm_script(&host, &commands::windows_service_status(&service))
            .await?
    };

    let Some(state) = state.filter(|s| !s.trim().is_empty()).map(|s| ServiceState::parse(&s)) else {
        config.failure_type = Some(config.transport_failure_label().to_string());
        config.result_time = Some(ctx.retry_count);
        warn!(device = %host, service = %service, "Service state query returned nothing");
        return Ok(ActionOutcome::escalated(status::ESCALATE_DEVICE_UNREACHABLE, extra));
    };

    match state {
        ServiceState::Running => {
            info!(device = %host, service = %service, "Service already running");
            Ok(ActionOutcome::resolved(status::RUNNING, extra))
        }
        ServiceState::Invalid => {
            warn!(device = %host, service = %service, "Service does not exist");
            config.failure_type = Some(INVALID_SERVICE.to_string());
            Ok(ActionOutcome::escalated(status::ESCALATE, extra))
        }
        ServiceState::Stopped(reported) => {
            info!(device = %host, service = %service, state = %reported, "Starting service");
            if start_service(&host, &service, config.is_linux, ctx).await? {
                info!(device = %host, service = %service, "Service started");
                Ok(ActionOutcome::resolved(status::RESOLVED, extra))
            } else {
                warn!(device = %host, service = %service, "Service failed to start");
                config.failure_type = Some(SERVICE_START_FAILURE.to_string());
                Ok(ActionOutcome::escalated(status::RESTART_FAILURE, extra))
            }
        }
    }
}

async fn start_service(
    host: &str,
    service: &str,
    is_linux: bool,
    ctx: &ActionContext<'_>,
) -> Result<bool, ActionError> {
    if is_linux {
        let output = ctx
            .transport
            .run_ssh(host, &commands::linux_service_restart(service), true)
            .await?;
        Ok(output.is_some_and(|o| ServiceState::parse(&o) == ServiceState::Running))
    } else {
        let output = ctx
            .transport
            .run_winrm_script(host, &commands::windows_service_start(service))
            .await?;
        Ok(output.is_some_and(|o| o.trim().eq_ignore_ascii_case(commands::START_SUCCESS)))
    }
}
