//! Workflow-specific remediation actions.
//!
//! Each workflow variant implements [`RemediationAction`]; the state machine
//! runs whichever action it is handed once the device is reachable.

use async_trait::async_trait;

use crate::error::ActionError;
use crate::formatter::ResultExtra;
use crate::probe::RemoteTransport;
use crate::types::{status, DeviceConfig};

pub mod commands;
pub mod ping;
pub mod resource;
pub mod service;

pub use ping::PingResponseAction;
pub use resource::ResourceUsageAction;
pub use service::ServiceRestartAction;

pub const CPU_MEMORY_WORKFLOW: &str = "CPUMemoryResourceRemediation";
pub const SERVICE_RESTART_WORKFLOW: &str = "ServiceRestartRemediation";
pub const PING_RESPONSE_WORKFLOW: &str = "PingResponseRemediation";

/// Statuses the state machine itself emits for every workflow
pub const ENGINE_STATUSES: &[&str] = &[
    status::WIP,
    status::ESCALATE_CLUSTER_SERVERS,
    status::ESCALATE_DEVICE_UNREACHABLE,
    status::ESCALATE,
];

/// Result of a remediation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action's success policy was satisfied
    Resolved {
        status: String,
        extra: Option<ResultExtra>,
    },
    /// Automated remediation could not resolve the incident
    Escalated {
        status: String,
        extra: Option<ResultExtra>,
    },
}

impl ActionOutcome {
    pub fn resolved(status: &str, extra: Option<ResultExtra>) -> Self {
        ActionOutcome::Resolved {
            status: status.to_string(),
            extra,
        }
    }

    pub fn escalated(status: &str, extra: Option<ResultExtra>) -> Self {
        ActionOutcome::Escalated {
            status: status.to_string(),
            extra,
        }
    }

    #[must_use]
    pub fn status(&self) -> &str {
        match self {
            ActionOutcome::Resolved { status, .. } | ActionOutcome::Escalated { status, .. } => {
                status
            }
        }
    }

    #[must_use]
    pub fn extra(&self) -> Option<&ResultExtra> {
        match self {
            ActionOutcome::Resolved { extra, .. } | ActionOutcome::Escalated { extra, .. } => {
                extra.as_ref()
            }
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, ActionOutcome::Resolved { .. })
    }
}

/// Collaborators and settings available to an action
pub struct ActionContext<'a> {
    pub transport: &'a dyn RemoteTransport,
    pub retry_count: u32,
    pub top_process_count: usize,
}

#[async_trait]
pub trait RemediationAction: Send + Sync {
    /// Built-in action name
    fn name(&self) -> &'static str;

    /// Statuses this action can return
    fn statuses(&self) -> &'static [&'static str];

    /// Remediate a reachable device, recording measurements on `config`
    async fn remediate(
        &self,
        config: &mut DeviceConfig,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Every status a run of `action` can produce
pub fn reachable_statuses(action: &dyn RemediationAction) -> Vec<&'static str> {
    let mut statuses: Vec<&'static str> = ENGINE_STATUSES.to_vec();
    for &name in action.statuses() {
        if !statuses.contains(&name) {
            statuses.push(name);
        }
    }
    statuses
}

/// Look up a built-in action by name
pub fn builtin(name: &str) -> Option<Box<dyn RemediationAction>> {
    match name {
        CPU_MEMORY_WORKFLOW => Some(Box::new(ResourceUsageAction)),
        SERVICE_RESTART_WORKFLOW => Some(Box::new(ServiceRestartAction)),
        PING_RESPONSE_WORKFLOW => Some(Box::new(PingResponseAction)),
        _ => None,
    }
}

/// Names of all built-in actions
pub const BUILTIN_ACTIONS: &[&str] = &[
    CPU_MEMORY_WORKFLOW,
    SERVICE_RESTART_WORKFLOW,
    PING_RESPONSE_WORKFLOW,
];

pub(crate) fn required_field<'a>(
    value: Option<&'a str>,
    workflow: &str,
    field: &str,
) -> Result<&'a str, ActionError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ActionError::MissingField {
            workflow: workflow.to_string(),
            field: field.to_string(),
        })
}
