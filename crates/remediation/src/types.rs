//! Core data structures for remediation workflows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::RemediationError;

/// Status names shared by the built-in workflows.
///
/// Statuses are keys into the workflow catalog, so workflows may define
/// additional ones; these are the names the engine and actions emit.
pub mod status {
    pub const WIP: &str = "WIP";
    pub const RESOLVED: &str = "RESOLVED";
    pub const RUNNING: &str = "RUNNING";
    pub const ESCALATE: &str = "ESCALATE";
    pub const ESCALATE_DEVICE_UNREACHABLE: &str = "ESCALATE_DEVICE_UNREACHABLE";
    pub const ESCALATE_CLUSTER_SERVERS: &str = "ESCALATE_CLUSTER_SERVERS";
    pub const RESTART_FAILURE: &str = "RESTART_FAILURE";

    /// Whether a status hands the incident to a human resolver group.
    #[must_use]
    pub fn is_escalation(status: &str) -> bool {
        status.starts_with("ESCALATE") || status == RESTART_FAILURE
    }
}

/// Kind of resource alert carried by an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertType {
    Cpu,
    Memory,
    Other(String),
}

impl AlertType {
    /// Parse an alert type label case-insensitively
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "CPU" => AlertType::Cpu,
            "MEMORY" | "MEM" => AlertType::Memory,
            _ => AlertType::Other(trimmed.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            AlertType::Cpu => "CPU",
            AlertType::Memory => "MEMORY",
            AlertType::Other(s) => s,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AlertType {
    fn from(value: String) -> Self {
        AlertType::parse(&value)
    }
}

impl From<AlertType> for String {
    fn from(value: AlertType) -> Self {
        value.as_str().to_string()
    }
}

/// Value of a parsed description field without a dedicated slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
}

impl FieldValue {
    /// Coerce `true`/`false` (any case) to a flag, everything else stays text
    #[must_use]
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            FieldValue::Flag(true)
        } else if trimmed.eq_ignore_ascii_case("false") {
            FieldValue::Flag(false)
        } else {
            FieldValue::Text(trimmed.to_string())
        }
    }

    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            FieldValue::Text(_) => None,
        }
    }

    /// Render the value as the text a template would show
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Flag(b) => b.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

/// Structured configuration of the device an incident is about.
///
/// Built once per incident by the parser, enriched with routing data and
/// mutated by the state machine while the run progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Ticket system record id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_id: Option<String>,

    /// Human-facing incident number (e.g. INC0012345)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,

    /// Host name or address of the affected device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<AlertType>,

    /// Whether the device is reached over SSH rather than WinRM
    pub is_linux: bool,

    /// Clustered or agent-managed device that must not be remediated
    pub is_cluster: bool,

    /// Threshold the measured usage is compared against (numeric text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Incident subcategory reported by the ticketing system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,

    /// Assignment group id used on escalation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver_group: Option<String>,

    /// Display name of the resolver group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_address: Option<String>,

    /// Measured usage attached by the CPU/Memory action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_usage: Option<String>,

    /// Failure label attached on escalation (e.g. "Ping Failure")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<String>,

    /// Attempt count reported as a metric when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_time: Option<u32>,

    /// Workflow-specific fields without a dedicated slot
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, FieldValue>,
}

impl DeviceConfig {
    /// Ticket reference required before any outbound update
    pub fn require_sys_id(&self) -> Result<&str, RemediationError> {
        self.sys_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(RemediationError::InvalidConfig("sysId"))
    }

    /// Device name required before any reachability probe
    pub fn require_device_name(&self) -> Result<&str, RemediationError> {
        self.device_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(RemediationError::InvalidConfig("deviceName"))
    }

    /// Attach the ticket identity of the incident this config was parsed from
    pub fn attach_incident(&mut self, sys_id: &str, number: Option<&str>) {
        self.sys_id = Some(sys_id.to_string());
        if let Some(number) = number {
            self.incident_id = Some(number.to_string());
        }
    }

    /// Device name formatted for logs
    #[must_use]
    pub fn device_label(&self) -> &str {
        self.device_name.as_deref().unwrap_or("<unknown>")
    }

    /// Platform-specific remote-management failure label
    #[must_use]
    pub fn transport_failure_label(&self) -> &'static str {
        if self.is_linux {
            ReachabilityResult::SshFailure.label()
        } else {
            ReachabilityResult::WinrmFailure.label()
        }
    }
}

/// One row of a top-resource-consumer listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSample {
    pub pid: String,
    pub name: String,
    /// Usage as displayed, including the percent sign
    pub usage_percent: String,
}

impl ProcessSample {
    #[must_use]
    pub fn new(
        pid: impl Into<String>,
        name: impl Into<String>,
        usage_percent: impl Into<String>,
    ) -> Self {
        Self {
            pid: pid.into(),
            name: name.into(),
            usage_percent: usage_percent.into(),
        }
    }

    /// Field values in declaration order
    #[must_use]
    pub fn fields(&self) -> [&str; 3] {
        [&self.pid, &self.name, &self.usage_percent]
    }
}

/// Verdict of the sequential ping → SSH/WinRM reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReachabilityResult {
    Success,
    PingFailure,
    SshFailure,
    WinrmFailure,
}

impl ReachabilityResult {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == ReachabilityResult::Success
    }

    /// Label written into ticket notes
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ReachabilityResult::Success => "Success",
            ReachabilityResult::PingFailure => "Ping Failure",
            ReachabilityResult::SshFailure => "SSH Failure",
            ReachabilityResult::WinrmFailure => "WinRM Failure",
        }
    }
}

/// States of a single incident run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    New,
    Wip,
    Probing,
    Reachable,
    Unreachable,
    Acting,
    Resolved,
    Escalated,
    Aborted,
}

impl WorkflowState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Resolved | WorkflowState::Escalated | WorkflowState::Aborted
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::New => "NEW",
            WorkflowState::Wip => "WIP",
            WorkflowState::Probing => "PROBING",
            WorkflowState::Reachable => "REACHABLE",
            WorkflowState::Unreachable => "UNREACHABLE",
            WorkflowState::Acting => "ACTING",
            WorkflowState::Resolved => "RESOLVED",
            WorkflowState::Escalated => "ESCALATED",
            WorkflowState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}
