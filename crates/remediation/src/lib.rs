//! Remediation workflow engine.
//!
//! Turns ticketing-system incidents into remediation runs:
//!
//! - [`parser::IncidentParser`] extracts a [`types::DeviceConfig`] from the
//!   free-text description
//! - [`probe::ReachabilityProber`] checks the device over ping and SSH/WinRM
//! - [`actions`] holds the workflow-specific remediation (CPU/Memory,
//!   service restart, ping response)
//! - [`formatter::PayloadFormatter`] renders the ticket update for a status
//!   from the [`config::WorkflowCatalog`]
//! - [`state::RemediationStateMachine`] drives a run from WIP to a resolved
//!   or escalated ticket
//!
//! Transports and the ticketing gateway are traits implemented by the
//! service binary.

pub mod actions;
pub mod config;
pub mod error;
pub mod formatter;
pub mod gateway;
pub mod parser;
pub mod patterns;
pub mod probe;
pub mod routing;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

pub use actions::{ActionContext, ActionOutcome, RemediationAction};
pub use config::{ConfigStore, PayloadTemplate, WorkflowCatalog, WorkflowDefinition};
pub use error::{
    ActionError, CatalogError, FormatError, GatewayError, RemediationError, RemediationResult,
    TransportError,
};
pub use formatter::{PayloadFormatter, ResultExtra};
pub use gateway::{Incident, IncidentGateway, Payload};
pub use parser::IncidentParser;
pub use probe::{ReachabilityProber, RemoteTransport};
pub use routing::{DeviceClass, ResolverTable};
pub use state::{EngineSettings, RemediationStateMachine, RunOutcome, RunReport};
pub use types::{AlertType, DeviceConfig, ProcessSample, ReachabilityResult, WorkflowState};
