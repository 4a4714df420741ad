//! Service side of the remediation bots: the ServiceNow gateway, the
//! process-backed remote transport and the polling loop.

pub mod poller;
pub mod servicenow;
pub mod settings;
pub mod transport;

pub use poller::{Poller, SweepSummary};
pub use servicenow::ServiceNowGateway;
pub use transport::ProcessTransport;
