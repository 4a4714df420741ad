//! Ticketing system boundary: incident search and status updates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GatewayError;

/// Incident row returned by a filtered search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub sys_id: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
}

/// Outbound ticket update. Field names are the ticketing system's column
/// names; unset fields are omitted from the request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_notes: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_notes: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_group: Option<String>,

    /// Additional columns (e.g. `u_sop`)
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl Payload {
    /// True when the update would not change anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.close_code.is_none()
            && self.close_notes.is_none()
            && self.work_notes.is_none()
            && self.assignment_group.is_none()
            && self.fields.is_empty()
    }
}

/// Read/write access to the ticketing system.
#[async_trait]
pub trait IncidentGateway: Send + Sync {
    /// Return active incidents matching an encoded filter expression
    async fn search(&self, filter: &str) -> Result<Vec<Incident>, GatewayError>;

    /// Apply a status update to one incident
    async fn update(&self, sys_id: &str, payload: &Payload) -> Result<(), GatewayError>;
}
