//! ServiceNow table API implementation of [`IncidentGateway`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use remediation::{GatewayError, Incident, IncidentGateway, Payload};

const INCIDENT_TABLE: &str = "/api/now/v2/table/incident";
const SEARCH_FIELDS: &str = "sys_id,number,description,subcategory";

/// Only new (1) and in-progress (2) incidents are picked up
const ACTIVE_STATES: &str = "state=1^ORstate=2";

#[derive(Debug, Deserialize)]
struct TableResponse {
    #[serde(default)]
    result: Vec<Incident>,
}

/// Basic-auth client for the incident table
#[derive(Clone)]
pub struct ServiceNowGateway {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl ServiceNowGateway {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    /// Encoded query restricted to active incidents.
    ///
    /// Every `^NQ` group gets the state clause so no group can match
    /// closed incidents.
    pub fn active_query(filter: &str) -> String {
        let groups: Vec<String> = filter
            .split("^NQ")
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| format!("{ACTIVE_STATES}^{g}"))
            .collect();
        if groups.is_empty() {
            ACTIVE_STATES.to_string()
        } else {
            groups.join("^NQ")
        }
    }

    async fn error_for(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        GatewayError::Status { status, body }
    }
}

#[async_trait]
impl IncidentGateway for ServiceNowGateway {
    async fn search(&self, filter: &str) -> Result<Vec<Incident>, GatewayError> {
        let url = format!("{}{INCIDENT_TABLE}", self.base_url);
        let query = Self::active_query(filter);
        debug!(url = %url, query = %query, "Searching incidents");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .query(&[("sysparm_query", query.as_str()), ("sysparm_fields", SEARCH_FIELDS)])
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let table: TableResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        info!(count = table.result.len(), "Incident search returned");
        Ok(table.result)
    }

    async fn update(&self, sys_id: &str, payload: &Payload) -> Result<(), GatewayError> {
        if payload.is_empty() {
            debug!(sys_id, "Payload sets no fields, skipping update");
            return Ok(());
        }

        let url = format!("{}{INCIDENT_TABLE}/{sys_id}", self.base_url);
        debug!(url = %url, "Updating incident");

        let response = self
            .client
            .patch(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }
}
