//! Versioned workflow catalog: payload templates, filters and settings.
//!
//! The catalog is loaded once at process start and shared read-only
//! (`Arc<dyn ConfigStore>`) with the formatter and the state machine.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::routing::ResolverTable;

pub const DEFAULT_PING_RETRY_COUNT: u32 = 3;
pub const DEFAULT_TOP_PROCESS_COUNT: usize = 5;

/// Setting keys understood by the engine
pub mod keys {
    pub const PING_RETRY_COUNT: &str = "pingRetryCount";
    pub const TOP_PROCESS_COUNT: &str = "topProcessCount";
    pub const RESOLVER_GROUPS: &str = "resolverGroups";
    pub const CLUSTER_MARKERS: &str = "clusterMarkers";
}

/// Ticket fields produced for one status of one workflow.
///
/// Text fields are templates rendered against the incident context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadTemplate {
    /// Ticket state code (e.g. `2` for in progress, `6` for resolved)
    #[serde(default, deserialize_with = "string_or_number")]
    pub state: Option<String>,

    #[serde(default)]
    pub close_code: Option<String>,

    #[serde(default)]
    pub close_notes: Option<String>,

    #[serde(default)]
    pub work_notes: Option<String>,

    /// Additional ticket columns, rendered like the notes
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
    }))
}

fn default_enabled() -> bool {
    true
}

/// One remediation workflow's catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,

    /// Built-in action run for this workflow; defaults to the workflow name
    #[serde(default)]
    pub action: Option<String>,

    /// Encoded-query fragments selecting this workflow's incidents
    #[serde(default)]
    pub filters: Vec<String>,

    /// Status name → payload template
    #[serde(default)]
    pub statuses: BTreeMap<String, PayloadTemplate>,
}

impl WorkflowDefinition {
    /// Name of the action this workflow runs
    #[must_use]
    pub fn action_name<'a>(&'a self, workflow: &'a str) -> &'a str {
        self.action.as_deref().unwrap_or(workflow)
    }

    /// Filters combined into a single OR query
    #[must_use]
    pub fn combined_filter(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .filters
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join("^NQ"))
    }
}

/// A status some workflow can reach but has no template for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTemplate {
    pub workflow: String,
    pub status: String,
}

impl fmt::Display for MissingTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: no template for status {}", self.workflow, self.status)
    }
}

/// Read access to workflow configuration
pub trait ConfigStore: Send + Sync {
    /// Payload template for a workflow status
    fn template(&self, workflow: &str, status: &str) -> Option<&PayloadTemplate>;

    /// Scalar or document setting
    fn value(&self, key: &str) -> Option<&serde_json::Value>;

    /// Integer setting with a fallback
    fn u64_value(&self, key: &str, default: u64) -> u64 {
        self.value(key)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(default)
    }
}

/// The workflow catalog document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCatalog {
    pub version: String,

    #[serde(default)]
    pub workflows: BTreeMap<String, WorkflowDefinition>,

    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowCatalog {
    /// Load a catalog from a `.yaml`/`.yml` or `.json` file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let catalog = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_yaml_str(&content)?,
        };

        info!(
            path = %path.display(),
            version = %catalog.version,
            workflows = catalog.workflows.len(),
            "Loaded workflow catalog"
        );
        Ok(catalog)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_yaml::from_str(content)?;
        catalog.check()?;
        Ok(catalog)
    }

    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(content)?;
        catalog.check()?;
        Ok(catalog)
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.version.trim().is_empty() {
            return Err(CatalogError::Invalid("version must not be empty".to_string()));
        }
        // Fail at load time rather than on the first escalation
        self.resolver_table()?;
        Ok(())
    }

    #[must_use]
    pub fn workflow(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(name)
    }

    /// Names of enabled workflows, sorted by name
    pub fn enabled_workflows(&self) -> impl Iterator<Item = &str> {
        self.workflows
            .iter()
            .filter(|(_, def)| def.enabled)
            .map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn ping_retry_count(&self) -> u32 {
        let count = self.u64_value(keys::PING_RETRY_COUNT, u64::from(DEFAULT_PING_RETRY_COUNT));
        u32::try_from(count).unwrap_or(DEFAULT_PING_RETRY_COUNT).max(1)
    }

    #[must_use]
    pub fn top_process_count(&self) -> usize {
        let count = self.u64_value(keys::TOP_PROCESS_COUNT, DEFAULT_TOP_PROCESS_COUNT as u64);
        usize::try_from(count).unwrap_or(DEFAULT_TOP_PROCESS_COUNT)
    }

    /// Cluster name markers, `None` when the setting is absent
    #[must_use]
    pub fn cluster_markers(&self) -> Option<Vec<String>> {
        self.value(keys::CLUSTER_MARKERS)
            .and_then(serde_json::Value::as_array)
            .map(|markers| {
                markers
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
    }

    pub fn resolver_table(&self) -> Result<ResolverTable, CatalogError> {
        ResolverTable::from_setting(self.value(keys::RESOLVER_GROUPS))
    }

    /// Report every required `(workflow, statuses)` pair without a template
    pub fn missing_templates<'a, I>(&self, requirements: I) -> Vec<MissingTemplate>
    where
        I: IntoIterator<Item = (&'a str, &'a [&'a str])>,
    {
        let mut missing = Vec::new();
        for (workflow, statuses) in requirements {
            for status in statuses {
                if self.template(workflow, status).is_none() {
                    missing.push(MissingTemplate {
                        workflow: workflow.to_string(),
                        status: (*status).to_string(),
                    });
                }
            }
        }

        for entry in &missing {
            warn!(workflow = %entry.workflow, status = %entry.status, "Missing payload template");
        }
        missing
    }
}

impl ConfigStore for WorkflowCatalog {
    fn template(&self, workflow: &str, status: &str) -> Option<&PayloadTemplate> {
        self.workflows.get(workflow)?.statuses.get(status)
    }

    fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }
}
