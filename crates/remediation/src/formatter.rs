//! Payload rendering: status templates substituted with incident context.
//!
//! Templates use Handlebars `{{NAME}}` placeholders. Documents carrying the
//! older single-brace `{NAME}` form are rendered through a plain
//! substitution path. Missing context values render as empty text.

use handlebars::Handlebars;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ConfigStore, PayloadTemplate};
use crate::error::FormatError;
use crate::gateway::Payload;
use crate::patterns::LEGACY_PLACEHOLDER_PATTERN;
use crate::types::{status, DeviceConfig, ProcessSample};

/// Cell opening tag expected by the ticket's notes renderer
pub const TABLE_CELL_OPEN: &str =
    "<td style='font-family: calibri, tahoma, verdana; color: black; height: 10px;'>";
const TABLE_CELL_CLOSE: &str = "</td>";

/// Record and field separators of the remote process listing
pub const LISTING_RECORD_SEPARATOR: &str = "~~~";
pub const LISTING_FIELD_SEPARATOR: &str = "|||";

/// Placeholder carrying the action's formatted result
pub const PROCESS_RESULT: &str = "PROCESS_RESULT";

/// Result detail produced by a remediation action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultExtra {
    /// Top consumers, rendered as table rows
    Processes(Vec<ProcessSample>),
    /// Delimited listing (`field|||field~~~...`), rendered as table rows
    Listing(String),
    /// Free text inserted as is
    Text(String),
}

/// Renders [`Payload`]s for workflow statuses
pub struct PayloadFormatter {
    store: Arc<dyn ConfigStore>,
    handlebars: Handlebars<'static>,
}

impl PayloadFormatter {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // Notes carry HTML tables
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { store, handlebars }
    }

    /// Resolve the payload for a workflow status.
    ///
    /// Returns `Ok(None)` when the catalog has no template for the status.
    pub fn resolve(
        &self,
        workflow: &str,
        status_name: &str,
        context: &DeviceConfig,
        extra: Option<&ResultExtra>,
    ) -> Result<Option<Payload>, FormatError> {
        let Some(template) = self.store.template(workflow, status_name) else {
            debug!(workflow, status = status_name, "No payload template for status");
            return Ok(None);
        };

        let values = context_values(context, extra);
        let render = |field: &str, text: &str| -> Result<String, FormatError> {
            self.render_text(text, &values).map_err(|details| FormatError::Render {
                workflow: workflow.to_string(),
                status: status_name.to_string(),
                field: field.to_string(),
                details,
            })
        };

        let mut payload = Self::render_template(template, &render)?;
        if status::is_escalation(status_name) && payload.assignment_group.is_none() {
            payload.assignment_group.clone_from(&context.resolver_group);
        }
        Ok(Some(payload))
    }

    fn render_template<F>(template: &PayloadTemplate, render: &F) -> Result<Payload, FormatError>
    where
        F: Fn(&str, &str) -> Result<String, FormatError>,
    {
        let render_opt = |field: &str, text: Option<&String>| -> Result<Option<String>, FormatError> {
            text.map(|t| render(field, t)).transpose()
        };

        let mut fields = BTreeMap::new();
        for (name, text) in &template.fields {
            fields.insert(name.clone(), render(name, text)?);
        }
        let assignment_group = fields.remove("assignment_group");

        Ok(Payload {
            state: template.state.clone(),
            close_code: render_opt("closeCode", template.close_code.as_ref())?,
            close_notes: render_opt("closeNotes", template.close_notes.as_ref())?,
            work_notes: render_opt("workNotes", template.work_notes.as_ref())?,
            assignment_group,
            fields,
        })
    }

    fn render_text(&self, text: &str, values: &BTreeMap<String, String>) -> Result<String, String> {
        if !text.contains("{{") {
            return Ok(render_legacy(text, values));
        }
        self.handlebars
            .render_template(text, values)
            .map_err(|e| e.to_string())
    }
}

/// Single-brace substitution for legacy documents
fn render_legacy(text: &str, values: &BTreeMap<String, String>) -> String {
    LEGACY_PLACEHOLDER_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Placeholder values for a device configuration and optional action result
pub fn context_values(context: &DeviceConfig, extra: Option<&ResultExtra>) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();

    // Extras first so dedicated fields win on name clashes
    for (key, value) in &context.extras {
        let name = placeholder_name(key);
        if !name.is_empty() {
            values.insert(name, value.to_text());
        }
    }

    let fields: [(&str, Option<String>); 14] = [
        ("DEVICE_NAME", context.device_name.clone()),
        ("ALERT_TYPE", context.alert_type.as_ref().map(ToString::to_string)),
        ("THRESHOLD_VALUE", context.threshold_value.clone()),
        ("SERVICE_NAME", context.service_name.clone()),
        ("SYS_ID", context.sys_id.clone()),
        ("INCIDENT_ID", context.incident_id.clone()),
        ("SUBCATEGORY", context.subcategory.clone()),
        ("RESOLVER_GROUP", context.resolver_group.clone()),
        ("RESOLVER", context.resolver.clone()),
        ("MAIL_ADDRESS", context.mail_address.clone()),
        ("TOTAL_USAGE", context.total_usage.clone()),
        ("FAILURE_TYPE", context.failure_type.clone()),
        ("RESULT_TIME", context.result_time.map(|t| t.to_string())),
        (PROCESS_RESULT, extra.map(render_extra)),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            values.insert(name.to_string(), value);
        }
    }
    values
}

/// `Auto Heal` → `AUTO_HEAL`
fn placeholder_name(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Render an action result as the text substituted for `PROCESS_RESULT`
pub fn render_extra(extra: &ResultExtra) -> String {
    match extra {
        ResultExtra::Processes(samples) => render_process_table(samples),
        ResultExtra::Listing(listing) => render_listing_table(listing),
        ResultExtra::Text(text) => text.clone(),
    }
}

/// One `<tr>` per sample: sequence number, then pid, name and usage
pub fn render_process_table(samples: &[ProcessSample]) -> String {
    table_or_empty(samples.iter().map(|s| s.fields().map(str::to_string).to_vec()))
}

/// One `<tr>` per record of a `|||`/`~~~` delimited listing
pub fn render_listing_table(listing: &str) -> String {
    table_or_empty(parse_listing(listing))
}

/// Split a delimited listing into records of trimmed fields
pub fn parse_listing(listing: &str) -> Vec<Vec<String>> {
    listing
        .replace("\r\n", "")
        .split(LISTING_RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .map(|record| {
            record
                .split(LISTING_FIELD_SEPARATOR)
                .map(|field| field.trim().to_string())
                .collect()
        })
        .collect()
}

fn table_or_empty<I>(rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    match write_rows(rows) {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, "Failed to build result table, using empty table");
            String::new()
        }
    }
}

fn write_rows<I>(rows: I) -> Result<String, std::fmt::Error>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut out = String::new();
    for (index, fields) in rows.into_iter().enumerate() {
        out.push_str("<tr>");
        write!(out, "{TABLE_CELL_OPEN}{}", index + 1)?;
        for field in &fields {
            write!(out, "{TABLE_CELL_CLOSE}{TABLE_CELL_OPEN}{field}")?;
        }
        out.push_str(TABLE_CELL_CLOSE);
        out.push_str("</tr>");
    }
    Ok(out)
}
