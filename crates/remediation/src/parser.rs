//! Heuristic `Label: value` parser for incident descriptions.

use tracing::debug;

use crate::gateway::Incident;
use crate::patterns::LABEL_PATTERN;
use crate::types::{AlertType, DeviceConfig, FieldValue};

/// Canonical slot a description label maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    DeviceName,
    AlertType,
    ThresholdValue,
    ServiceName,
    SysId,
    IncidentId,
    IsLinux,
    LinuxCondition,
    Cluster,
    Subcategory,
    ResolverGroup,
    Resolver,
    MailAddress,
}

/// Normalized label → slot. Labels are compared after lowercasing and
/// dropping spaces, underscores and hyphens, so `Device Name`,
/// `device_name` and `deviceName` are the same label.
const LABEL_ALIASES: &[(&str, Slot)] = &[
    ("devicename", Slot::DeviceName),
    ("hostname", Slot::DeviceName),
    ("servername", Slot::DeviceName),
    ("host", Slot::DeviceName),
    ("alerttype", Slot::AlertType),
    ("thresholdvalue", Slot::ThresholdValue),
    ("threshold", Slot::ThresholdValue),
    ("servicename", Slot::ServiceName),
    ("sysid", Slot::SysId),
    ("incidentid", Slot::IncidentId),
    ("incidentnumber", Slot::IncidentId),
    ("islinux", Slot::IsLinux),
    ("linux", Slot::IsLinux),
    ("linuxcondition", Slot::LinuxCondition),
    ("cluster", Slot::Cluster),
    ("iscluster", Slot::Cluster),
    ("subcategory", Slot::Subcategory),
    ("resolvergroup", Slot::ResolverGroup),
    ("resolver", Slot::Resolver),
    ("mailaddress", Slot::MailAddress),
];

const DEFAULT_CLUSTER_MARKERS: &[&str] = &["vault", "sql"];
const LINUX_NAME_MARKER: &str = "lnx";

/// Characters besides whitespace that may separate a value from the next label
const LABEL_SEPARATORS: [char; 2] = [',', ';'];

/// Words that make a text value truthy
const TRUTHY_WORDS: &[&str] = &["yes", "y", "1", "linux"];

fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn lookup_slot(label: &str) -> Option<Slot> {
    let normalized = normalize_label(label);
    LABEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, slot)| *slot)
}

/// A located label: where the label text starts and where its value starts
#[derive(Debug)]
struct LabelSpan<'a> {
    start: usize,
    value_start: usize,
    label: &'a str,
}

/// Parser from free-text incident descriptions to [`DeviceConfig`].
///
/// Never fails: unrecognised or malformed input yields missing fields, and
/// callers validate the result with [`DeviceConfig::require_sys_id`] and
/// [`DeviceConfig::require_device_name`].
#[derive(Debug, Clone)]
pub struct IncidentParser {
    cluster_markers: Vec<String>,
}

impl Default for IncidentParser {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_MARKERS.iter().map(ToString::to_string))
    }
}

impl IncidentParser {
    /// Create a parser flagging device names containing any marker as cluster members
    pub fn new(cluster_markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            cluster_markers: cluster_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Parse a description into a device configuration
    pub fn parse(&self, description: &str) -> DeviceConfig {
        let mut config = DeviceConfig::default();
        let mut linux_hint = false;
        let mut explicit_linux: Option<bool> = None;
        let mut explicit_cluster: Option<bool> = None;

        for (label, value) in Self::segments(description) {
            let field = FieldValue::coerce(value);
            match lookup_slot(label) {
                Some(Slot::DeviceName) => config.device_name = non_empty(value),
                Some(Slot::AlertType) => {
                    config.alert_type = non_empty(value).map(|v| AlertType::parse(&v));
                }
                Some(Slot::ThresholdValue) => config.threshold_value = non_empty(value),
                Some(Slot::ServiceName) => config.service_name = non_empty(value),
                Some(Slot::SysId) => config.sys_id = non_empty(value),
                Some(Slot::IncidentId) => config.incident_id = non_empty(value),
                Some(Slot::Subcategory) => config.subcategory = non_empty(value),
                Some(Slot::ResolverGroup) => config.resolver_group = non_empty(value),
                Some(Slot::Resolver) => config.resolver = non_empty(value),
                Some(Slot::MailAddress) => config.mail_address = non_empty(value),
                Some(Slot::IsLinux) => explicit_linux = Some(truthy(&field)),
                Some(Slot::LinuxCondition) => linux_hint |= truthy(&field),
                Some(Slot::Cluster) => explicit_cluster = Some(truthy(&field)),
                None => {
                    config.extras.insert(label.trim().to_string(), field);
                }
            }
        }

        let device = config
            .device_name
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();

        config.is_linux = explicit_linux.unwrap_or(linux_hint || device.contains(LINUX_NAME_MARKER));
        config.is_cluster = explicit_cluster.unwrap_or_else(|| {
            !device.is_empty() && self.cluster_markers.iter().any(|m| device.contains(m))
        });

        debug!(
            device = config.device_label(),
            is_linux = config.is_linux,
            is_cluster = config.is_cluster,
            extras = config.extras.len(),
            "Parsed incident description"
        );

        config
    }

    /// Parse an incident row and attach its ticket identity
    pub fn parse_incident(&self, incident: &Incident) -> DeviceConfig {
        let mut config = self.parse(incident.description.as_deref().unwrap_or_default());
        config.attach_incident(&incident.sys_id, incident.number.as_deref());
        if config.subcategory.is_none() {
            config.subcategory.clone_from(&incident.subcategory);
        }
        config
    }

    /// Split text into `(label, value)` pairs, values running to the next label.
    ///
    /// The `,`/`;` that separates a value from the next label is not part of
    /// the value.
    fn segments(text: &str) -> Vec<(&str, &str)> {
        let spans = Self::label_spans(text);
        spans
            .iter()
            .enumerate()
            .map(|(i, span)| {
                let end = spans.get(i + 1).map_or(text.len(), |next| next.start);
                let value = text[span.value_start..end]
                    .trim()
                    .trim_end_matches(LABEL_SEPARATORS)
                    .trim_end();
                (span.label, value)
            })
            .collect()
    }

    fn label_spans(text: &str) -> Vec<LabelSpan<'_>> {
        let mut spans = Vec::new();
        let mut search_from = 0;

        while let Some(caps) = LABEL_PATTERN.captures_at(text, search_from) {
            let (Some(whole), Some(group)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            search_from = whole.end();

            // Path and URL separators (`C:\`, `https://`) are not labels
            let rest = &text[whole.end()..];
            if rest.starts_with('/') || rest.starts_with('\\') {
                continue;
            }

            let (start, label) = Self::split_label(text, group.start(), group.as_str());
            spans.push(LabelSpan {
                start,
                value_start: whole.end(),
                label,
            });
        }

        spans
    }

    /// When a candidate label shares its line with the previous value
    /// (`Device Name: srv01 Alert Type: CPU`), keep only the longest suffix
    /// that is a known label and leave the leading words to the value.
    fn split_label<'a>(text: &'a str, start: usize, candidate: &'a str) -> (usize, &'a str) {
        let line_prefix = text[..start].rsplit('\n').next().unwrap_or_default();
        if line_prefix.trim().is_empty() {
            return (start, candidate);
        }

        let offsets = candidate
            .char_indices()
            .filter(|(i, c)| {
                !c.is_whitespace()
                    && (*i == 0 || candidate[..*i].ends_with(char::is_whitespace))
            })
            .map(|(i, _)| i);

        for offset in offsets {
            let suffix = &candidate[offset..];
            if lookup_slot(suffix).is_some() {
                return (start + offset, suffix);
            }
        }
        (start, candidate)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// True for `true` flags, or text that is exactly one of [`TRUTHY_WORDS`]
/// or a plain description naming linux (`Linux Server`). Any negation
/// (`not linux`, `no`) is false.
fn truthy(value: &FieldValue) -> bool {
    if let Some(flag) = value.as_flag() {
        return flag;
    }
    let text = value.to_text().to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.iter().any(|w| matches!(*w, "not" | "no" | "non" | "false" | "n" | "0")) {
        return false;
    }
    match words.as_slice() {
        [single] => TRUTHY_WORDS.contains(single),
        _ => words.contains(&"linux"),
    }
}
