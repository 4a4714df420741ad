//! Escalation routing: which resolver group owns a device.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::types::DeviceConfig;

/// Owner class of a device, derived from its name and parsed flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    Linux,
    Sql,
    CommentCode,
    VaultAgent,
    Other,
}

impl DeviceClass {
    /// Classify a device. Later matches override earlier ones, so a Linux
    /// host named `lnx-vault-01` is owned by the vault agent team.
    #[must_use]
    pub fn classify(config: &DeviceConfig) -> Self {
        let name = config
            .device_name
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();

        let mut class = DeviceClass::Other;
        if config.is_linux {
            class = DeviceClass::Linux;
        }
        if name.contains("sql") {
            class = DeviceClass::Sql;
        }
        if name.contains("comment") {
            class = DeviceClass::CommentCode;
        }
        if name.contains("vault") {
            class = DeviceClass::VaultAgent;
        }
        class
    }

    /// Key of this class under `settings.resolverGroups`
    #[must_use]
    pub fn settings_key(self) -> &'static str {
        match self {
            DeviceClass::Linux => "lnx",
            DeviceClass::Sql => "sql",
            DeviceClass::CommentCode => "commentCode",
            DeviceClass::VaultAgent => "vaultAgent",
            DeviceClass::Other => "others",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.settings_key())
    }
}

/// Resolver group a class of devices escalates to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverRoute {
    /// Assignment group id written to the ticket
    pub resolver_group: String,
    /// Display name used in notes
    #[serde(default)]
    pub resolver: Option<String>,
    #[serde(default)]
    pub mail_address: Option<String>,
}

/// Class → resolver table, loaded from `settings.resolverGroups`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverTable {
    routes: BTreeMap<String, ResolverRoute>,
}

impl ResolverTable {
    /// Build the table from the catalog setting; an absent setting is an empty table
    pub fn from_setting(value: Option<&serde_json::Value>) -> Result<Self, CatalogError> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        let routes: BTreeMap<String, ResolverRoute> = serde_json::from_value(value.clone())
            .map_err(|e| CatalogError::Invalid(format!("resolverGroups: {e}")))?;
        Ok(Self { routes })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route for a class, falling back to the `others` entry
    #[must_use]
    pub fn route(&self, class: DeviceClass) -> Option<&ResolverRoute> {
        self.routes
            .get(class.settings_key())
            .or_else(|| self.routes.get(DeviceClass::Other.settings_key()))
    }

    /// Fill the routing fields the description did not already set
    pub fn apply(&self, config: &mut DeviceConfig) -> DeviceClass {
        let class = DeviceClass::classify(config);
        match self.route(class) {
            Some(route) => {
                if config.resolver_group.is_none() {
                    config.resolver_group = Some(route.resolver_group.clone());
                }
                if config.resolver.is_none() {
                    config.resolver.clone_from(&route.resolver);
                }
                if config.mail_address.is_none() {
                    config.mail_address.clone_from(&route.mail_address);
                }
                debug!(
                    device = config.device_label(),
                    class = %class,
                    resolver_group = %route.resolver_group,
                    "Routed device to resolver group"
                );
            }
            None if self.is_empty() => {}
            None => warn!(
                device = config.device_label(),
                class = %class,
                "No resolver group configured for device class"
            ),
        }
        class
    }
}
