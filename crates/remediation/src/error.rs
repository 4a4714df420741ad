//! Error types for the remediation engine.
//!
//! Each collaborator boundary (transport, gateway, action, formatter, catalog)
//! has its own error enum. The state machine decides per error whether the
//! incident is escalated, the update is skipped, or the run is aborted.

use thiserror::Error;

/// Errors raised by the remote-execution transports (ping, SSH, WinRM).
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The local helper binary could not be started
    #[error("Failed to launch {program}: {details}")]
    Launch { program: String, details: String },

    /// The remote command ran but exited unsuccessfully
    #[error("Remote command on {host} exited with {code:?}: {stderr}")]
    CommandFailed {
        host: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The transport gave up waiting for the remote side
    #[error("Timed out talking to {host}")]
    Timeout { host: String },

    /// Anything else reported by the transport
    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Get error category as string
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Launch { .. } => "launch_failure",
            TransportError::CommandFailed { .. } => "command_failure",
            TransportError::Timeout { .. } => "timeout_error",
            TransportError::Other(_) => "transport_error",
        }
    }
}

/// Errors raised by the ticketing system gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The ticketing system answered with a non-success status code
    #[error("Ticketing system returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Gateway is missing required configuration
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    /// Get error category as string
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Http(_) => "http_error",
            GatewayError::Status { .. } => "status_error",
            GatewayError::Decode(_) => "decode_error",
            GatewayError::NotConfigured(_) => "configuration_error",
        }
    }
}

/// Errors raised by a remediation action that the action itself could not
/// turn into an escalation.
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    /// Device configuration lacks a field the action depends on
    #[error("Required field '{field}' is missing for {workflow}")]
    MissingField { workflow: String, field: String },

    /// A field is present but cannot be interpreted
    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },

    /// Unexpected transport failure surfaced to the engine
    #[error("Transport failure during action: {0}")]
    Transport(#[from] TransportError),
}

impl ActionError {
    /// Get error category as string
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            ActionError::MissingField { .. } => "missing_data",
            ActionError::InvalidValue { .. } => "invalid_data",
            ActionError::Transport(_) => "transport_error",
        }
    }
}

/// Errors raised while rendering payload templates.
#[derive(Error, Debug)]
pub enum FormatError {
    /// Template text could not be compiled or rendered
    #[error("Failed to render {field} for {workflow}/{status}: {details}")]
    Render {
        workflow: String,
        status: String,
        field: String,
        details: String,
    },
}

/// Errors raised while loading the workflow catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog file could not be read
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Catalog document could not be parsed
    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    /// Catalog document parsed but its contents are unusable
    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for CatalogError {
    fn from(err: serde_yaml::Error) -> Self {
        CatalogError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Parse(err.to_string())
    }
}

/// Umbrella error for a single incident run.
#[derive(Error, Debug)]
pub enum RemediationError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Device configuration failed validation at the parser boundary
    #[error("Invalid device configuration: missing {0}")]
    InvalidConfig(&'static str),
}

impl RemediationError {
    /// Get error category as string
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            RemediationError::Transport(e) => e.category(),
            RemediationError::Gateway(e) => e.category(),
            RemediationError::Action(e) => e.category(),
            RemediationError::Format(_) => "template_error",
            RemediationError::Catalog(_) => "configuration_error",
            RemediationError::InvalidConfig(_) => "missing_data",
        }
    }
}

/// Type alias for results within the engine
pub type RemediationResult<T> = Result<T, RemediationError>;
