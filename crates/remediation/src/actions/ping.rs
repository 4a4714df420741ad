//! Ping response: capture a ping transcript, then ensure the service runs.

use async_trait::async_trait;
use tracing::warn;

use super::service::{ensure_service, SERVICE_STATUSES};
use super::{required_field, ActionContext, ActionOutcome, RemediationAction, PING_RESPONSE_WORKFLOW};
use crate::error::ActionError;
use crate::formatter::ResultExtra;
use crate::types::DeviceConfig;

const TRANSCRIPT_ECHO_COUNT: u32 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct PingResponseAction;

#[async_trait]
impl RemediationAction for PingResponseAction {
    fn name(&self) -> &'static str {
        PING_RESPONSE_WORKFLOW
    }

    fn statuses(&self) -> &'static [&'static str] {
        SERVICE_STATUSES
    }

    async fn remediate(
        &self,
        config: &mut DeviceConfig,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let host = required_field(config.device_name.as_deref(), PING_RESPONSE_WORKFLOW, "deviceName")?;

        let transcript = match ctx.transport.ping_output(host, TRANSCRIPT_ECHO_COUNT).await {
            Ok(output) => output.unwrap_or_default(),
            Err(e) => {
                warn!(device = host, error = %e, "Failed to capture ping transcript");
                String::new()
            }
        };

        ensure_service(
            config,
            ctx,
            PING_RESPONSE_WORKFLOW,
            Some(ResultExtra::Text(transcript.trim().to_string())),
        )
        .await
    }
}
