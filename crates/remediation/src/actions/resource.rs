//! CPU/Memory usage check: measure, compare to threshold, list top consumers.

use async_trait::async_trait;
use tracing::{info, warn};

use super::commands;
use super::{required_field, ActionContext, ActionOutcome, RemediationAction, CPU_MEMORY_WORKFLOW};
use crate::error::ActionError;
use crate::formatter::ResultExtra;
use crate::patterns::{first_number, PS_ROW_PATTERN};
use crate::types::{status, AlertType, DeviceConfig, ProcessSample};

/// Measures total CPU or memory usage and escalates above the threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsageAction;

#[async_trait]
impl RemediationAction for ResourceUsageAction {
    fn name(&self) -> &'static str {
        CPU_MEMORY_WORKFLOW
    }

    fn statuses(&self) -> &'static [&'static str] {
        &[
            status::RESOLVED,
            status::ESCALATE,
            status::ESCALATE_DEVICE_UNREACHABLE,
        ]
    }

    async fn remediate(
        &self,
        config: &mut DeviceConfig,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let alert = match &config.alert_type {
            Some(alert @ (AlertType::Cpu | AlertType::Memory)) => alert.clone(),
            other => {
                return Err(ActionError::InvalidValue {
                    field: "alertType".to_string(),
                    value: other.as_ref().map(ToString::to_string).unwrap_or_default(),
                })
            }
        };
        let threshold_text =
            required_field(config.threshold_value.as_deref(), CPU_MEMORY_WORKFLOW, "thresholdValue")?;
        let threshold = parse_percent(threshold_text).ok_or_else(|| ActionError::InvalidValue {
            field: "thresholdValue".to_string(),
            value: threshold_text.to_string(),
        })?;
        let host = required_field(config.device_name.as_deref(), CPU_MEMORY_WORKFLOW, "deviceName")?
            .to_string();

        let Some(output) = measure(&host, config.is_linux, &alert, ctx).await else {
            config.failure_type = Some(config.transport_failure_label().to_string());
            config.result_time = Some(ctx.retry_count);
            warn!(device = %host, alert = %alert, "No usage measurement returned");
            return Ok(ActionOutcome::escalated(status::ESCALATE_DEVICE_UNREACHABLE, None));
        };

        let usage = first_number(&output).ok_or_else(|| ActionError::InvalidValue {
            field: "totalUsage".to_string(),
            value: output.trim().to_string(),
        })?;
        config.total_usage = Some(format_usage(usage));

        if usage <= threshold {
            info!(device = %host, alert = %alert, usage, threshold, "Usage within threshold");
            return Ok(ActionOutcome::resolved(status::RESOLVED, None));
        }

        info!(device = %host, alert = %alert, usage, threshold, "Usage above threshold");
        let extra = top_consumers(&host, config.is_linux, &alert, ctx).await;
        Ok(ActionOutcome::escalated(status::ESCALATE, Some(extra)))
    }
}

/// Non-empty measurement output, transport errors counting as no output
async fn measure(host: &str, is_linux: bool, alert: &AlertType, ctx: &ActionContext<'_>) -> Option<String> {
    let result = if is_linux {
        ctx.transport
            .run_ssh(host, commands::linux_usage(alert), false)
            .await
    } else {
        ctx.transport
            .run_winrm_script(host, commands::windows_usage(alert))
            .await
    };

    match result {
        Ok(output) => output.filter(|o| !o.trim().is_empty()),
        Err(e) => {
            warn!(device = host, error = %e, category = e.category(), "Usage measurement failed");
            None
        }
    }
}

/// Top consumers, or an empty listing when they cannot be collected
async fn top_consumers(
    host: &str,
    is_linux: bool,
    alert: &AlertType,
    ctx: &ActionContext<'_>,
) -> ResultExtra {
    let count = ctx.top_process_count;
    if is_linux {
        let command = commands::linux_top_processes(alert, count);
        match ctx.transport.run_ssh(host, &command, false).await {
            Ok(Some(output)) => ResultExtra::Processes(parse_ps_rows(&output, count)),
            Ok(None) => ResultExtra::Processes(Vec::new()),
            Err(e) => {
                warn!(device = host, error = %e, "Failed to list top processes");
                ResultExtra::Processes(Vec::new())
            }
        }
    } else {
        let script = commands::windows_top_processes(alert, count);
        match ctx.transport.run_winrm_script(host, &script).await {
            Ok(output) => ResultExtra::Listing(output.unwrap_or_default()),
            Err(e) => {
                warn!(device = host, error = %e, "Failed to list top processes");
                ResultExtra::Listing(String::new())
            }
        }
    }
}

/// Parse `ps -eo pid,comm,%cpu` output, skipping the header
pub fn parse_ps_rows(output: &str, limit: usize) -> Vec<ProcessSample> {
    output
        .lines()
        .filter_map(|line| PS_ROW_PATTERN.captures(line))
        .take(limit)
        .map(|caps| ProcessSample::new(&caps[1], caps[2].trim(), format!("{}%", &caps[3])))
        .collect()
}

fn parse_percent(text: &str) -> Option<f64> {
    text.trim().trim_end_matches('%').trim().parse().ok()
}

/// `60.00` → `60`, `42.50` → `42.5`
fn format_usage(value: f64) -> String {
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
