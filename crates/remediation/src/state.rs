//! Remediation state machine shared by every workflow.
//!
//! A run drives one incident through
//! `NEW → WIP → PROBING → (REACHABLE | UNREACHABLE) → ACTING → (RESOLVED | ESCALATED)`,
//! resolving and sending the payload for each status it reaches. Every
//! collaborator failure is contained in the run and recorded on the
//! returned [`RunReport`]; nothing propagates to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::actions::{ActionContext, ActionOutcome, RemediationAction};
use crate::config::{
    ConfigStore, WorkflowCatalog, DEFAULT_PING_RETRY_COUNT, DEFAULT_TOP_PROCESS_COUNT,
};
use crate::error::{ActionError, RemediationError};
use crate::formatter::{PayloadFormatter, ResultExtra};
use crate::gateway::IncidentGateway;
use crate::probe::{ReachabilityProber, RemoteTransport};
use crate::routing::ResolverTable;
use crate::types::{status, DeviceConfig, ReachabilityResult, WorkflowState};

/// Tracing target of end-of-run metric events
pub const METRICS_TARGET: &str = "remediation::metrics";

/// Retry and listing limits applied to every run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub ping_retry_count: u32,
    pub top_process_count: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ping_retry_count: DEFAULT_PING_RETRY_COUNT,
            top_process_count: DEFAULT_TOP_PROCESS_COUNT,
        }
    }
}

impl EngineSettings {
    pub fn from_catalog(catalog: &WorkflowCatalog) -> Self {
        Self {
            ping_retry_count: catalog.ping_retry_count(),
            top_process_count: catalog.top_process_count(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    Resolved,
    Escalated,
    /// The run stopped without a terminal ticket update
    Aborted(String),
}

/// Record of a single incident run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub workflow: String,
    pub sys_id: Option<String>,
    pub incident_id: Option<String>,
    pub final_state: WorkflowState,
    /// Terminal status the run selected, if it got that far
    pub status: Option<String>,
    pub reachability: Option<ReachabilityResult>,
    /// States visited, in order
    pub trail: Vec<WorkflowState>,
    /// Statuses whose update reached the ticketing system
    pub delivered: Vec<String>,
    pub outcome: RunOutcome,
    pub config: DeviceConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted(_))
    }
}

/// Outcome of resolving and sending one status update
enum Delivery {
    Sent,
    NoTemplate,
    Failed(RemediationError),
}

/// Mutable bookkeeping of one run
struct Run {
    state: WorkflowState,
    trail: Vec<WorkflowState>,
    status: Option<String>,
    reachability: Option<ReachabilityResult>,
    delivered: Vec<String>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: WorkflowState::New,
            trail: vec![WorkflowState::New],
            status: None,
            reachability: None,
            delivered: Vec::new(),
        }
    }

    fn advance(&mut self, next: WorkflowState) {
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        self.trail.push(next);
    }
}

/// Drives incidents through probing, remediation and ticket updates
pub struct RemediationStateMachine {
    formatter: PayloadFormatter,
    transport: Arc<dyn RemoteTransport>,
    gateway: Arc<dyn IncidentGateway>,
    resolvers: ResolverTable,
    settings: EngineSettings,
}

impl RemediationStateMachine {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn RemoteTransport>,
        gateway: Arc<dyn IncidentGateway>,
    ) -> Self {
        Self {
            formatter: PayloadFormatter::new(store),
            transport,
            gateway,
            resolvers: ResolverTable::default(),
            settings: EngineSettings::default(),
        }
    }

    /// Engine wired to a loaded catalog, with its routing table and settings
    pub fn from_catalog(
        catalog: Arc<WorkflowCatalog>,
        transport: Arc<dyn RemoteTransport>,
        gateway: Arc<dyn IncidentGateway>,
    ) -> Result<Self, RemediationError> {
        let resolvers = catalog.resolver_table()?;
        let settings = EngineSettings::from_catalog(&catalog);
        Ok(Self::new(catalog, transport, gateway)
            .with_resolvers(resolvers)
            .with_settings(settings))
    }

    #[must_use]
    pub fn with_resolvers(mut self, resolvers: ResolverTable) -> Self {
        self.resolvers = resolvers;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn formatter(&self) -> &PayloadFormatter {
        &self.formatter
    }

    /// Run one incident through `workflow` using `action` for remediation
    pub async fn run(
        &self,
        workflow: &str,
        action: &dyn RemediationAction,
        config: DeviceConfig,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "remediation_run",
            %run_id,
            workflow,
            incident = config.incident_id.as_deref().unwrap_or_default(),
        );
        self.run_inner(run_id, workflow, action, config)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        workflow: &str,
        action: &dyn RemediationAction,
        mut config: DeviceConfig,
    ) -> RunReport {
        let started_at = Utc::now();
        let mut run = Run::new();
        self.resolvers.apply(&mut config);

        let outcome = self.drive(&mut run, workflow, action, &mut config).await;
        match &outcome {
            RunOutcome::Aborted(reason) => {
                run.advance(WorkflowState::Aborted);
                warn!(device = config.device_label(), reason = %reason, "Remediation run aborted");
            }
            RunOutcome::Resolved | RunOutcome::Escalated => info!(
                device = config.device_label(),
                status = run.status.as_deref().unwrap_or_default(),
                final_state = %run.state,
                "Remediation run finished"
            ),
        }

        if let Some(result_time) = config.result_time {
            info!(
                target: METRICS_TARGET,
                workflow,
                device = config.device_label(),
                status = run.status.as_deref().unwrap_or_default(),
                failure_type = config.failure_type.as_deref().unwrap_or_default(),
                result_time,
                "Remediation metric"
            );
        }

        RunReport {
            run_id,
            workflow: workflow.to_string(),
            sys_id: config.sys_id.clone(),
            incident_id: config.incident_id.clone(),
            final_state: run.state,
            status: run.status,
            reachability: run.reachability,
            trail: run.trail,
            delivered: run.delivered,
            outcome,
            config,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn drive(
        &self,
        run: &mut Run,
        workflow: &str,
        action: &dyn RemediationAction,
        config: &mut DeviceConfig,
    ) -> RunOutcome {
        if let Err(e) = config.require_sys_id() {
            return RunOutcome::Aborted(e.to_string());
        }

        // WIP is advisory: the run continues whatever happens to it
        run.advance(WorkflowState::Wip);
        match self.deliver(workflow, status::WIP, config, None).await {
            Delivery::Sent => run.delivered.push(status::WIP.to_string()),
            Delivery::NoTemplate => debug!("No WIP template, continuing"),
            Delivery::Failed(e) => warn!(error = %e, category = e.category(), "WIP update failed, continuing"),
        }

        if config.is_cluster {
            info!(device = config.device_label(), "Clustered device, escalating without remediation");
            return self
                .finish(run, workflow, status::ESCALATE_CLUSTER_SERVERS, WorkflowState::Escalated, config, None)
                .await;
        }

        if let Err(e) = config.require_device_name() {
            return RunOutcome::Aborted(e.to_string());
        }

        run.advance(WorkflowState::Probing);
        let prober = ReachabilityProber::new(self.transport.as_ref());
        let reachability = match prober.probe(config, self.settings.ping_retry_count).await {
            Ok(result) => result,
            Err(e) => return RunOutcome::Aborted(e.to_string()),
        };
        run.reachability = Some(reachability);

        if !reachability.is_success() {
            run.advance(WorkflowState::Unreachable);
            config.failure_type = Some(reachability.label().to_string());
            config.result_time = Some(self.settings.ping_retry_count);
            return self
                .finish(
                    run,
                    workflow,
                    status::ESCALATE_DEVICE_UNREACHABLE,
                    WorkflowState::Escalated,
                    config,
                    None,
                )
                .await;
        }

        run.advance(WorkflowState::Reachable);
        run.advance(WorkflowState::Acting);
        let ctx = ActionContext {
            transport: self.transport.as_ref(),
            retry_count: self.settings.ping_retry_count,
            top_process_count: self.settings.top_process_count,
        };

        match action.remediate(config, &ctx).await {
            Ok(ActionOutcome::Resolved { status: reached, extra }) => {
                self.finish(run, workflow, &reached, WorkflowState::Resolved, config, extra.as_ref())
                    .await
            }
            Ok(ActionOutcome::Escalated { status: reached, extra }) => {
                self.finish(run, workflow, &reached, WorkflowState::Escalated, config, extra.as_ref())
                    .await
            }
            Err(ActionError::Transport(e)) => {
                warn!(error = %e, category = e.category(), "Remediation action failed, escalating");
                config.failure_type = Some(e.to_string());
                self.finish(run, workflow, status::ESCALATE, WorkflowState::Escalated, config, None)
                    .await
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "Remediation action rejected the incident");
                RunOutcome::Aborted(e.to_string())
            }
        }
    }

    /// Send the terminal update; the run only counts as finished once it lands
    async fn finish(
        &self,
        run: &mut Run,
        workflow: &str,
        status_name: &str,
        terminal: WorkflowState,
        config: &DeviceConfig,
        extra: Option<&ResultExtra>,
    ) -> RunOutcome {
        run.status = Some(status_name.to_string());
        match self.deliver(workflow, status_name, config, extra).await {
            Delivery::Sent => {
                run.delivered.push(status_name.to_string());
                run.advance(terminal);
                if terminal == WorkflowState::Resolved {
                    RunOutcome::Resolved
                } else {
                    RunOutcome::Escalated
                }
            }
            Delivery::NoTemplate => {
                warn!(status = status_name, "No payload template for terminal status, skipping update");
                RunOutcome::Aborted(format!("no template for {workflow}/{status_name}"))
            }
            Delivery::Failed(e) => {
                error!(status = status_name, error = %e, category = e.category(), "Terminal update failed");
                RunOutcome::Aborted(e.to_string())
            }
        }
    }

    async fn deliver(
        &self,
        workflow: &str,
        status_name: &str,
        config: &DeviceConfig,
        extra: Option<&ResultExtra>,
    ) -> Delivery {
        let sys_id = match config.require_sys_id() {
            Ok(id) => id,
            Err(e) => return Delivery::Failed(e),
        };
        let payload = match self.formatter.resolve(workflow, status_name, config, extra) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Delivery::NoTemplate,
            Err(e) => return Delivery::Failed(e.into()),
        };

        match self.gateway.update(sys_id, &payload).await {
            Ok(()) => {
                info!(sys_id, status = status_name, "Incident updated");
                Delivery::Sent
            }
            Err(e) => Delivery::Failed(e.into()),
        }
    }
}
