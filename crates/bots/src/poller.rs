//! Periodic sweep: search each enabled workflow's incidents and run them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use remediation::actions::{self, RemediationAction};
use remediation::{
    IncidentGateway, IncidentParser, RemediationError, RemediationStateMachine, RemoteTransport,
    RunOutcome, WorkflowCatalog,
};

/// Counters for one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub workflows: usize,
    pub incidents: usize,
    pub resolved: usize,
    pub escalated: usize,
    pub aborted: usize,
    pub search_failures: usize,
}

struct ActiveWorkflow {
    name: String,
    filter: String,
    action: Box<dyn RemediationAction>,
}

pub struct Poller {
    gateway: Arc<dyn IncidentGateway>,
    engine: RemediationStateMachine,
    parser: IncidentParser,
    workflows: Vec<ActiveWorkflow>,
}

impl Poller {
    /// Build a poller for the enabled workflows, narrowed to `selected`
    /// when it is non-empty.
    ///
    /// Workflows without a built-in action or without filters are skipped
    /// with a warning.
    pub fn new(
        catalog: Arc<WorkflowCatalog>,
        transport: Arc<dyn RemoteTransport>,
        gateway: Arc<dyn IncidentGateway>,
        selected: &[String],
    ) -> Result<Self, RemediationError> {
        let parser = catalog
            .cluster_markers()
            .map(IncidentParser::new)
            .unwrap_or_default();

        let mut workflows = Vec::new();
        for name in catalog.enabled_workflows() {
            if !selected.is_empty() && !selected.iter().any(|s| s == name) {
                continue;
            }
            let Some(def) = catalog.workflow(name) else {
                continue;
            };
            let action_name = def.action_name(name);
            let Some(action) = actions::builtin(action_name) else {
                warn!(workflow = name, action = action_name, "No built-in action, skipping workflow");
                continue;
            };
            let Some(filter) = def.combined_filter() else {
                warn!(workflow = name, "Workflow has no search filters, skipping");
                continue;
            };
            workflows.push(ActiveWorkflow {
                name: name.to_string(),
                filter,
                action,
            });
        }

        let engine = RemediationStateMachine::from_catalog(catalog, transport, Arc::clone(&gateway))?;
        Ok(Self {
            gateway,
            engine,
            parser,
            workflows,
        })
    }

    pub fn workflow_names(&self) -> Vec<&str> {
        self.workflows.iter().map(|w| w.name.as_str()).collect()
    }

    /// One pass over every active workflow. Incidents run one at a time.
    pub async fn sweep(&self) -> SweepSummary {
        let mut summary = SweepSummary {
            workflows: self.workflows.len(),
            ..SweepSummary::default()
        };

        for workflow in &self.workflows {
            let incidents = match self.gateway.search(&workflow.filter).await {
                Ok(incidents) => incidents,
                Err(e) => {
                    error!(
                        workflow = %workflow.name,
                        error = %e,
                        category = e.category(),
                        "Incident search failed"
                    );
                    summary.search_failures += 1;
                    continue;
                }
            };
            info!(workflow = %workflow.name, count = incidents.len(), "Found incidents");

            for incident in &incidents {
                let config = self.parser.parse_incident(incident);
                let report = self
                    .engine
                    .run(&workflow.name, workflow.action.as_ref(), config)
                    .await;
                summary.incidents += 1;
                match report.outcome {
                    RunOutcome::Resolved => summary.resolved += 1,
                    RunOutcome::Escalated => summary.escalated += 1,
                    RunOutcome::Aborted(_) => summary.aborted += 1,
                }
            }
        }

        info!(
            incidents = summary.incidents,
            resolved = summary.resolved,
            escalated = summary.escalated,
            aborted = summary.aborted,
            "Sweep complete"
        );
        summary
    }

    /// Sweep every `interval` until `shutdown` completes
    pub async fn run_until<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping poller");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use remediation::{GatewayError, Incident, Payload, TransportError};

    const CATALOG: &str = r#"
version: "poller-test"
settings:
  resolverGroups:
    others:
      resolverGroup: grp-ops
workflows:
  ServiceRestartRemediation:
    filters: ["short_descriptionLIKEservice"]
    statuses:
      WIP:
        state: 2
        workNotes: "Checking {{SERVICE_NAME}}"
      RUNNING:
        state: 6
        closeNotes: "{{SERVICE_NAME}} already running"
      RESOLVED:
        state: 6
        closeNotes: "{{SERVICE_NAME}} started"
      ESCALATE:
        workNotes: "Escalating {{SERVICE_NAME}}"
      ESCALATE_DEVICE_UNREACHABLE:
        workNotes: "{{DEVICE_NAME}} unreachable"
      ESCALATE_CLUSTER_SERVERS:
        workNotes: "Cluster device"
      RESTART_FAILURE:
        workNotes: "Restart failed"
  CustomWorkflow:
    filters: ["short_descriptionLIKEcustom"]
    statuses: {}
  DisabledWorkflow:
    enabled: false
    action: PingResponseRemediation
    filters: ["short_descriptionLIKEping"]
"#;

    #[derive(Default)]
    struct Gateway {
        incidents: Vec<Incident>,
        fail_search: bool,
        searches: Mutex<Vec<String>>,
        updates: Mutex<Vec<(String, Payload)>>,
    }

    #[async_trait]
    impl IncidentGateway for Gateway {
        async fn search(&self, filter: &str) -> Result<Vec<Incident>, GatewayError> {
            self.searches.lock().unwrap().push(filter.to_string());
            if self.fail_search {
                return Err(GatewayError::Http("connection refused".to_string()));
            }
            Ok(self.incidents.clone())
        }

        async fn update(&self, sys_id: &str, payload: &Payload) -> Result<(), GatewayError> {
            self.updates
                .lock()
                .unwrap()
                .push((sys_id.to_string(), payload.clone()));
            Ok(())
        }
    }

    /// Windows device that answers everything and reports the service running
    struct Transport;

    #[async_trait]
    impl RemoteTransport for Transport {
        async fn ping_reachable(&self, _: &str, _: u32) -> Result<bool, TransportError> {
            Ok(true)
        }
        async fn ssh_reachable(&self, _: &str) -> Result<bool, TransportError> {
            Ok(true)
        }
        async fn winrm_reachable(&self, _: &str) -> Result<bool, TransportError> {
            Ok(true)
        }
        async fn run_ssh(&self, _: &str, _: &str, _: bool) -> Result<Option<String>, TransportError> {
            Ok(Some("active".to_string()))
        }
        async fn run_winrm_script(&self, _: &str, _: &str) -> Result<Option<String>, TransportError> {
            Ok(Some("Running".to_string()))
        }
        async fn ping_output(&self, _: &str, _: u32) -> Result<Option<String>, TransportError> {
            Ok(Some("reply".to_string()))
        }
    }

    fn incident(sys_id: &str) -> Incident {
        Incident {
            sys_id: sys_id.to_string(),
            number: Some(format!("INC{sys_id}")),
            description: Some("Device Name: win01\nService Name: Spooler".to_string()),
            subcategory: None,
        }
    }

    fn poller(gateway: Arc<Gateway>, selected: &[String]) -> Poller {
        let catalog = Arc::new(WorkflowCatalog::from_yaml_str(CATALOG).unwrap());
        Poller::new(catalog, Arc::new(Transport), gateway, selected).unwrap()
    }

    #[test]
    fn test_only_enabled_builtin_workflows_are_active() {
        let poller = poller(Arc::new(Gateway::default()), &[]);
        assert_eq!(poller.workflow_names(), vec!["ServiceRestartRemediation"]);
    }

    #[test]
    fn test_selection_narrows_workflows() {
        let poller = poller(Arc::new(Gateway::default()), &["PingResponseRemediation".to_string()]);
        assert!(poller.workflow_names().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_runs_every_incident() {
        let gateway = Arc::new(Gateway {
            incidents: vec![incident("a1"), incident("b2")],
            ..Gateway::default()
        });
        let summary = poller(Arc::clone(&gateway), &[]).sweep().await;

        assert_eq!(summary.incidents, 2);
        assert_eq!(summary.resolved, 2);
        assert_eq!(
            gateway.searches.lock().unwrap().as_slice(),
            ["short_descriptionLIKEservice".to_string()]
        );

        let updates = gateway.updates.lock().unwrap();
        // WIP plus RUNNING per incident
        assert_eq!(updates.len(), 4);
        assert!(updates
            .iter()
            .any(|(id, p)| id == "b2" && p.close_notes.as_deref() == Some("Spooler already running")));
    }

    #[tokio::test]
    async fn test_failed_search_is_counted_not_fatal() {
        let gateway = Arc::new(Gateway {
            fail_search: true,
            ..Gateway::default()
        });
        let summary = poller(Arc::clone(&gateway), &[]).sweep().await;

        assert_eq!(summary.search_failures, 1);
        assert_eq!(summary.incidents, 0);
        assert!(gateway.updates.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_on_shutdown() {
        let gateway = Arc::new(Gateway::default());
        let poller = poller(Arc::clone(&gateway), &[]);

        poller
            .run_until(Duration::from_secs(60), tokio::time::sleep(Duration::from_secs(150)))
            .await;

        // Ticks at 0s, 60s and 120s
        assert_eq!(gateway.searches.lock().unwrap().len(), 3);
    }
}
