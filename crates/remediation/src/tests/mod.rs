//! End-to-end runs of the state machine against fake collaborators


use std::sync::Arc;

use crate::actions::{self, ResourceUsageAction, ServiceRestartAction};
use crate::formatter::TABLE_CELL_OPEN;
use crate::parser::IncidentParser;
use crate::state::{RemediationStateMachine, RunOutcome};
use crate::types::{status, ReachabilityResult, WorkflowState};

use fixtures::*;

const CPU: &str = actions::CPU_MEMORY_WORKFLOW;
const SERVICE: &str = actions::SERVICE_RESTART_WORKFLOW;

fn engine(
    yaml: &str,
    transport: &Arc<FakeTransport>,
    gateway: &Arc<FakeGateway>,
) -> RemediationStateMachine {
    RemediationStateMachine::from_catalog(catalog(yaml), transport.clone(), gateway.clone())
        .unwrap()
}

fn parsed(sys_id: &str, description: &str) -> crate::types::DeviceConfig {
    IncidentParser::default().parse_incident(&incident(sys_id, description))
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_within_threshold_resolves() {
        let transport = Arc::new(FakeTransport::reachable().respond("win32_operatingsystem", "60"));
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(CPU, &ResourceUsageAction, parsed("s1", MEMORY_INCIDENT))
            .await;

        assert_eq!(report.outcome, RunOutcome::Resolved);
        assert_eq!(report.final_state, WorkflowState::Resolved);
        assert_eq!(report.status.as_deref(), Some(status::RESOLVED));
        assert_eq!(
            report.trail,
            vec![
                WorkflowState::New,
                WorkflowState::Wip,
                WorkflowState::Probing,
                WorkflowState::Reachable,
                WorkflowState::Acting,
                WorkflowState::Resolved,
            ]
        );

        let payload = gateway.last_payload();
        let notes = payload.close_notes.unwrap();
        assert!(notes.contains("MEMORY"));
        assert!(notes.contains("60 <= 80"));
        assert_eq!(payload.state.as_deref(), Some("6"));
        assert!(payload.assignment_group.is_none());
        assert_eq!(report.delivered, vec![status::WIP, status::RESOLVED]);
    }

    #[tokio::test]
    async fn test_memory_above_threshold_escalates_with_table() {
        let transport = Arc::new(
            FakeTransport::reachable()
                .respond("Get-Process", "4242|||w3wp|||35.50%~~~\r\n17|||sqlservr|||20.10%~~~\r\n")
                .respond("win32_operatingsystem", "95"),
        );
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(CPU, &ResourceUsageAction, parsed("s2", MEMORY_INCIDENT))
            .await;

        assert_eq!(report.outcome, RunOutcome::Escalated);
        assert_eq!(report.status.as_deref(), Some(status::ESCALATE));

        let payload = gateway.last_payload();
        let notes = payload.work_notes.unwrap();
        assert_eq!(notes.matches("<tr>").count(), 2);
        assert!(notes.contains(&format!("<tr>{TABLE_CELL_OPEN}1</td>{TABLE_CELL_OPEN}4242</td>")));
        assert!(notes.contains("above 80%"));
        assert_eq!(payload.assignment_group.as_deref(), Some("grp-win"));
    }

    #[tokio::test]
    async fn test_unreachable_device_escalates_without_action() {
        let transport = Arc::new(FakeTransport::unreachable());
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(CPU, &ResourceUsageAction, parsed("s3", MEMORY_INCIDENT))
            .await;

        assert_eq!(report.outcome, RunOutcome::Escalated);
        assert_eq!(report.status.as_deref(), Some(status::ESCALATE_DEVICE_UNREACHABLE));
        assert_eq!(report.reachability, Some(ReachabilityResult::PingFailure));
        assert_eq!(report.config.failure_type.as_deref(), Some("Ping Failure"));
        assert_eq!(report.config.result_time, Some(3));
        assert!(!report.trail.contains(&WorkflowState::Acting));
        assert!(report.trail.contains(&WorkflowState::Unreachable));

        assert_eq!(transport.calls(), vec!["ping:srv01:3"]);
        assert!(transport.commands().is_empty());

        let payload = gateway.last_payload();
        assert!(payload.work_notes.unwrap().contains("Ping Failure"));
        assert_eq!(payload.assignment_group.as_deref(), Some("grp-win"));
    }

    #[tokio::test]
    async fn test_windows_service_restart_resolves() {
        let transport = Arc::new(
            FakeTransport::reachable()
                .respond("$maxRepeat", "SUCCESS")
                .respond("Get-Service", "Stopped"),
        );
        let gateway = Arc::new(FakeGateway::new());
        let config = parsed("s4", SERVICE_INCIDENT);
        assert!(!config.is_linux);

        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(SERVICE, &ServiceRestartAction, config)
            .await;

        assert_eq!(report.outcome, RunOutcome::Resolved);
        assert_eq!(report.status.as_deref(), Some(status::RESOLVED));
        let payload = gateway.last_payload();
        assert!(payload.work_notes.unwrap().contains("MyService"));
    }

    #[tokio::test]
    async fn test_missing_resolved_template_aborts_cleanly() {
        let transport = Arc::new(FakeTransport::reachable().respond("win32_operatingsystem", "60"));
        let gateway = Arc::new(FakeGateway::new());
        let engine = engine(CATALOG_WITHOUT_RESOLVED, &transport, &gateway);

        let config = parsed("s5", MEMORY_INCIDENT);
        assert!(engine
            .formatter()
            .resolve(CPU, status::RESOLVED, &config, None)
            .unwrap()
            .is_none());

        let report = engine.run(CPU, &ResourceUsageAction, config).await;
        assert!(report.is_aborted());
        assert_eq!(report.final_state, WorkflowState::Aborted);
        assert_eq!(report.status.as_deref(), Some(status::RESOLVED));
        assert_eq!(report.delivered, vec![status::WIP]);
        assert_eq!(gateway.updates().len(), 1);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_cluster_device_skips_probe_and_action() {
        let transport = Arc::new(FakeTransport::reachable());
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(
                CPU,
                &ResourceUsageAction,
                parsed("c1", "Device Name: vault-agent-01\nAlert Type: CPU\nThreshold Value: 90"),
            )
            .await;

        assert_eq!(report.outcome, RunOutcome::Escalated);
        assert_eq!(report.status.as_deref(), Some(status::ESCALATE_CLUSTER_SERVERS));
        assert_eq!(
            report.trail,
            vec![WorkflowState::New, WorkflowState::Wip, WorkflowState::Escalated]
        );
        assert!(transport.calls().is_empty());
        assert!(report.reachability.is_none());
    }

    #[tokio::test]
    async fn test_wip_failure_is_not_fatal() {
        let transport = Arc::new(FakeTransport::reachable().respond("win32_operatingsystem", "10"));
        let gateway = Arc::new(FakeGateway::failing_first(1));
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(CPU, &ResourceUsageAction, parsed("w1", MEMORY_INCIDENT))
            .await;

        assert_eq!(report.outcome, RunOutcome::Resolved);
        assert_eq!(report.delivered, vec![status::RESOLVED]);
        assert_eq!(gateway.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_update_failure_aborts() {
        let transport = Arc::new(FakeTransport::unreachable());
        let gateway = Arc::new(FakeGateway::failing_first(2));
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(CPU, &ResourceUsageAction, parsed("g1", MEMORY_INCIDENT))
            .await;

        assert!(report.is_aborted());
        assert!(report.delivered.is_empty());
        match report.outcome {
            RunOutcome::Aborted(reason) => assert!(reason.contains("503")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_sys_id_aborts_before_any_update() {
        let transport = Arc::new(FakeTransport::reachable());
        let gateway = Arc::new(FakeGateway::new());
        let config = IncidentParser::default().parse(MEMORY_INCIDENT);
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(CPU, &ResourceUsageAction, config)
            .await;

        assert!(report.is_aborted());
        assert_eq!(report.trail, vec![WorkflowState::New, WorkflowState::Aborted]);
        assert!(gateway.updates().is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_device_name_aborts_after_wip() {
        let transport = Arc::new(FakeTransport::reachable());
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(CPU, &ResourceUsageAction, parsed("d1", "Alert Type: CPU"))
            .await;

        assert!(report.is_aborted());
        assert!(transport.calls().is_empty());
        assert_eq!(report.delivered, vec![status::WIP]);
    }

    #[tokio::test]
    async fn test_ssh_failure_escalates_with_label() {
        let transport = Arc::new(FakeTransport::reachable().with_ssh(false));
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(
                CPU,
                &ResourceUsageAction,
                parsed("l1", "Device Name: app-lnx-01\nAlert Type: CPU\nThreshold Value: 90"),
            )
            .await;

        assert_eq!(report.reachability, Some(ReachabilityResult::SshFailure));
        assert_eq!(report.config.failure_type.as_deref(), Some("SSH Failure"));
        let payload = gateway.last_payload();
        assert_eq!(payload.assignment_group.as_deref(), Some("grp-lnx"));
    }

    #[tokio::test]
    async fn test_winrm_failure_escalates_with_label() {
        let transport = Arc::new(FakeTransport::reachable().with_winrm(false));
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(SERVICE, &ServiceRestartAction, parsed("r1", SERVICE_INCIDENT))
            .await;

        assert_eq!(report.status.as_deref(), Some(status::ESCALATE_DEVICE_UNREACHABLE));
        assert_eq!(report.config.failure_type.as_deref(), Some("WinRM Failure"));
    }

    #[tokio::test]
    async fn test_action_transport_error_escalates() {
        let transport = Arc::new(FakeTransport::reachable().fail("Get-Service"));
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(SERVICE, &ServiceRestartAction, parsed("t1", SERVICE_INCIDENT))
            .await;

        assert_eq!(report.outcome, RunOutcome::Escalated);
        assert_eq!(report.status.as_deref(), Some(status::ESCALATE));
        assert!(gateway
            .last_payload()
            .work_notes
            .unwrap()
            .contains("Timed out talking to srv01"));
    }

    #[tokio::test]
    async fn test_invalid_threshold_aborts_without_terminal_update() {
        let transport = Arc::new(FakeTransport::reachable().respond("LoadPercentage", "50"));
        let gateway = Arc::new(FakeGateway::new());
        let report = engine(TEST_CATALOG, &transport, &gateway)
            .run(
                CPU,
                &ResourceUsageAction,
                parsed("v1", "Device Name: srv01\nAlert Type: CPU\nThreshold Value: high"),
            )
            .await;

        assert!(report.is_aborted());
        assert_eq!(report.delivered, vec![status::WIP]);
    }

    #[tokio::test]
    async fn test_runs_share_no_state() {
        let transport = Arc::new(FakeTransport::reachable().respond("win32_operatingsystem", "60"));
        let gateway = Arc::new(FakeGateway::new());
        let engine = engine(TEST_CATALOG, &transport, &gateway);

        let first = engine
            .run(CPU, &ResourceUsageAction, parsed("a", MEMORY_INCIDENT))
            .await;
        let second = engine
            .run(CPU, &ResourceUsageAction, parsed("b", MEMORY_INCIDENT))
            .await;

        assert_ne!(first.run_id, second.run_id);
        let targets: Vec<_> = gateway.updates().into_iter().map(|(id, _)| id).collect();
        assert_eq!(targets, vec!["a", "a", "b", "b"]);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::formatter::{render_process_table, ResultExtra};
    use crate::types::ProcessSample;

    #[test]
    fn test_parser_extracts_device_and_alert_type() {
        let parser = IncidentParser::default();
        for name in ["X", "srv01", "db-02.corp", "WEB_7"] {
            for layout in [
                format!("Device Name: {name}\nAlert Type: CPU"),
                format!("Alert Type: CPU\nDevice Name: {name}\n"),
                format!("Summary: load\nDevice Name: {name} Alert Type: CPU"),
            ] {
                let config = parser.parse(&layout);
                assert_eq!(config.device_name.as_deref(), Some(name), "{layout}");
                assert_eq!(config.alert_type.as_ref().map(ToString::to_string).as_deref(), Some("CPU"));
            }
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let transport = Arc::new(FakeTransport::reachable());
        let gateway = Arc::new(FakeGateway::new());
        let engine = engine(TEST_CATALOG, &transport, &gateway);
        let mut config = parsed("p1", MEMORY_INCIDENT);
        config.total_usage = Some("95".to_string());
        let extra = ResultExtra::Listing("1|||a|||2%~~~".to_string());

        for status_name in [status::WIP, status::RESOLVED, status::ESCALATE] {
            let first = engine.formatter().resolve(CPU, status_name, &config, Some(&extra)).unwrap();
            let second = engine.formatter().resolve(CPU, status_name, &config, Some(&extra)).unwrap();
            assert_eq!(first, second);
            assert!(first.is_some());
        }
    }

    #[test]
    fn test_table_rows_match_sample_count() {
        for n in 0..8 {
            let samples: Vec<_> = (0..n)
                .map(|i| ProcessSample::new(format!("{}", 100 + i), "svc", "1%"))
                .collect();
            let table = render_process_table(&samples);
            let rows: Vec<_> = table.split("<tr>").skip(1).collect();
            assert_eq!(rows.len(), n);
            for (i, row) in rows.iter().enumerate() {
                assert!(row.starts_with(&format!("{TABLE_CELL_OPEN}{}</td>", i + 1)));
            }
        }
    }

    #[tokio::test]
    async fn test_search_filters_reach_gateway() {
        use crate::gateway::IncidentGateway;

        let gateway = FakeGateway::with_incidents(vec![incident("x1", MEMORY_INCIDENT)]);
        let filter = catalog(TEST_CATALOG)
            .workflow(CPU)
            .and_then(crate::config::WorkflowDefinition::combined_filter)
            .unwrap();
        let found = gateway.search(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            gateway.searches(),
            vec!["short_descriptionLIKEcpu^NQshort_descriptionLIKEmemory"]
        );
    }
}

#[cfg(test)]
mod catalog_tests {
    use crate::config::WorkflowCatalog;
    use crate::routing::{DeviceClass, ResolverTable};

    const SHIPPED_CATALOG: &str = include_str!("../../../../config/workflows.yaml");

    #[test]
    fn test_shipped_catalog_covers_every_reachable_status() {
        let catalog = WorkflowCatalog::from_yaml_str(SHIPPED_CATALOG).unwrap();

        for &name in crate::actions::BUILTIN_ACTIONS {
            let def = catalog.workflow(name).unwrap();
            assert!(def.enabled, "{name} should be enabled");
            assert!(def.combined_filter().is_some(), "{name} needs filters");

            let action = crate::actions::builtin(def.action_name(name)).unwrap();
            let statuses: Vec<&str> = crate::actions::reachable_statuses(action.as_ref());
            let missing = catalog.missing_templates([(name, &statuses[..])]);
            assert!(missing.is_empty(), "missing templates: {missing:?}");
        }
    }

    #[test]
    fn test_shipped_catalog_routes_every_device_class() {
        let catalog = WorkflowCatalog::from_yaml_str(SHIPPED_CATALOG).unwrap();
        let table: ResolverTable = catalog.resolver_table().unwrap();

        for class in [
            DeviceClass::Linux,
            DeviceClass::Sql,
            DeviceClass::CommentCode,
            DeviceClass::VaultAgent,
            DeviceClass::Other,
        ] {
            assert!(table.route(class).is_some(), "no route for {class}");
        }
        assert_eq!(catalog.ping_retry_count(), 3);
        assert_eq!(catalog.top_process_count(), 5);
    }
}
