//! ServiceNow gateway against a mock table API.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use remediation::{GatewayError, IncidentGateway, Payload};
use remediation_bots::ServiceNowGateway;

// base64("bot:secret")
const BASIC_AUTH: &str = "Basic Ym90OnNlY3JldA==";

fn gateway(server: &MockServer) -> ServiceNowGateway {
    ServiceNowGateway::new(server.uri(), "bot", "secret", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn search_sends_active_state_query_and_parses_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/now/v2/table/incident"))
        .and(header("authorization", BASIC_AUTH))
        .and(query_param(
            "sysparm_query",
            "state=1^ORstate=2^short_descriptionLIKEcpu",
        ))
        .and(query_param(
            "sysparm_fields",
            "sys_id,number,description,subcategory",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                {
                    "sys_id": "abc123",
                    "number": "INC0010001",
                    "description": "Device Name: lnx-web01\nAlert Type: CPU\nThreshold Value: 80",
                    "subcategory": "Server"
                },
                { "sys_id": "def456" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let incidents = gateway(&server)
        .search("short_descriptionLIKEcpu")
        .await
        .unwrap();

    assert_eq!(incidents.len(), 2);
    assert_eq!(incidents[0].sys_id, "abc123");
    assert_eq!(incidents[0].number.as_deref(), Some("INC0010001"));
    assert_eq!(incidents[1].description, None);
}

#[tokio::test]
async fn search_surfaces_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/now/v2/table/incident"))
        .respond_with(ResponseTemplate::new(401).set_body_string("User Not Authenticated"))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server).search("x=y").await.unwrap_err();
    match err {
        GatewayError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Not Authenticated"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn search_rejects_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/now/v2/table/incident"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = gateway(&server).search("x=y").await.unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn update_patches_incident_with_set_fields_only() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/now/v2/table/incident/abc123"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_json(json!({
            "state": "6",
            "close_code": "Break/Fix",
            "close_notes": "CPU utilization is 42%",
            "u_sop": "Yes"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let mut payload = Payload {
        state: Some("6".to_string()),
        close_code: Some("Break/Fix".to_string()),
        close_notes: Some("CPU utilization is 42%".to_string()),
        ..Payload::default()
    };
    payload.fields.insert("u_sop".to_string(), "Yes".to_string());

    gateway(&server).update("abc123", &payload).await.unwrap();
}

#[tokio::test]
async fn update_treats_non_200_as_failure() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/now/v2/table/incident/abc123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let payload = Payload {
        work_notes: Some("checking".to_string()),
        ..Payload::default()
    };
    let err = gateway(&server).update("abc123", &payload).await.unwrap_err();
    assert!(matches!(err, GatewayError::Status { status: 204, .. }));
}

#[tokio::test]
async fn update_with_empty_payload_sends_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    gateway(&server)
        .update("abc123", &Payload::default())
        .await
        .unwrap();
}
