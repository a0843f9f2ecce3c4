//! Per-upstream TLS policy and the HTTPS listener.

use std::time::Duration;

use axum::http::StatusCode;
use guardrails_orchestrator::config::{load_config, parse_config, ConfigError};
use guardrails_orchestrator::lifecycle::{build_orchestrator, Shutdown};
use serde_json::json;
use tokio::sync::mpsc;

mod common;

use common::{chat_body, json_request, send, server_from_yaml, TestPki};

#[tokio::test]
async fn insecure_profile_skips_verification() {
    let pki = TestPki::generate();
    let primary = common::start_tls_primary(&pki, "from tls").await;

    // The cert path is never read for insecure profiles.
    let yaml = format!(
        r#"
openai:
  service: {{ hostname: 127.0.0.1, port: {}, tls: external_llm }}
tls:
  external_llm:
    insecure: true
    cert_path: /dev/null
"#,
        primary.port()
    );
    let server = server_from_yaml(&yaml);
    let (status, body) = send(server.router(), json_request(&chat_body("hello"), &[])).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["choices"][0]["message"]["content"], "from tls");
}

#[tokio::test]
async fn verified_profile_trusts_its_ca() {
    let pki = TestPki::generate();
    let primary = common::start_tls_primary(&pki, "verified").await;

    let yaml = format!(
        r#"
openai:
  service: {{ hostname: 127.0.0.1, port: {}, tls: internal }}
tls:
  internal:
    cert_path: {}
    key_path: {}
    client_ca_cert_path: {}
"#,
        primary.port(),
        pki.cert_path().display(),
        pki.key_path().display(),
        pki.ca_path().display()
    );
    let server = server_from_yaml(&yaml);
    let (status, body) = send(server.router(), json_request(&chat_body("hello"), &[])).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["choices"][0]["message"]["content"], "verified");
}

#[tokio::test]
async fn verified_profile_presents_client_identity() {
    let pki = TestPki::generate();
    let primary = common::start_mtls_primary(&pki, "mutual").await;

    let yaml = format!(
        r#"
openai:
  service: {{ hostname: 127.0.0.1, port: {}, tls: internal }}
tls:
  internal:
    cert_path: {}
    key_path: {}
    client_ca_cert_path: {}
"#,
        primary.port(),
        pki.cert_path().display(),
        pki.key_path().display(),
        pki.ca_path().display()
    );
    let server = server_from_yaml(&yaml);
    let (status, body) = send(server.router(), json_request(&chat_body("hello"), &[])).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["choices"][0]["message"]["content"], "mutual");
}

#[tokio::test]
async fn insecure_profile_has_no_identity_for_mutual_tls() {
    let pki = TestPki::generate();
    let primary = common::start_mtls_primary(&pki, "unreachable").await;

    let yaml = format!(
        r#"
openai:
  service: {{ hostname: 127.0.0.1, port: {}, tls: external_llm }}
tls:
  external_llm:
    insecure: true
    cert_path: /dev/null
"#,
        primary.port()
    );
    let server = server_from_yaml(&yaml);
    let (status, body) = send(server.router(), json_request(&chat_body("hello"), &[])).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
    assert!(body["details"].as_str().unwrap().contains("openai"), "{body}");
}

#[tokio::test]
async fn verified_profile_rejects_foreign_certificate() {
    let server_pki = TestPki::generate();
    let client_pki = TestPki::generate();
    let primary = common::start_tls_primary(&server_pki, "unreachable").await;

    let yaml = format!(
        r#"
openai:
  service: {{ hostname: 127.0.0.1, port: {}, tls: internal }}
tls:
  internal:
    cert_path: {}
    key_path: {}
    client_ca_cert_path: {}
"#,
        primary.port(),
        client_pki.cert_path().display(),
        client_pki.key_path().display(),
        client_pki.ca_path().display()
    );
    let server = server_from_yaml(&yaml);
    let (status, body) = send(server.router(), json_request(&chat_body("hello"), &[])).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["details"].as_str().unwrap().contains("openai"), "{body}");
}

#[test]
fn missing_profile_fails_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        r#"
openai:
  service: { hostname: llm, port: 8443, tls: missing_profile }
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    let err = build_orchestrator(&config).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownTlsProfile { ref name } if name == "missing_profile"));
    assert!(err.to_string().contains("missing_profile"));
}

#[test]
fn verified_profile_with_unreadable_files_fails_at_load() {
    let config = parse_config(
        r#"
openai:
  service: { hostname: llm, port: 8443, tls: internal }
tls:
  internal:
    cert_path: /nonexistent/tls.crt
    key_path: /nonexistent/tls.key
    client_ca_cert_path: /nonexistent/ca.crt
"#,
    )
    .unwrap();
    let err = build_orchestrator(&config).unwrap_err();
    assert!(err.to_string().contains("internal"), "{err}");
    assert!(err.to_string().contains("/nonexistent/tls.crt"), "{err}");
}

#[tokio::test]
async fn serves_https_when_listener_tls_is_configured() {
    let pki = TestPki::generate();
    let yaml = format!(
        r#"
openai:
  service: {{ hostname: 127.0.0.1, port: {} }}
server:
  tls:
    cert_path: {}
    key_path: {}
"#,
        common::closed_port(),
        pki.cert_path().display(),
        pki.key_path().display()
    );
    let server = server_from_yaml(&yaml);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (_updates_tx, updates_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    let client = reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(pki.ca_cert_pem.as_bytes()).unwrap())
        .build()
        .unwrap();

    let mut response = None;
    for _ in 0..50 {
        match client.get(format!("https://127.0.0.1:{}/health", addr.port())).send().await {
            Ok(r) => {
                response = Some(r);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    let response = response.expect("HTTPS listener never answered");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], json!("HEALTHY"));

    drop(client);
    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(35), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
