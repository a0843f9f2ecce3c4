//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use guardrails_orchestrator::config::{parse_config, OrchestratorConfig};
use guardrails_orchestrator::lifecycle::build_orchestrator;
use guardrails_orchestrator::net::tls::install_crypto_provider;
use guardrails_orchestrator::HttpServer;
use http_body_util::BodyExt;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const CHAT_PATH: &str = "/api/v2/chat/completions-detection";

/// A canned OpenAI-style completion.
pub fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
    })
}

pub fn chat_body(content: &str) -> Value {
    json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": content}]
    })
}

/// One detection in the text contents response format.
pub fn content_detection(start: usize, end: usize, text: &str, score: f64) -> Value {
    json!({
        "start": start,
        "end": end,
        "text": text,
        "detection": "has_HAP",
        "detection_type": "hap",
        "score": score
    })
}

/// Parse YAML and build a server the way startup does.
pub fn server_from_yaml(yaml: &str) -> HttpServer {
    let config = parse_config(yaml).expect("test config must parse");
    server_from_config(config)
}

pub fn server_from_config(config: OrchestratorConfig) -> HttpServer {
    let orchestrator = build_orchestrator(&config).expect("test config must build");
    HttpServer::new(orchestrator, config)
}

/// Send one request through the router and decode the JSON answer.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

pub fn json_request(body: &Value, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::post(CHAT_PATH).header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// A throwaway CA plus a leaf for 127.0.0.1/localhost, written to disk.
pub struct TestPki {
    pub dir: TempDir,
    pub ca_cert_pem: String,
    pub leaf_cert_pem: String,
    pub leaf_key_pem: String,
}

impl TestPki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "guardrails test ca");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        leaf_params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        leaf_params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        leaf_params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        let pki = Self {
            dir: tempfile::tempdir().unwrap(),
            ca_cert_pem: ca_cert.pem(),
            leaf_cert_pem: leaf_cert.pem(),
            leaf_key_pem: leaf_key.serialize_pem(),
        };
        std::fs::write(pki.ca_path(), &pki.ca_cert_pem).unwrap();
        std::fs::write(pki.cert_path(), &pki.leaf_cert_pem).unwrap();
        std::fs::write(pki.key_path(), &pki.leaf_key_pem).unwrap();
        pki
    }

    pub fn ca_path(&self) -> PathBuf {
        self.dir.path().join("ca.crt")
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.path().join("tls.crt")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.path().join("tls.key")
    }
}

/// Start an HTTPS primary that answers chat completions and health probes.
pub async fn start_tls_primary(pki: &TestPki, content: &'static str) -> SocketAddr {
    install_crypto_provider();
    let config = RustlsConfig::from_pem(
        pki.leaf_cert_pem.clone().into_bytes(),
        pki.leaf_key_pem.clone().into_bytes(),
    )
    .await
    .unwrap();

    let app = Router::new()
        .route("/v1/chat/completions", post(move || async move { Json(completion(content)) }))
        .route("/health", get(|| async { StatusCode::OK }));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum_server::from_tcp_rustls(listener, config)
            .serve(app.into_make_service())
            .await;
    });
    addr
}

/// Like [`start_tls_primary`], but the handshake fails unless the client
/// presents a certificate issued by `pki`'s CA.
pub async fn start_mtls_primary(pki: &TestPki, content: &'static str) -> SocketAddr {
    install_crypto_provider();
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pki.ca_cert_pem.as_bytes()) {
        roots.add(cert.unwrap()).unwrap();
    }
    let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .unwrap();
    let certs = rustls_pemfile::certs(&mut pki.leaf_cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut pki.leaf_key_pem.as_bytes())
        .unwrap()
        .unwrap();
    let mut server_config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .unwrap();
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    let config = RustlsConfig::from_config(Arc::new(server_config));

    let app = Router::new()
        .route("/v1/chat/completions", post(move || async move { Json(completion(content)) }));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum_server::from_tcp_rustls(listener, config)
            .serve(app.into_make_service())
            .await;
    });
    addr
}
