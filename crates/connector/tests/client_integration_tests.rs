use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use orchestrator_core::config::AgentConfig;
use orchestrator_core::models::{CallOverride, HttpMethod, OutcomeCode};
use orchestrator_core::traits::{AgentGateway, SharedStore};
use orchestrator_connector::{AgentConnector, InstanceRegistry, LoadBalancer, Strategy};
use orchestrator_core::models::AgentInstance;
use orchestrator_infrastructure::MemoryStore;

/// 极简HTTP应答器：每个连接返回固定响应，统计收到的请求数
async fn spawn_stub_server(status_line: &'static str, body: &'static str) -> (u16, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicU32::new(0));
    let hits_clone = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            hits_clone.fetch_add(1, Ordering::SeqCst);
            let mut buffer = [0u8; 4096];
            let _ = socket.read(&mut buffer).await;
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });
    (port, hits)
}

fn connector_for(agent: &str, port: u16, max_retries: u32) -> AgentConnector {
    let mut agents = HashMap::new();
    agents.insert(
        agent.to_string(),
        AgentConfig {
            base_url: format!("http://127.0.0.1:{port}"),
            timeout_ms: 2000,
            max_retries,
        },
    );
    AgentConnector::new(agents)
}

#[tokio::test]
async fn successful_call_returns_parsed_json() {
    let (port, hits) = spawn_stub_server("HTTP/1.1 200 OK", r#"{"result":"translated"}"#).await;
    let connector = connector_for("translator", port, 3);

    let outcome = connector
        .execute(
            "translator",
            HttpMethod::Post,
            "/run",
            Some(serde_json::json!({"text": "hallo"})),
            None,
        )
        .await;

    assert!(outcome.success);
    assert_eq!(
        outcome.data.unwrap()["result"],
        serde_json::json!("translated")
    );
    assert_eq!(outcome.metadata.retries, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http_error_is_reported_with_status() {
    let (port, hits) = spawn_stub_server("HTTP/1.1 500 Internal Server Error", "{}").await;
    let connector = connector_for("translator", port, 0);

    let outcome = connector
        .execute("translator", HttpMethod::Get, "/run", None, None)
        .await;

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert_eq!(error.code, OutcomeCode::Http);
    assert_eq!(error.status, Some(500));
    // max_retries=0 时只发出一次请求
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn balancer_routes_to_registered_instance() {
    let (port, hits) = spawn_stub_server("HTTP/1.1 200 OK", r#"{"ok":true}"#).await;

    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let registry = Arc::new(InstanceRegistry::new(store.clone()));
    registry
        .register(&AgentInstance::new("translator", "127.0.0.1", port))
        .await
        .unwrap();
    let balancer = Arc::new(LoadBalancer::new(
        store,
        registry,
        orchestrator_core::config::LoadBalancerSection::default(),
    ));

    // 配置里的地址指向空端口，实际流量应走注册实例
    let connector =
        connector_for("translator", 1, 0).with_balancer(balancer, Strategy::RoundRobin);

    let outcome = connector
        .execute("translator", HttpMethod::Get, "/run", None, None)
        .await;

    assert!(outcome.success);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn override_base_url_bypasses_balancer() {
    let (port, hits) = spawn_stub_server("HTTP/1.1 200 OK", r#"{"status":"healthy"}"#).await;
    let connector = connector_for("translator", 1, 0);

    let outcome = connector
        .execute(
            "translator",
            HttpMethod::Get,
            "/health",
            None,
            Some(CallOverride {
                base_url: Some(format!("http://127.0.0.1:{port}")),
                ..Default::default()
            }),
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.data.unwrap()["status"], serde_json::json!("healthy"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
