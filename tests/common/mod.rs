//! Shared test infrastructure
//!
//! In-memory SQLite environments, deterministic provider catalogs, data
//! fixtures, and a minimal callback receiver for webhook tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use voicebridge_gateway::core::pipeline::MessagePipeline;
use voicebridge_gateway::core::providers::{VendorA, VendorB};
use voicebridge_gateway::core::session_lock::SessionLockMap;
use voicebridge_gateway::core::tools::ToolRegistry;
use voicebridge_gateway::core::types::ProviderId;
use voicebridge_gateway::storage::agents::NewAgent;
use voicebridge_gateway::storage::models::{Agent, Session, SessionChannel, Tenant};
use voicebridge_gateway::storage::sessions::NewSession;
use voicebridge_gateway::{AdapterCatalog, Database, FaultProfile, Orchestrator, RetryPolicy};

/// Everything a pipeline-level test needs
pub struct TestEnv {
    pub db: Database,
    pub locks: Arc<SessionLockMap>,
    pub tools: Arc<ToolRegistry>,
    pub pipeline: Arc<MessagePipeline>,
}

/// Fresh in-memory database with the full schema
pub async fn test_db() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    let db = Database::from_pool(pool);
    db.migrate().await.expect("migrations");
    db
}

/// Both vendors, faultless and without simulated latency
pub fn deterministic_catalog() -> AdapterCatalog {
    let mut catalog = AdapterCatalog::new();
    catalog.register(Arc::new(VendorA::with_profile(FaultProfile::deterministic())));
    catalog.register(Arc::new(VendorB::with_profile(FaultProfile::deterministic())));
    catalog
}

/// Millisecond-scale backoff so retry tests finish instantly
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        jitter_frac: 0.3,
    }
}

pub async fn test_env() -> TestEnv {
    test_env_with(deterministic_catalog()).await
}

pub async fn test_env_with(catalog: AdapterCatalog) -> TestEnv {
    let db = test_db().await;
    let locks = Arc::new(SessionLockMap::default());
    let tools = Arc::new(ToolRegistry::with_builtin());
    let orchestrator = Arc::new(Orchestrator::with_policy(Arc::new(catalog), fast_policy()));
    let pipeline = Arc::new(MessagePipeline::new(
        db.clone(),
        Arc::clone(&locks),
        Arc::clone(&tools),
        orchestrator,
    ));
    TestEnv {
        db,
        locks,
        tools,
        pipeline,
    }
}

pub async fn create_tenant(db: &Database) -> Tenant {
    let suffix = &uuid::Uuid::new_v4().to_string()[..8];
    db.create_tenant(
        &format!("tenant-{}", suffix),
        &format!("owner-{}@example.com", suffix),
    )
    .await
    .expect("tenant")
}

pub async fn create_agent(
    db: &Database,
    tenant: &Tenant,
    primary: ProviderId,
    fallback: Option<ProviderId>,
    enabled_tools: &[&str],
) -> Agent {
    db.create_agent(NewAgent {
        tenant_id: tenant.id.clone(),
        name: "support-agent".to_string(),
        description: Some("test agent".to_string()),
        primary_provider: primary,
        fallback_provider: fallback,
        system_prompt: "You are a helpful support agent.".to_string(),
        temperature: 0.7,
        max_tokens: 512,
        enabled_tools: enabled_tools.iter().map(|s| s.to_string()).collect(),
        voice_enabled: false,
        voice_config: None,
    })
    .await
    .expect("agent")
}

pub async fn create_session(db: &Database, tenant: &Tenant, agent: &Agent) -> Session {
    let (session, _created) = db
        .create_session(NewSession {
            tenant_id: tenant.id.clone(),
            agent_id: agent.id.clone(),
            customer_id: format!("customer-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            channel: SessionChannel::Chat,
            demo_mode: false,
            metadata: None,
        })
        .await
        .expect("session");
    session
}

pub async fn create_demo_session(db: &Database, tenant: &Tenant, agent: &Agent) -> Session {
    let (session, _created) = db
        .create_session(NewSession {
            tenant_id: tenant.id.clone(),
            agent_id: agent.id.clone(),
            customer_id: format!("demo-{}", tenant.id),
            channel: SessionChannel::Chat,
            demo_mode: true,
            metadata: None,
        })
        .await
        .expect("demo session");
    session
}

/// Minimal HTTP receiver recording every callback body it is POSTed
pub struct CallbackServer {
    pub url: String,
    pub received: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl CallbackServer {
    pub fn hits(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }
}

pub async fn spawn_callback_server() -> CallbackServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind callback listener");
    let url = format!("http://{}/callback", listener.local_addr().unwrap());
    let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&received);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut data = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    data.extend_from_slice(&buf[..n]);
                    if let Some(body) = extract_body(&data) {
                        if let Ok(value) = serde_json::from_slice(body) {
                            store.lock().unwrap().push(value);
                        }
                        break;
                    }
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                    .await;
            });
        }
    });

    CallbackServer { url, received }
}

/// Returns the complete request body once the whole request has arrived
fn extract_body(data: &[u8]) -> Option<&[u8]> {
    let header_end = data.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let headers = String::from_utf8_lossy(&data[..header_end]);
    let content_length: usize = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    if data.len() >= header_end + content_length {
        Some(&data[header_end..header_end + content_length])
    } else {
        None
    }
}
