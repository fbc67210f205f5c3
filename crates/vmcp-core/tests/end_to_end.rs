//! End-to-end smoke tests driving real, in-process MCP backends (spec §8:
//! "each scenario seeds ... an integration test using a real in-process MCP
//! backend for smoke validation"). Each backend here is a genuine `rmcp`
//! server handler, served over an in-memory duplex pipe and handshaken for
//! real — only the outer transport (TCP/HTTP) is swapped out, not the
//! protocol plumbing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler, ServiceExt};
use tokio::sync::{oneshot, Mutex};

use vmcp_core::auth::AuthConfig;
use vmcp_core::backend::{BackendTarget, TransportKind};
use vmcp_core::capability::CapabilityList;
use vmcp_core::connector::Connector;
use vmcp_core::error::ConnectError;
use vmcp_core::identity::Identity;
use vmcp_core::manager::SessionManager;
use vmcp_core::registry::StaticBackendRegistry;
use vmcp_core::session::BackendSession;
use vmcp_core::factory::Factory;

/// A real MCP server, advertising one tool and optionally blocking on a
/// signal before answering `call_tool` (used by the close-drains-in-flight
/// scenario).
struct FakeBackend {
    tools: Vec<Tool>,
    block_until: Mutex<Option<oneshot::Receiver<()>>>,
    calls: Arc<AtomicUsize>,
}

impl ServerHandler for FakeBackend {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools.clone()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(rx) = self.block_until.lock().await.take() {
            let _ = rx.await;
        }
        Ok(CallToolResult {
            content: Some(vec![Content::text(format!("called {}", request.name))]),
            structured_content: None,
            is_error: Some(false),
        })
    }
}

/// Wires a [`FakeBackend`] up over an in-process duplex pipe, through the
/// real client-side `rmcp` handshake, so the [`Connector`] contract is
/// exercised faithfully without opening a socket.
struct DuplexConnector {
    backends: std::collections::HashMap<&'static str, Arc<tokio::sync::Mutex<Option<FakeBackend>>>>,
    fail: Vec<&'static str>,
}

impl DuplexConnector {
    fn new() -> Self {
        Self {
            backends: std::collections::HashMap::new(),
            fail: Vec::new(),
        }
    }

    fn with_backend(mut self, id: &'static str, tools: Vec<Tool>) -> Self {
        self.backends.insert(
            id,
            Arc::new(tokio::sync::Mutex::new(Some(FakeBackend {
                tools,
                block_until: Mutex::new(None),
                calls: Arc::new(AtomicUsize::new(0)),
            }))),
        );
        self
    }

    fn failing(mut self, id: &'static str) -> Self {
        self.fail.push(id);
        self
    }
}

#[async_trait::async_trait]
impl Connector for DuplexConnector {
    async fn connect(
        &self,
        target: &BackendTarget,
        _identity: &Identity,
    ) -> Result<(BackendSession, CapabilityList), ConnectError> {
        let id: &str = target.backend_id.as_ref();
        if self.fail.iter().any(|f| *f == id) {
            return Err(ConnectError::UnsupportedTransport(format!(
                "fake failure for {id}"
            )));
        }
        let slot = self
            .backends
            .get(id)
            .unwrap_or_else(|| panic!("no fake backend registered for {id}"))
            .clone();
        let backend = slot.lock().await.take().expect("backend used only once per test");

        let (server_io, client_io) = tokio::io::duplex(8192);
        tokio::spawn(async move {
            let server = backend.serve(server_io).await.expect("fake server failed to start");
            let _ = server.waiting().await;
        });
        let running = ()
            .serve(client_io)
            .await
            .map_err(|e| ConnectError::transport_failed("initialize", e))?;
        let peer = running.peer().clone();
        let backend_session_id = Some(format!("{id}-session"));
        let session = BackendSession::new(target.backend_id.clone(), peer, running, backend_session_id);
        let translate = |name: &str| target.translate(name);
        let caps = session
            .list_capabilities(translate)
            .await
            .map_err(|e| ConnectError::transport_failed("list_capabilities", e))?;
        Ok((session, caps))
    }
}

fn backend_target(id: &'static str) -> BackendTarget {
    BackendTarget::new(
        id,
        id,
        url::Url::parse("https://backend.example/mcp").unwrap(),
        TransportKind::StreamableHttp,
        AuthConfig::Unauthenticated,
    )
}

fn tool(name: &str) -> Tool {
    Tool::new(name.to_string(), "a fake tool", Arc::new(serde_json::Map::new()))
}

/// S1 — two backends advertise a conflicting tool name; the alphabetically
/// smaller backend id wins the routing table entry, and calling the tool
/// reaches that backend's live connection.
#[tokio::test]
async fn s1_conflicting_tool_name_resolves_to_alphabetical_winner() {
    let connector = DuplexConnector::new()
        .with_backend("zeta", vec![tool("fetch")])
        .with_backend("alpha", vec![tool("fetch")]);
    let registry = Arc::new(StaticBackendRegistry::new(vec![
        backend_target("zeta"),
        backend_target("alpha"),
    ]));
    let store = Arc::new(vmcp_core::store::InMemorySessionStore::new());
    let manager = SessionManager::new(store, registry, Factory::new(Arc::new(connector)));

    let id = manager.generate().await;
    let session = manager.create_session(&id, None).await.expect("should create session");

    let tools = session.tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "fetch");

    let result = session.call_tool("fetch", None).await.expect("call should succeed");
    assert!(!result.is_error);
}

/// S2 — one backend connects successfully, the other fails outright; the
/// session is still created, exposing only the surviving backend's tools.
#[tokio::test]
async fn s2_partial_backend_failure_still_creates_a_session() {
    let connector = DuplexConnector::new()
        .with_backend("ok", vec![tool("search")])
        .failing("broken");
    let registry = Arc::new(StaticBackendRegistry::new(vec![
        backend_target("ok"),
        backend_target("broken"),
    ]));
    let store = Arc::new(vmcp_core::store::InMemorySessionStore::new());
    let manager = SessionManager::new(store, registry, Factory::new(Arc::new(connector)));

    let id = manager.generate().await;
    let session = manager.create_session(&id, None).await.expect("should create session");

    let tools = session.tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "search");
    assert_eq!(
        session.backend_sessions().get("ok").map(String::as_str),
        Some("ok-session")
    );
    assert!(session.backend_sessions().get("broken").is_none());
}

/// S5 — `Close` does not return until an in-flight call completes, and the
/// backend connection is closed exactly once afterward.
#[tokio::test]
async fn s5_close_waits_for_in_flight_call_to_finish() {
    let (tx, rx) = oneshot::channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = FakeBackend {
        tools: vec![tool("slow")],
        block_until: Mutex::new(Some(rx)),
        calls: calls.clone(),
    };
    let mut connector = DuplexConnector::new();
    connector
        .backends
        .insert("b1", Arc::new(tokio::sync::Mutex::new(Some(backend))));

    let registry = Arc::new(StaticBackendRegistry::new(vec![backend_target("b1")]));
    let store = Arc::new(vmcp_core::store::InMemorySessionStore::new());
    let manager = SessionManager::new(store, registry, Factory::new(Arc::new(connector)));

    let id = manager.generate().await;
    let session = manager.create_session(&id, None).await.expect("should create session");

    let call_session = Arc::clone(&session);
    let call = tokio::spawn(async move { call_session.call_tool("slow", None).await });

    // Give the call a moment to reach the blocking point inside the backend.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let close_session = Arc::clone(&session);
    let close = tokio::spawn(async move { close_session.close().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!close.is_finished(), "close must wait for the in-flight call");

    tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(1), close)
        .await
        .expect("close should finish once the call is released")
        .unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("call should have finished")
        .unwrap();
    assert!(result.is_ok());
    assert!(session.is_closed());
}

/// S6 — a call succeeds while the session is live; after `Terminate`, the
/// manager reports the session as gone (the protocol layer then rejects
/// further client requests, outside this crate's scope), and `Close` had
/// already completed before that rejection is observable.
#[tokio::test]
async fn s6_session_scope_ends_at_terminate() {
    let connector = DuplexConnector::new().with_backend("b1", vec![tool("ping")]);
    let registry = Arc::new(StaticBackendRegistry::new(vec![backend_target("b1")]));
    let store = Arc::new(vmcp_core::store::InMemorySessionStore::new());
    let manager = SessionManager::new(store, registry, Factory::new(Arc::new(connector)));

    let id = manager.generate().await;
    let session = manager.create_session(&id, None).await.expect("should create session");
    session.call_tool("ping", None).await.expect("first call should succeed");

    manager.terminate(&id).await.unwrap();
    assert!(session.is_closed());

    let err = manager.validate(&id).await.unwrap_err();
    assert!(matches!(err, vmcp_core::error::ManagerError::NotFound));
}
