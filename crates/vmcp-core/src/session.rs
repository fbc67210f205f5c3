//! Backend Session (spec §4.2): a live, initialized connection to one
//! backend, plus the result-shaping layer between its raw responses and what
//! a vMCP client sees.

use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, GetPromptRequestParam, ReadResourceRequestParam};
use rmcp::service::RunningService;
use rmcp::{Peer, RoleClient};
use tokio::sync::Mutex;

use crate::capability::{
    CapabilityList, PromptDescriptor, ResourceDescriptor, ResourceTemplateDescriptor,
    ToolDescriptor,
};
use crate::error::BackendCallError;
use crate::result::{
    shape_call_tool_result, shape_get_prompt_result, shape_read_resource_result, PromptGetResult,
    ResourceReadResult, ToolCallResult,
};

/// A live connection to one backend, scoped to a single vMCP client session.
/// Owns the transport's running task. `close` takes `&self` rather than
/// consuming, and is safe to call more than once (the second call is a
/// no-op) — that's what lets [`crate::multi_session::MultiSession`] hold
/// these directly in its `connections` map and dispatch through a plain
/// reference instead of needing to lock the whole map to tear one down.
pub struct BackendSession {
    backend_id: Arc<str>,
    peer: Peer<RoleClient>,
    transport: Mutex<Option<RunningService<RoleClient, ()>>>,
    backend_session_id: Option<String>,
}

impl BackendSession {
    pub fn new(
        backend_id: Arc<str>,
        peer: Peer<RoleClient>,
        transport: RunningService<RoleClient, ()>,
        backend_session_id: Option<String>,
    ) -> Self {
        Self {
            backend_id,
            peer,
            transport: Mutex::new(Some(transport)),
            backend_session_id,
        }
    }

    pub fn backend_id(&self) -> &Arc<str> {
        &self.backend_id
    }

    /// Lists everything this backend advertises, tagging each entry with the
    /// translated exposed name it will carry on the merged routing table.
    pub async fn list_capabilities(
        &self,
        translate: impl Fn(&str) -> String,
    ) -> Result<CapabilityList, BackendCallError> {
        let tools = self.peer.list_all_tools().await?;
        let resources = self.peer.list_all_resources().await?;
        let resource_templates = self.peer.list_all_resource_templates().await?;
        let prompts = self.peer.list_all_prompts().await?;

        Ok(CapabilityList {
            tools: tools
                .into_iter()
                .map(|tool| ToolDescriptor {
                    backend_id: self.backend_id.clone(),
                    exposed_name: translate(&tool.name),
                    tool,
                })
                .collect(),
            resources: resources
                .into_iter()
                .map(|resource| ResourceDescriptor {
                    backend_id: self.backend_id.clone(),
                    resource: resource.raw,
                })
                .collect(),
            resource_templates: resource_templates
                .into_iter()
                .map(|template| ResourceTemplateDescriptor {
                    backend_id: self.backend_id.clone(),
                    template: template.raw,
                })
                .collect(),
            prompts: prompts
                .into_iter()
                .map(|prompt| PromptDescriptor {
                    backend_id: self.backend_id.clone(),
                    exposed_name: translate(&prompt.name),
                    prompt,
                })
                .collect(),
        })
    }

    pub async fn call_tool(
        &self,
        name: String,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ToolCallResult, BackendCallError> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: name.into(),
                arguments,
            })
            .await?;
        Ok(shape_call_tool_result(result))
    }

    pub async fn read_resource(&self, uri: String) -> Result<ResourceReadResult, BackendCallError> {
        let result = self
            .peer
            .read_resource(ReadResourceRequestParam { uri })
            .await?;
        Ok(shape_read_resource_result(result))
    }

    pub async fn get_prompt(
        &self,
        name: String,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<PromptGetResult, BackendCallError> {
        let result = self
            .peer
            .get_prompt(GetPromptRequestParam { name, arguments })
            .await?;
        Ok(shape_get_prompt_result(result))
    }

    /// Backend-assigned session id, for transports that support one
    /// (streamable-HTTP assigns one in the `Initialize` response; SSE does
    /// not). Captured by [`crate::connector::RmcpConnector`] off the
    /// `mcp-session-id` response header and threaded in at construction.
    pub fn backend_session_id(&self) -> Option<&str> {
        self.backend_session_id.as_deref()
    }

    /// Ends this backend connection. Best-effort and idempotent: the second
    /// and later calls find the transport already taken and do nothing. A
    /// cancellation failure is logged, never surfaced — close is
    /// unconditional once a session is tearing down.
    pub async fn close(&self) {
        let taken = self.transport.lock().await.take();
        if let Some(service) = taken {
            if let Err(error) = service.cancel().await {
                tracing::debug!(
                    backend_id = %self.backend_id,
                    %error,
                    "backend connection task ended with an error during close"
                );
            }
        }
    }
}

/// A real, in-process backend server for tests — genuine handshake and
/// transport, just over an in-memory pipe instead of a socket (mirrors the
/// `tokio::io::duplex` pattern the vendored SDK's own integration tests use
/// rather than faking `BackendSession` at the struct level).
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rmcp::model::{
        CallToolResult, Content, ListToolsResult, PaginatedRequestParam, ServerCapabilities,
        ServerInfo,
    };
    use rmcp::service::RequestContext;
    use rmcp::{RoleServer, ServerHandler, ServiceExt};

    pub(crate) struct FakeBackendServer {
        pub tools: Vec<rmcp::model::Tool>,
    }

    impl ServerHandler for FakeBackendServer {
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
        ) -> Result<ListToolsResult, rmcp::Error> {
            Ok(ListToolsResult::with_all_items(self.tools.clone()))
        }

        async fn call_tool(
            &self,
            request: CallToolRequestParam,
            _context: RequestContext<RoleServer>,
        ) -> Result<CallToolResult, rmcp::Error> {
            Ok(CallToolResult {
                content: Some(vec![Content::text(format!("called {}", request.name))]),
                structured_content: None,
                is_error: Some(false),
            })
        }
    }

    pub(crate) async fn connected_session_for_test(
        backend_id: impl Into<Arc<str>>,
        tools: Vec<rmcp::model::Tool>,
    ) -> BackendSession {
        connected_session_for_test_with_id(backend_id, tools, None).await
    }

    pub(crate) async fn connected_session_for_test_with_id(
        backend_id: impl Into<Arc<str>>,
        tools: Vec<rmcp::model::Tool>,
        backend_session_id: Option<String>,
    ) -> BackendSession {
        let (server_io, client_io) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let server = FakeBackendServer { tools }
                .serve(server_io)
                .await
                .expect("fake backend server failed to start");
            let _ = server.waiting().await;
        });
        let running = ()
            .serve(client_io)
            .await
            .expect("fake backend client failed to connect");
        let peer = running.peer().clone();
        BackendSession::new(backend_id.into(), peer, running, backend_session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::connected_session_for_test;
    use rmcp::model::Tool;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn list_capabilities_reports_the_backend_tool_with_translated_name() {
        let tool = Tool::new("search", "searches things", StdArc::new(serde_json::Map::new()));
        let session = connected_session_for_test("b1", vec![tool]).await;
        let caps = session
            .list_capabilities(|name| format!("b1_{name}"))
            .await
            .expect("list_capabilities should succeed");
        assert_eq!(caps.tools.len(), 1);
        assert_eq!(caps.tools[0].exposed_name, "b1_search");
        session.close().await;
    }

    #[tokio::test]
    async fn call_tool_round_trips_through_the_fake_backend() {
        let session = connected_session_for_test("b1", vec![]).await;
        let result = session
            .call_tool("anything".to_string(), None)
            .await
            .expect("call_tool should succeed");
        assert!(!result.is_error);
        session.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let session = connected_session_for_test("b1", vec![]).await;
        session.close().await;
        session.close().await;
    }

    #[tokio::test]
    async fn backend_session_id_reports_the_captured_value() {
        use super::test_support::connected_session_for_test_with_id;
        let session =
            connected_session_for_test_with_id("b1", vec![], Some("sess-123".to_string())).await;
        assert_eq!(session.backend_session_id(), Some("sess-123"));
        session.close().await;
    }

    #[tokio::test]
    async fn backend_session_id_is_none_when_not_captured() {
        let session = connected_session_for_test("b1", vec![]).await;
        assert_eq!(session.backend_session_id(), None);
        session.close().await;
    }
}
