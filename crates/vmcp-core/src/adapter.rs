//! Adapted tool surface (spec §4.5.3): turns a live [`MultiSession`]'s
//! routed tools into handlers an outer MCP protocol adapter can register
//! directly against its own tool router, without reaching back into this
//! crate for dispatch logic.
//!
//! Each handler closes over the owning session and the tool's
//! *server-registered* name captured at build time — never a name supplied
//! by the caller at invocation time — so a client cannot redirect a call by
//! passing an unexpected name through the handler's argument payload.

use std::sync::Arc;

use futures::future::BoxFuture;
use rmcp::model::{CallToolResult, JsonObject};

use crate::error::AdaptedToolError;
use crate::multi_session::MultiSession;
use crate::result::ToolCallResult;

/// A tool call handler bound to one session and one backend tool. Protocol
/// meta (e.g. progress tokens) is accepted for the adapter's own bookkeeping
/// but is not threaded into the backend's wire call — `rmcp`'s client-side
/// `CallToolRequestParam` carries no meta field in this SDK version, the
/// same phase-1 lossiness already documented for prompt flattening (spec
/// §4.2). Resolved as an Open Question in `DESIGN.md`.
pub type AdaptedToolHandler = Arc<
    dyn Fn(
            Option<serde_json::Value>,
        ) -> BoxFuture<'static, Result<CallToolResult, AdaptedToolError>>
        + Send
        + Sync,
>;

/// One backend tool, ready for an outer protocol adapter to wire into a live
/// tool router (e.g. via `rmcp`'s `ToolRoute::new_dyn`).
#[derive(Clone)]
pub struct AdaptedTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Arc<JsonObject>,
    pub call: AdaptedToolHandler,
}

impl std::fmt::Debug for AdaptedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptedTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Builds the adapted tool list for a session (spec §4.5.3
/// `GetAdaptedTools`). Arguments that are not a JSON object fail with
/// [`AdaptedToolError::InvalidInput`], returned as a protocol-level tool
/// error result rather than a transport error — the handler itself never
/// returns a transport-level failure for bad input.
pub fn adapted_tools(session: Arc<MultiSession>) -> Vec<AdaptedTool> {
    session
        .tools()
        .into_iter()
        .map(|tool| {
            let session = Arc::clone(&session);
            let name = tool.name.to_string();
            let call_name = name.clone();
            AdaptedTool {
                name,
                description: tool.description.map(|d| d.to_string()),
                input_schema: tool.input_schema.clone(),
                call: Arc::new(move |arguments: Option<serde_json::Value>| {
                    let session = Arc::clone(&session);
                    let name = call_name.clone();
                    Box::pin(async move {
                        let arguments = match arguments {
                            None => None,
                            Some(serde_json::Value::Object(map)) => Some(map),
                            Some(_) => return Err(AdaptedToolError::InvalidInput),
                        };
                        let result = session.call_tool(&name, arguments).await?;
                        Ok(shape_as_call_tool_result(result))
                    })
                }),
            }
        })
        .collect()
}

fn shape_as_call_tool_result(result: ToolCallResult) -> CallToolResult {
    CallToolResult {
        content: Some(result.content),
        structured_content: result.structured_content,
        is_error: Some(result.is_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::backend::TransportKind;
    use crate::capability::ToolDescriptor;
    use crate::connector::Connector;
    use crate::error::ConnectError;
    use crate::factory::Factory;
    use crate::identity::Identity;
    use crate::session::test_support::connected_session_for_test;
    use crate::session::BackendSession;
    use rmcp::model::Tool;

    struct FakeConnector;

    #[async_trait::async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            target: &crate::backend::BackendTarget,
            _identity: &Identity,
        ) -> Result<(BackendSession, crate::capability::CapabilityList), ConnectError> {
            let tool = Tool::new("echo", "echoes its input", Arc::new(serde_json::Map::new()));
            let session =
                connected_session_for_test(target.backend_id.clone(), vec![tool.clone()]).await;
            let caps = crate::capability::CapabilityList {
                tools: vec![ToolDescriptor {
                    backend_id: target.backend_id.clone(),
                    exposed_name: tool.name.to_string(),
                    tool,
                }],
                ..Default::default()
            };
            Ok((session, caps))
        }
    }

    fn target(id: &str) -> crate::backend::BackendTarget {
        crate::backend::BackendTarget::new(
            id,
            id,
            url::Url::parse("https://backend.example/mcp").unwrap(),
            TransportKind::StreamableHttp,
            AuthConfig::Unauthenticated,
        )
    }

    #[tokio::test]
    async fn adapted_tool_calls_through_to_the_owning_backend() {
        let factory = Factory::new(Arc::new(FakeConnector));
        let (session, _failures) = factory
            .make_session("s1".into(), &[target("b1")], None)
            .await;
        let session = Arc::new(session);
        let tools = adapted_tools(Arc::clone(&session));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = (tools[0].call)(Some(serde_json::json!({"text": "hi"})))
            .await
            .expect("call should succeed");
        assert_eq!(result.is_error, Some(false));
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid_input() {
        let factory = Factory::new(Arc::new(FakeConnector));
        let (session, _failures) = factory
            .make_session("s1".into(), &[target("b1")], None)
            .await;
        let session = Arc::new(session);
        let tools = adapted_tools(Arc::clone(&session));

        let err = (tools[0].call)(Some(serde_json::json!("not an object")))
            .await
            .unwrap_err();
        assert!(matches!(err, AdaptedToolError::InvalidInput));
    }

    #[tokio::test]
    async fn absent_arguments_call_with_none() {
        let factory = Factory::new(Arc::new(FakeConnector));
        let (session, _failures) = factory
            .make_session("s1".into(), &[target("b1")], None)
            .await;
        let session = Arc::new(session);
        let tools = adapted_tools(Arc::clone(&session));

        let result = (tools[0].call)(None).await.expect("call should succeed");
        assert_eq!(result.is_error, Some(false));
    }
}
