//! Multi-Session (spec §4.4): the per-client aggregate that holds every
//! connected backend's [`BackendSession`], the merged [`RoutingTable`], and
//! dispatches client operations to the owning backend through the
//! [`AdmissionQueue`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rmcp::model::{Prompt, RawResource, RawResourceTemplate, Tool};
use serde_json::{Map, Value};

use crate::admission::AdmissionQueue;
use crate::error::DispatchError;
use crate::result::{PromptGetResult, ResourceReadResult, ToolCallResult};
use crate::routing::RoutingTable;
use crate::session::BackendSession;

/// Observability/audit metadata captured once at construction (spec §3
/// Multi-Session attributes: `identity.subject`, `backend.ids`).
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub identity_subject: Option<String>,
    /// Comma-separated, sorted list of successfully-connected backend ids;
    /// `None` when zero backends connected (spec §4.5.1 step 6).
    pub backend_ids: Option<String>,
}

/// Per-client aggregate (spec §4.4). `connections`, `routing_table`, and
/// `metadata` are written exactly once during construction and never
/// mutated again — the invariant that lets every accessor and dispatch call
/// run without taking a lock on them (spec §4.4 "Thread-safety model").
pub struct MultiSession {
    session_id: String,
    connections: HashMap<Arc<str>, BackendSession>,
    routing_table: RoutingTable,
    admission: AdmissionQueue,
    closed: AtomicBool,
    metadata: SessionMetadata,
}

impl MultiSession {
    pub(crate) fn new(
        session_id: String,
        connections: HashMap<Arc<str>, BackendSession>,
        routing_table: RoutingTable,
        metadata: SessionMetadata,
    ) -> Self {
        Self {
            session_id,
            connections,
            routing_table,
            admission: AdmissionQueue::new(),
            closed: AtomicBool::new(false),
            metadata,
        }
    }

    /// An empty session with no backends and no capabilities, used by store
    /// tests that need a `MultiSession` value but don't exercise dispatch.
    #[cfg(test)]
    pub(crate) fn empty_for_test(session_id: impl Into<String>) -> Self {
        Self::new(
            session_id.into(),
            HashMap::new(),
            RoutingTable::default(),
            SessionMetadata::default(),
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Snapshot copies (spec §4.4, §9 "value-copy accessors") — never a
    /// reference into `routing_table`.
    pub fn tools(&self) -> Vec<Tool> {
        self.routing_table.tools()
    }

    pub fn resources(&self) -> Vec<RawResource> {
        self.routing_table.resources()
    }

    pub fn resource_templates(&self) -> Vec<RawResourceTemplate> {
        self.routing_table.resource_templates()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.routing_table.prompts()
    }

    /// Snapshot copy of `{backend_id -> backend_session_id}` (spec §3, §4.4
    /// `BackendSessions()`). Entries whose backend never received one from
    /// its transport are omitted rather than mapped to an empty string.
    pub fn backend_sessions(&self) -> HashMap<String, String> {
        self.connections
            .iter()
            .filter_map(|(id, session)| {
                session
                    .backend_session_id()
                    .map(|sid| (id.to_string(), sid.to_string()))
            })
            .collect()
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolCallResult, DispatchError> {
        let _ticket = self
            .admission
            .try_admit()
            .await
            .ok_or(DispatchError::SessionClosed)?;
        let routed = self
            .routing_table
            .resolve_tool(tool_name)
            .ok_or_else(|| DispatchError::ToolNotFound(tool_name.to_string()))?;
        let backend = self.connections.get(&routed.backend_id).ok_or_else(|| {
            tracing::error!(
                tool_name,
                backend_id = %routed.backend_id,
                "routing table named a backend with no live connection"
            );
            DispatchError::NoBackendClient(routed.backend_id.to_string())
        })?;
        Ok(backend.call_tool(routed.tool.name.to_string(), arguments).await?)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ResourceReadResult, DispatchError> {
        let _ticket = self
            .admission
            .try_admit()
            .await
            .ok_or(DispatchError::SessionClosed)?;
        let routed = self
            .routing_table
            .resolve_resource(uri)
            .ok_or_else(|| DispatchError::ResourceNotFound(uri.to_string()))?;
        let backend = self.connections.get(&routed.backend_id).ok_or_else(|| {
            tracing::error!(
                uri,
                backend_id = %routed.backend_id,
                "routing table named a backend with no live connection"
            );
            DispatchError::NoBackendClient(routed.backend_id.to_string())
        })?;
        Ok(backend.read_resource(routed.resource.uri.clone()).await?)
    }

    pub async fn get_prompt(
        &self,
        prompt_name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<PromptGetResult, DispatchError> {
        let _ticket = self
            .admission
            .try_admit()
            .await
            .ok_or(DispatchError::SessionClosed)?;
        let routed = self
            .routing_table
            .resolve_prompt(prompt_name)
            .ok_or_else(|| DispatchError::PromptNotFound(prompt_name.to_string()))?;
        let backend = self.connections.get(&routed.backend_id).ok_or_else(|| {
            tracing::error!(
                prompt_name,
                backend_id = %routed.backend_id,
                "routing table named a backend with no live connection"
            );
            DispatchError::NoBackendClient(routed.backend_id.to_string())
        })?;
        Ok(backend.get_prompt(routed.prompt.name.clone(), arguments).await?)
    }

    /// Idempotent (spec §4.4 Close algorithm, §8 property 7/8): the first
    /// call flips `closed`, drains in-flight operations, and closes every
    /// backend connection; every later call is a no-op that returns
    /// immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.admission.close_and_drain().await;
        for (backend_id, session) in &self.connections {
            tracing::debug!(%backend_id, "closing backend connection");
            session.close().await;
        }
    }
}
