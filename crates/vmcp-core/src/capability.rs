//! Per-backend capability descriptors (spec §3 `CapabilityList`).
//!
//! Each descriptor tags its origin with `backend_id` so the routing table
//! build in [`crate::routing`] can resolve name collisions deterministically.

use std::sync::Arc;

use rmcp::model::{Prompt, RawResource, RawResourceTemplate, Tool};

/// One tool as advertised by a single backend, translated into the merged
/// namespace (see [`crate::backend::BackendTarget::translate`]) but not yet
/// checked for collisions against other backends.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub backend_id: Arc<str>,
    /// Name as it will appear on the merged routing table.
    pub exposed_name: String,
    pub tool: Tool,
}

#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub backend_id: Arc<str>,
    pub resource: RawResource,
}

#[derive(Debug, Clone)]
pub struct ResourceTemplateDescriptor {
    pub backend_id: Arc<str>,
    pub template: RawResourceTemplate,
}

#[derive(Debug, Clone)]
pub struct PromptDescriptor {
    pub backend_id: Arc<str>,
    pub exposed_name: String,
    pub prompt: Prompt,
}

/// Everything one backend advertised at session-init time, as listed via
/// `list_all_tools`/`list_all_resources`/`list_all_prompts` on its
/// [`crate::session::BackendSession`]. Produced by the factory's per-backend
/// fan-out, consumed by [`crate::routing::RoutingTable::build`].
#[derive(Debug, Clone, Default)]
pub struct CapabilityList {
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
    pub prompts: Vec<PromptDescriptor>,
}

impl CapabilityList {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
            && self.resources.is_empty()
            && self.resource_templates.is_empty()
            && self.prompts.is_empty()
    }
}
