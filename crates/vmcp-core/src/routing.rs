//! Merged, conflict-resolved routing table (spec §4.4).
//!
//! Built once, at session-creation time, from every connected backend's
//! [`CapabilityList`]. Immutable afterward: a vMCP session's capability set is
//! fixed for its lifetime, backends that fail mid-session don't get their
//! entries pulled, they just start failing dispatch (spec §4.2, "errors on a
//! live operation propagate to the caller verbatim").

use std::collections::BTreeMap;
use std::sync::Arc;

use rmcp::model::{Prompt, RawResource, RawResourceTemplate, Tool};

use crate::capability::CapabilityList;

#[derive(Debug, Clone)]
pub struct RoutedTool {
    pub backend_id: Arc<str>,
    pub tool: Tool,
}

#[derive(Debug, Clone)]
pub struct RoutedResource {
    pub backend_id: Arc<str>,
    pub resource: RawResource,
}

#[derive(Debug, Clone)]
pub struct RoutedResourceTemplate {
    pub backend_id: Arc<str>,
    pub template: RawResourceTemplate,
}

#[derive(Debug, Clone)]
pub struct RoutedPrompt {
    pub backend_id: Arc<str>,
    pub prompt: Prompt,
}

/// The merged view a vMCP session presents to its client. Lookups are by
/// exposed name; every entry also carries the `backend_id` that owns it so
/// [`crate::multi_session::MultiSession::dispatch`] knows where to route.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    tools: BTreeMap<String, RoutedTool>,
    resources: BTreeMap<String, RoutedResource>,
    resource_templates: Vec<RoutedResourceTemplate>,
    prompts: BTreeMap<String, RoutedPrompt>,
}

/// Inserts `value` at `key` unless an entry is already present from a
/// backend whose id sorts smaller than `candidate_backend_id` — the
/// deterministic "first writer wins, ties broken by ascending backend id"
/// rule from spec §4.4.
fn upsert_smallest<V>(
    map: &mut BTreeMap<String, V>,
    key: String,
    candidate_backend_id: &Arc<str>,
    value: V,
) where
    V: HasBackendId,
{
    match map.get(&key) {
        Some(existing) if existing.backend_id() <= candidate_backend_id => {}
        _ => {
            map.insert(key, value);
        }
    }
}

trait HasBackendId {
    fn backend_id(&self) -> &Arc<str>;
}

impl HasBackendId for RoutedTool {
    fn backend_id(&self) -> &Arc<str> {
        &self.backend_id
    }
}

impl HasBackendId for RoutedResource {
    fn backend_id(&self) -> &Arc<str> {
        &self.backend_id
    }
}

impl HasBackendId for RoutedPrompt {
    fn backend_id(&self) -> &Arc<str> {
        &self.backend_id
    }
}

impl RoutingTable {
    /// Merges capability lists from multiple backends. On a name collision the
    /// entry from the backend with the lexicographically smaller `backend_id`
    /// wins — deterministic, not first-come (fan-out is concurrent) and not
    /// configuration order dependent.
    pub fn build(lists: Vec<CapabilityList>) -> Self {
        let mut table = RoutingTable::default();
        for list in lists {
            for t in list.tools {
                upsert_smallest(&mut table.tools, t.exposed_name.clone(), &t.backend_id, RoutedTool {
                    backend_id: t.backend_id.clone(),
                    tool: t.tool,
                });
            }
            for r in list.resources {
                upsert_smallest(&mut table.resources, r.resource.uri.clone(), &r.backend_id, RoutedResource {
                    backend_id: r.backend_id.clone(),
                    resource: r.resource,
                });
            }
            for rt in list.resource_templates {
                table.resource_templates.push(RoutedResourceTemplate {
                    backend_id: rt.backend_id,
                    template: rt.template,
                });
            }
            for p in list.prompts {
                upsert_smallest(&mut table.prompts, p.exposed_name.clone(), &p.backend_id, RoutedPrompt {
                    backend_id: p.backend_id.clone(),
                    prompt: p.prompt,
                });
            }
        }
        table
    }

    pub fn resolve_tool(&self, name: &str) -> Option<&RoutedTool> {
        self.tools.get(name)
    }

    pub fn resolve_resource(&self, uri: &str) -> Option<&RoutedResource> {
        self.resources.get(uri)
    }

    pub fn resolve_prompt(&self, name: &str) -> Option<&RoutedPrompt> {
        self.prompts.get(name)
    }

    /// Snapshot copy, never a reference into the table (spec §3 accessor rule).
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.values().map(|r| r.tool.clone()).collect()
    }

    pub fn resources(&self) -> Vec<RawResource> {
        self.resources.values().map(|r| r.resource.clone()).collect()
    }

    pub fn resource_templates(&self) -> Vec<RawResourceTemplate> {
        self.resource_templates
            .iter()
            .map(|r| r.template.clone())
            .collect()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.values().map(|r| r.prompt.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ToolDescriptor;
    use rmcp::model::Tool;
    use std::sync::Arc as StdArc;

    fn tool_list(backend_id: &str, name: &str) -> CapabilityList {
        CapabilityList {
            tools: vec![ToolDescriptor {
                backend_id: StdArc::from(backend_id),
                exposed_name: name.to_string(),
                tool: Tool::new(name.to_string(), "a tool", StdArc::new(Default::default())),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn conflicting_tool_names_resolve_to_smaller_backend_id() {
        let table = RoutingTable::build(vec![tool_list("zzz", "search"), tool_list("aaa", "search")]);
        let resolved = table.resolve_tool("search").expect("tool present");
        assert_eq!(&*resolved.backend_id, "aaa");
    }

    #[test]
    fn non_conflicting_tools_from_both_backends_present() {
        let table = RoutingTable::build(vec![tool_list("b1", "search"), tool_list("b2", "fetch")]);
        assert!(table.resolve_tool("search").is_some());
        assert!(table.resolve_tool("fetch").is_some());
    }
}
