//! Result shaping (spec §4.2): backend responses are normalized into a single
//! predictable shape before they reach the vMCP client, rather than forwarded
//! as whatever the owning backend happened to return.

use rmcp::model::{
    CallToolResult, Content, GetPromptResult, PromptMessageContent, PromptMessageRole,
    RawContent, ReadResourceResult, ResourceContents,
};
use serde_json::{Map, Value};

/// A tool call result with its content normalized: if the backend returned no
/// structured content but did return content blocks, synthesize a structured
/// `{"content": [...]}` map so callers can rely on `structured_content` always
/// being populated when `content` is non-empty.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub content: Vec<Content>,
    pub structured_content: Option<Value>,
    pub is_error: bool,
}

pub fn shape_call_tool_result(result: CallToolResult) -> ToolCallResult {
    let is_error = result.is_error.unwrap_or(false);
    let content = result.content.clone().unwrap_or_default();
    let structured_content = result.structured_content.clone().or_else(|| {
        if content.is_empty() {
            None
        } else {
            let mut map = Map::new();
            map.insert(
                "content".to_string(),
                Value::Array(content.iter().map(content_to_json).collect()),
            );
            Some(Value::Object(map))
        }
    });
    ToolCallResult {
        content,
        structured_content,
        is_error,
    }
}

fn content_to_json(content: &Content) -> Value {
    serde_json::to_value(content).unwrap_or(Value::Null)
}

/// A resource read result with every content part concatenated into a single
/// mime-typed payload. A backend resource can legally return multiple parts
/// (e.g. paginated text); the vMCP surface exposes one logical resource body.
#[derive(Debug, Clone)]
pub struct ResourceReadResult {
    pub mime_type: Option<String>,
    pub text: Option<String>,
    pub blob: Option<String>,
}

pub fn shape_read_resource_result(result: ReadResourceResult) -> ResourceReadResult {
    let mut mime_type = None;
    let mut text = String::new();
    let mut blob = String::new();
    let mut has_text = false;
    let mut has_blob = false;

    for contents in result.contents {
        match contents {
            ResourceContents::TextResourceContents {
                text: part,
                mime_type: mt,
                ..
            } => {
                if mime_type.is_none() {
                    mime_type = mt;
                }
                text.push_str(&part);
                has_text = true;
            }
            ResourceContents::BlobResourceContents {
                blob: part,
                mime_type: mt,
                ..
            } => {
                if mime_type.is_none() {
                    mime_type = mt;
                }
                blob.push_str(&part);
                has_blob = true;
            }
        }
    }

    ResourceReadResult {
        mime_type,
        text: has_text.then_some(text),
        blob: has_blob.then_some(blob),
    }
}

/// A prompt result flattened into one lossy text block. Non-text message
/// content (images, embedded resources) is dropped rather than propagated,
/// since the vMCP surface does not promise multi-modal prompt fidelity.
#[derive(Debug, Clone)]
pub struct PromptGetResult {
    pub description: Option<String>,
    pub text: String,
}

pub fn shape_get_prompt_result(result: GetPromptResult) -> PromptGetResult {
    let mut text = String::new();
    for message in result.messages {
        if let PromptMessageContent::Text { text: part } = message.content {
            let role = match message.role {
                PromptMessageRole::User => "user",
                PromptMessageRole::Assistant => "assistant",
            };
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(role);
            text.push_str(": ");
            text.push_str(&part);
        }
    }
    PromptGetResult {
        description: result.description,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_structured_content_from_text_content() {
        let result = CallToolResult {
            content: Some(vec![Content::new(RawContent::text("hello"), None)]),
            structured_content: None,
            is_error: Some(false),
        };
        let shaped = shape_call_tool_result(result);
        assert!(shaped.structured_content.is_some());
        assert!(!shaped.is_error);
    }

    #[test]
    fn prefers_existing_structured_content() {
        let structured = serde_json::json!({"ok": true});
        let result = CallToolResult {
            content: Some(vec![Content::new(RawContent::text("hello"), None)]),
            structured_content: Some(structured.clone()),
            is_error: Some(false),
        };
        let shaped = shape_call_tool_result(result);
        assert_eq!(shaped.structured_content, Some(structured));
    }
}
