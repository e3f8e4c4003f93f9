//! Tool-call result content blocks (spec §6): every tool call, whether
//! against a skill, a proxied upstream, or a management tool, answers
//! with the same `{content: [...], isError}` shape a downstream agent
//! expects from any MCP tool.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
    Resource { uri: String, text: Option<String>, mime_type: Option<String> },
}

/// Wraps a plain message as a single text block.
pub fn text(message: impl Into<String>) -> Vec<ContentBlock> {
    vec![ContentBlock::Text { text: message.into() }]
}

/// Converts a tool's raw JSON output into content blocks. An upstream
/// result that already looks like `{"content": [...]}` is passed
/// through block-by-block; anything else is wrapped as one text block,
/// pretty-printed if it isn't already a string.
pub fn to_content(value: Value) -> Vec<ContentBlock> {
    if let Some(blocks) = value.get("content").and_then(Value::as_array) {
        let converted: Vec<ContentBlock> = blocks.iter().map(block_from_value).collect();
        if !converted.is_empty() {
            return converted;
        }
    }
    vec![block_from_value(&value)]
}

fn block_from_value(value: &Value) -> ContentBlock {
    if let Some(s) = value.as_str() {
        return ContentBlock::Text { text: s.to_string() };
    }
    let kind = value.get("type").and_then(Value::as_str);
    match kind {
        Some("text") => ContentBlock::Text {
            text: value.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
        },
        Some("image") => ContentBlock::Image {
            data: value.get("data").and_then(Value::as_str).unwrap_or_default().to_string(),
            mime_type: value.get("mimeType").and_then(Value::as_str).unwrap_or("application/octet-stream").to_string(),
        },
        Some("audio") => ContentBlock::Audio {
            data: value.get("data").and_then(Value::as_str).unwrap_or_default().to_string(),
            mime_type: value.get("mimeType").and_then(Value::as_str).unwrap_or("application/octet-stream").to_string(),
        },
        Some("resource") => ContentBlock::Resource {
            uri: value.get("uri").and_then(Value::as_str).unwrap_or_default().to_string(),
            text: value.get("text").and_then(Value::as_str).map(str::to_string),
            mime_type: value.get("mimeType").and_then(Value::as_str).map(str::to_string),
        },
        _ => ContentBlock::Text {
            text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_becomes_one_text_block() {
        let blocks = to_content(Value::String("ok".into()));
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == "ok"));
    }

    #[test]
    fn pre_shaped_content_list_passes_through() {
        let value = serde_json::json!({"content": [{"type": "text", "text": "hi"}]});
        let blocks = to_content(value);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == "hi"));
    }

    #[test]
    fn bare_object_is_pretty_printed_as_text() {
        let value = serde_json::json!({"ok": true});
        let blocks = to_content(value);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0], ContentBlock::Text { .. }));
    }
}
