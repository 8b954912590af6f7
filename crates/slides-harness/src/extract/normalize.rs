//! Normalizes loosely shaped agent payloads into a fixed internal shape.
//!
//! Every "field may be a scalar or an array" and "several names for the same
//! thing" rule for the agent protocol lives in this file; the rest of the
//! extraction code only sees [`AgentPayload`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

/// Position used when a tool call carries no parseable position.
pub const DEFAULT_POSITION: u32 = 1;

/// Delta fields in priority order.
const RAW_FIELDS: [&str; 4] = ["output_delta", "delta", "output", "html"];

static SLIDE_TOOL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(insert|add).*?(page|slide)").expect("valid slide tool pattern"));

/// A tool invocation that inserts or appends a slide.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlideToolCall {
    pub name: String,
    pub position: u32,
    pub raw: String,
}

/// One content item after normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    ToolCall(SlideToolCall),
    Text(String),
}

/// Fixed-shape view of one decoded event payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentPayload {
    pub conversation_id: Option<String>,
    /// Content parts from `choices[].messages[].content[]` in array order.
    pub parts: Vec<ContentPart>,
    /// Top-level text deltas (`output_text.delta`, `delta`).
    pub top_level_text: Vec<String>,
}

/// Returns true when a tool name denotes inserting or adding a page/slide.
pub fn is_slide_tool(name: &str) -> bool {
    SLIDE_TOOL_NAME.is_match(&name.to_lowercase())
}

pub fn normalize_payload(payload: &Value) -> AgentPayload {
    let mut normalized = AgentPayload {
        conversation_id: payload
            .get("conversation_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToOwned::to_owned),
        ..AgentPayload::default()
    };

    for choice in as_sequence(payload.get("choices")) {
        let messages = choice.get("messages").or_else(|| choice.get("message"));
        for message in as_sequence(messages) {
            match message.get("content") {
                Some(Value::String(text)) => normalized.parts.push(ContentPart::Text(text.clone())),
                content => {
                    for item in as_sequence(content) {
                        if let Some(part) = content_part(item) {
                            normalized.parts.push(part);
                        }
                    }
                }
            }
        }
    }

    if let Some(delta) = payload
        .get("output_text")
        .and_then(|v| v.get("delta"))
        .and_then(Value::as_str)
    {
        normalized.top_level_text.push(delta.to_string());
    }
    if let Some(delta) = payload.get("delta").and_then(Value::as_str) {
        normalized.top_level_text.push(delta.to_string());
    }

    normalized
}

fn as_sequence(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

fn content_part(item: &Value) -> Option<ContentPart> {
    let kind = item.get("type").and_then(Value::as_str);
    if kind == Some("text") {
        return item
            .get("text")
            .and_then(Value::as_str)
            .map(|text| ContentPart::Text(text.to_string()));
    }

    let target = match kind {
        Some("object") => item.get("object").filter(|v| v.is_object()).unwrap_or(item),
        _ => item,
    };
    let name = target
        .get("tool_name")
        .or_else(|| target.get("name"))
        .and_then(Value::as_str)?;
    if !is_slide_tool(name) {
        trace!(tool = name, "ignoring non-slide tool call");
        return None;
    }

    let raw = RAW_FIELDS
        .iter()
        .find_map(|field| target.get(*field).and_then(Value::as_str).filter(|s| !s.is_empty()))?;

    Some(ContentPart::ToolCall(SlideToolCall {
        name: name.to_lowercase(),
        position: slide_position(target),
        raw: raw.to_string(),
    }))
}

fn slide_position(target: &Value) -> u32 {
    let from_position = match target.get("position") {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };
    from_position
        .and_then(parse_position)
        .or_else(|| target.get("page_index").and_then(parse_position))
        .unwrap_or(DEFAULT_POSITION)
}

fn parse_position(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
