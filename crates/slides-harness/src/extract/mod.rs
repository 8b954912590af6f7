//! Extraction state machine: turns decoded agent payloads into per-slide HTML.
//!
//! One [`ExtractionState`] lives for the duration of one stream. Payloads are
//! normalized first (see [`normalize`]), then each slide tool call is routed to
//! [`ingest_chunk`] for the position it addresses.

mod chunk;
pub mod normalize;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

pub use chunk::{ChunkClass, classify_chunk, clean_chunk, ingest_chunk, is_complete_document};
pub use normalize::{AgentPayload, ContentPart, SlideToolCall, normalize_payload};

/// Accumulated content for one slide position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlideToolState {
    pub(crate) buffer: String,
    pub(crate) observed_len: usize,
    pub(crate) finalized: bool,
}

impl SlideToolState {
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Length in chars of the last snapshot the agent sent.
    pub fn observed_len(&self) -> usize {
        self.observed_len
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

/// Live-preview update for one slide.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SlidePartial {
    pub position: u32,
    pub html: String,
    pub complete: bool,
}

/// Per-stream extraction state.
#[derive(Clone, Debug, Default)]
pub struct ExtractionState {
    pub(crate) slides: BTreeMap<u32, SlideToolState>,
    pub(crate) assistant_text: String,
    pub(crate) conversation_id: Option<String>,
}

impl ExtractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slide(&self, position: u32) -> Option<&SlideToolState> {
        self.slides.get(&position)
    }

    /// Slides in ascending position order.
    pub fn slides(&self) -> impl Iterator<Item = (u32, &SlideToolState)> {
        self.slides.iter().map(|(position, slide)| (*position, slide))
    }

    /// Narrative text the agent emitted outside slide tool calls.
    pub fn assistant_text(&self) -> &str {
        &self.assistant_text
    }

    /// First non-empty conversation id seen in the stream.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }
}

/// Applies one decoded event payload and returns the slide updates it caused,
/// in content order.
pub fn walk_event(state: &mut ExtractionState, payload: &Value) -> Vec<SlidePartial> {
    let normalized = normalize_payload(payload);

    if state.conversation_id.is_none()
        && let Some(id) = normalized.conversation_id
    {
        debug!(conversation_id = %id, "conversation id resolved");
        state.conversation_id = Some(id);
    }

    let mut partials = Vec::new();
    for part in normalized.parts {
        match part {
            ContentPart::ToolCall(call) => {
                if let Some(partial) = ingest_chunk(state, call.position, &call.raw) {
                    partials.push(partial);
                }
            }
            ContentPart::Text(text) => state.assistant_text.push_str(&text),
        }
    }
    for text in normalized.top_level_text {
        state.assistant_text.push_str(&text);
    }
    partials
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert_page(position: u32, delta: &str) -> Value {
        json!({
            "choices": [{"messages": [{"content": [{
                "type": "object",
                "object": {"tool_name": "insert_page", "position": [position], "output_delta": delta}
            }]}]}]
        })
    }

    #[test]
    fn tool_calls_route_to_their_positions() {
        let mut state = ExtractionState::new();
        let first = walk_event(&mut state, &insert_page(2, "<!doctype html><html><body>Hi"));
        let second = walk_event(
            &mut state,
            &insert_page(2, "<!doctype html><html><body>Hi</body></html>"),
        );

        assert_eq!(first.len(), 1);
        assert!(!first[0].complete);
        assert_eq!(second[0].position, 2);
        assert!(second[0].complete);
        assert!(state.slide(1).is_none());
        assert_eq!(
            state.slide(2).map(SlideToolState::buffer),
            Some("<!doctype html><html><body>Hi</body></html>")
        );
    }

    #[test]
    fn finalized_slide_ignores_further_payloads() {
        let mut state = ExtractionState::new();
        walk_event(&mut state, &insert_page(1, "<html>done</html>"));
        let later = walk_event(&mut state, &insert_page(1, "<html>again"));
        assert!(later.is_empty());
        assert_eq!(state.slide(1).map(SlideToolState::buffer), Some("<html>done</html>"));
    }

    #[test]
    fn text_parts_feed_the_assistant_buffer() {
        let mut state = ExtractionState::new();
        walk_event(
            &mut state,
            &json!({"choices": [{"messages": [{"content": [{"type": "text", "text": "Here: "}]}]}]}),
        );
        walk_event(&mut state, &json!({"delta": "<html>x</html>"}));
        assert_eq!(state.assistant_text(), "Here: <html>x</html>");
        assert_eq!(state.slides().count(), 0);
    }

    #[test]
    fn first_conversation_id_wins() {
        let mut state = ExtractionState::new();
        walk_event(&mut state, &json!({"conversation_id": ""}));
        walk_event(&mut state, &json!({"conversation_id": "c-1"}));
        walk_event(&mut state, &json!({"conversation_id": "c-2"}));
        assert_eq!(state.conversation_id(), Some("c-1"));
    }
}
