use serde_json::{Value, json};

use crate::errors::SlidesError;

/// What to ask the agent for.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SlideDeckRequest {
    /// User instruction; must not be blank.
    pub prompt: String,
    /// Continue an existing conversation (edits to an earlier deck).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Knowledge base the agent should ground the deck in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
}

impl SlideDeckRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn knowledge_base_id(mut self, id: impl Into<String>) -> Self {
        self.knowledge_base_id = Some(id.into());
        self
    }
}

/// Builds the JSON body for a streaming agent call.
///
/// Blank optional ids are omitted rather than sent as empty strings.
pub fn build_request_body(agent_id: &str, request: &SlideDeckRequest) -> Result<Value, SlidesError> {
    if request.prompt.trim().is_empty() {
        return Err(SlidesError::Validation("prompt must not be empty".into()));
    }

    let mut body = json!({
        "agent_id": agent_id,
        "stream": true,
        "messages": [{
            "role": "user",
            "content": [{"type": "text", "text": request.prompt}],
        }],
    });
    if let Some(id) = non_blank(&request.conversation_id) {
        body["conversation_id"] = Value::String(id.to_string());
    }
    if let Some(id) = non_blank(&request.knowledge_base_id) {
        body["knowledge_base_id"] = Value::String(id.to_string());
    }
    Ok(body)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
