use crate::assembly::GeneratedSlide;

/// Final result of a completed generation.
#[derive(Clone, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct GenerationOutput {
    /// First conversation id the agent reported, or the one supplied by the caller.
    pub conversation_id: Option<String>,
    /// Slides in ascending page order.
    pub slides: Vec<GeneratedSlide>,
    /// Narrative text emitted outside slide tool calls.
    pub assistant_text: String,
    /// Raw SSE text, when transcript capture was requested.
    pub transcript: Option<String>,
}

impl GenerationOutput {
    pub fn slide(&self, page_number: u32) -> Option<&GeneratedSlide> {
        self.slides.iter().find(|s| s.page_number == page_number)
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}
