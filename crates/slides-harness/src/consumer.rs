//! Stream consumer: bytes in, slide events out.
//!
//! The consumer is synchronous; the async read loop in `run` only pulls body
//! chunks and forwards whatever the consumer returns.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::GenerationOutput;
use crate::assembly::finalize_slides;
use crate::extract::{ExtractionState, walk_event};
use crate::sse::{FeedMode, SseEvent, SseFramer};
use crate::stream::SlideEvent;

/// Data value the agent sends to mark the logical end of the stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Incremental UTF-8 decoder that carries incomplete sequences across reads.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flushes a dangling partial sequence as replacement characters.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Drives framing, deduplication and extraction for one agent stream.
#[derive(Debug)]
pub struct StreamConsumer {
    decoder: Utf8StreamDecoder,
    framer: SseFramer,
    seen_ids: HashSet<String>,
    extraction: ExtractionState,
    transcript: Option<String>,
    done: bool,
}

impl StreamConsumer {
    pub fn new(capture_transcript: bool) -> Self {
        Self {
            decoder: Utf8StreamDecoder::default(),
            framer: SseFramer::new(),
            seen_ids: HashSet::new(),
            extraction: ExtractionState::new(),
            transcript: capture_transcript.then(String::new),
            done: false,
        }
    }

    /// True once the `[DONE]` marker has been seen; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn extraction(&self) -> &ExtractionState {
        &self.extraction
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SlideEvent> {
        let text = self.decoder.decode(bytes);
        self.push_text(&text, FeedMode::Incremental)
    }

    /// Flushes the decoder and framer after the body ended without `[DONE]`.
    pub fn finish(&mut self) -> Vec<SlideEvent> {
        if self.done {
            return Vec::new();
        }
        let text = self.decoder.finish();
        self.push_text(&text, FeedMode::Flush)
    }

    /// Assembles the final output. The conversation id reported by the agent
    /// wins over `requested_conversation_id`.
    pub fn into_output(self, requested_conversation_id: Option<String>) -> GenerationOutput {
        let slides = finalize_slides(&self.extraction);
        GenerationOutput {
            conversation_id: self
                .extraction
                .conversation_id
                .or(requested_conversation_id),
            slides,
            assistant_text: self.extraction.assistant_text,
            transcript: self.transcript,
        }
    }

    fn push_text(&mut self, text: &str, mode: FeedMode) -> Vec<SlideEvent> {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.push_str(text);
        }
        let mut out = Vec::new();
        for event in self.framer.feed(text, mode) {
            self.handle_event(event, &mut out);
        }
        out
    }

    fn handle_event(&mut self, event: SseEvent, out: &mut Vec<SlideEvent>) {
        if self.done {
            return;
        }
        let data = event.data.trim();
        if data == DONE_MARKER {
            info!("agent signalled end of stream");
            self.done = true;
            return;
        }
        if let Some(id) = event.id.as_ref()
            && !self.seen_ids.insert(id.clone())
        {
            debug!(id = %id, "dropping duplicate event");
            return;
        }
        if data.is_empty() {
            return;
        }

        let payload: Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(event = %event.event, error = %err, "skipping malformed event payload");
                out.push(SlideEvent::log(format!("Skipped malformed event payload: {err}")));
                return;
            }
        };

        if let Some(message) = payload
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(Value::as_str)
        {
            warn!(agent_message = message, "agent reported an error in the stream");
            out.push(SlideEvent::log(format!("Agent reported: {message}")));
        }

        let had_conversation = self.extraction.conversation_id.is_some();
        for partial in walk_event(&mut self.extraction, &payload) {
            if partial.complete {
                out.push(SlideEvent::log(format!("Slide {} complete", partial.position)));
            }
            out.push(SlideEvent::Partial(partial));
        }
        if !had_conversation && let Some(id) = self.extraction.conversation_id() {
            out.push(SlideEvent::log(format!("Conversation {id}")));
        }
    }
}
