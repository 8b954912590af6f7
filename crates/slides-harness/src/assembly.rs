//! Finalization of extraction buffers into complete slide documents.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::extract::ExtractionState;

static FENCE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:html)?").expect("valid fence pattern"));
static DOCTYPE_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<!doctype html.*?</html>").expect("valid document pattern"));
static HTML_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<html(?:\s[^>]*)?>.*?</html>").expect("valid document pattern"));

/// A finalized slide.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GeneratedSlide {
    /// 1-based page number, equal to the tool call position.
    pub page_number: u32,
    /// Complete HTML document.
    pub html: String,
    /// Latest raw content received for the slide.
    pub draft: String,
    /// Whether the agent closed the document itself.
    pub complete: bool,
}

/// Builds the ordered slide list from an extraction state.
///
/// Every position with content yields a renderable document. When no slide
/// tool call ever carried content, the assistant text channel is searched for
/// a single embedded document, which becomes page 1.
pub fn finalize_slides(state: &ExtractionState) -> Vec<GeneratedSlide> {
    let slides: Vec<GeneratedSlide> = state
        .slides()
        .filter(|(_, slide)| !slide.buffer().is_empty())
        .map(|(position, slide)| {
            let html = match extract_document(slide.buffer()) {
                Some(document) => document,
                None => {
                    warn!(position, "no complete document in slide buffer, wrapping content");
                    minimal_document(position, &strip_fences(slide.buffer()))
                }
            };
            GeneratedSlide {
                page_number: position,
                html,
                draft: slide.buffer().to_string(),
                complete: slide.is_finalized(),
            }
        })
        .collect();

    if !slides.is_empty() {
        return slides;
    }

    match extract_document(state.assistant_text()) {
        Some(html) => {
            debug!("using document embedded in assistant text as page 1");
            vec![GeneratedSlide {
                page_number: 1,
                html,
                draft: state.assistant_text().to_string(),
                complete: true,
            }]
        }
        None => Vec::new(),
    }
}

/// Returns the first complete HTML document in `text`, fences removed.
pub fn extract_document(text: &str) -> Option<String> {
    let cleaned = strip_fences(text);
    DOCTYPE_DOCUMENT
        .find(&cleaned)
        .or_else(|| HTML_DOCUMENT.find(&cleaned))
        .map(|m| m.as_str().to_string())
}

/// Wraps arbitrary content in a minimal, valid HTML document.
pub fn minimal_document(position: u32, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>Slide {position}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

fn strip_fences(text: &str) -> String {
    FENCE_MARKER.replace_all(text, "").into_owned()
}
