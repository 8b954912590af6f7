//! Per-slide chunk cleaning, classification and ingestion.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::{ExtractionState, SlidePartial};

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\A\s*```(?:html)?[ \t]*\r?\n?").expect("valid fence pattern"));
static FENCE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```\s*\z").expect("valid fence pattern"));
static HTML_TAG_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z!/]").expect("valid tag pattern"));
static DOCUMENT_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\A\s*(?:<!doctype html|<html)").expect("valid doctype pattern"));
static DOCUMENT_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</html>\s*\z").expect("valid closing tag pattern"));

/// How a cleaned chunk relates to what has been observed for its slide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkClass {
    /// The chunk opens a fresh document and replaces the buffer.
    Reset,
    /// First non-empty chunk for the slide.
    Bootstrap,
    /// A cumulative snapshot longer than the last one; only the new suffix is kept.
    Growth,
    /// Shorter than the last snapshot; appended verbatim.
    ///
    /// Unrelated fragments end up concatenated onto the buffer, which can
    /// produce malformed HTML. Assembly tolerates this.
    Shrink,
    /// Empty, or the same length as the last snapshot.
    Unchanged,
}

/// Classifies a cleaned chunk against the last observed length (in chars).
pub fn classify_chunk(chunk: &str, observed_len: usize) -> ChunkClass {
    if DOCUMENT_START.is_match(chunk) {
        return ChunkClass::Reset;
    }
    let len = chunk.chars().count();
    if len == 0 {
        ChunkClass::Unchanged
    } else if observed_len == 0 {
        ChunkClass::Bootstrap
    } else if len > observed_len {
        ChunkClass::Growth
    } else if len < observed_len {
        ChunkClass::Shrink
    } else {
        ChunkClass::Unchanged
    }
}

/// Strips markdown fences and repairs accidental JSON string escaping.
pub fn clean_chunk(raw: &str) -> String {
    let without_open = FENCE_OPEN.replace(raw, "");
    let stripped = FENCE_CLOSE.replace(&without_open, "");
    repair_string_escapes(&stripped)
}

fn repair_string_escapes(chunk: &str) -> String {
    let escaped = chunk.contains("\\n") || chunk.contains("\\t") || chunk.contains("\\\"");
    if !escaped || HTML_TAG_OPEN.is_match(chunk) {
        return chunk.to_string();
    }
    match serde_json::from_str::<String>(&format!("\"{chunk}\"")) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(error = %err, "string-literal repair failed, using literal replacement");
            chunk.replace("\\n", "\n").replace("\\\"", "\"")
        }
    }
}

/// Returns true when the buffer ends with a closing `</html>` tag.
pub fn is_complete_document(buffer: &str) -> bool {
    DOCUMENT_END.is_match(buffer)
}

/// Ingests one raw chunk addressed to `position`.
///
/// Returns `None` when the slide is already finalized and the chunk was
/// dropped; otherwise returns the current buffer, even when the chunk did not
/// change it.
pub fn ingest_chunk(state: &mut ExtractionState, position: u32, raw: &str) -> Option<SlidePartial> {
    let slide = state.slides.entry(position).or_default();
    if slide.finalized {
        debug!(position, "dropping chunk for finalized slide");
        return None;
    }

    let chunk = clean_chunk(raw);
    let chunk_len = chunk.chars().count();
    let class = classify_chunk(&chunk, slide.observed_len);
    debug!(position, ?class, chunk_len, observed_len = slide.observed_len, "slide chunk");

    match class {
        ChunkClass::Reset => {
            slide.buffer = chunk;
            slide.observed_len = chunk_len;
        }
        ChunkClass::Bootstrap => {
            slide.buffer.push_str(&chunk);
            slide.observed_len = chunk_len;
        }
        ChunkClass::Growth => {
            slide
                .buffer
                .extend(chunk.chars().skip(slide.observed_len));
            slide.observed_len = chunk_len;
        }
        ChunkClass::Shrink => {
            slide.buffer.push_str(&chunk);
            slide.observed_len = slide.buffer.chars().count();
        }
        ChunkClass::Unchanged => {}
    }

    if is_complete_document(&slide.buffer) {
        slide.finalized = true;
        info!(position, len = slide.buffer.len(), "slide finalized");
    }

    Some(SlidePartial {
        position,
        html: slide.buffer.clone(),
        complete: slide.finalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest_all(chunks: &[&str]) -> (ExtractionState, Vec<SlidePartial>) {
        let mut state = ExtractionState::default();
        let partials = chunks
            .iter()
            .filter_map(|chunk| ingest_chunk(&mut state, 1, chunk))
            .collect();
        (state, partials)
    }

    #[test]
    fn classifier_covers_each_case() {
        assert_eq!(classify_chunk("  <!DOCTYPE html><p>", 40), ChunkClass::Reset);
        assert_eq!(classify_chunk("<HTML lang=en>", 0), ChunkClass::Reset);
        assert_eq!(classify_chunk("<div>", 0), ChunkClass::Bootstrap);
        assert_eq!(classify_chunk("<div>ab", 5), ChunkClass::Growth);
        assert_eq!(classify_chunk("<p>", 5), ChunkClass::Shrink);
        assert_eq!(classify_chunk("<div>", 5), ChunkClass::Unchanged);
        assert_eq!(classify_chunk("", 5), ChunkClass::Unchanged);
    }

    #[test]
    fn reset_overrides_previous_buffer() {
        let (state, _) = ingest_all(&["<html>A", "<!doctype html><html>B"]);
        assert_eq!(state.slide(1).map(|s| s.buffer()), Some("<!doctype html><html>B"));
    }

    #[test]
    fn cumulative_snapshots_append_only_the_new_suffix() {
        let (state, _) = ingest_all(&["<html>AB", "<html>ABCD"]);
        assert_eq!(state.slide(1).map(|s| s.buffer()), Some("<html>ABCD"));

        let (state, partials) = ingest_all(&["<section>AB", "<section>ABCD", "<section>ABCDEF"]);
        assert_eq!(state.slide(1).map(|s| s.buffer()), Some("<section>ABCDEF"));
        assert_eq!(partials.len(), 3);
        assert_eq!(state.slide(1).map(|s| s.observed_len()), Some(15));
    }

    #[test]
    fn growth_counts_characters_not_bytes() {
        let (state, _) = ingest_all(&["<p>é", "<p>éü"]);
        assert_eq!(state.slide(1).map(|s| s.buffer()), Some("<p>éü"));
    }

    #[test]
    fn shrink_appends_the_chunk_verbatim() {
        let (state, _) = ingest_all(&["<div>long content", "<b>x"]);
        let slide = state.slide(1).expect("slide");
        assert_eq!(slide.buffer(), "<div>long content<b>x");
        assert_eq!(slide.observed_len(), slide.buffer().chars().count());
    }

    #[test]
    fn closing_tag_finalizes_and_later_chunks_are_dropped() {
        let mut state = ExtractionState::default();
        let done = ingest_chunk(&mut state, 2, "<html><body>Hi</body></html>\n").expect("partial");
        assert!(done.complete);

        let dropped = ingest_chunk(&mut state, 2, "<!doctype html><html>other");
        assert!(dropped.is_none());
        let slide = state.slide(2).expect("slide");
        assert!(slide.is_finalized());
        assert_eq!(slide.buffer(), "<html><body>Hi</body></html>\n");
    }

    #[test]
    fn every_accepted_chunk_reports_a_partial() {
        let (_, partials) = ingest_all(&["<div>a", "<div>a", "<div>ab"]);
        assert_eq!(partials.len(), 3);
        assert!(partials.iter().all(|p| !p.complete));
        assert_eq!(partials[1].html, "<div>a");
    }

    #[test]
    fn positions_are_independent() {
        let mut state = ExtractionState::default();
        ingest_chunk(&mut state, 1, "<html>one</html>");
        ingest_chunk(&mut state, 2, "<html>two");
        ingest_chunk(&mut state, 2, "<html>two and more");
        assert!(state.slide(1).is_some_and(|s| s.is_finalized()));
        assert_eq!(state.slide(1).map(|s| s.buffer()), Some("<html>one</html>"));
        assert_eq!(state.slide(2).map(|s| s.buffer()), Some("<html>two and more"));
        assert!(state.slide(2).is_some_and(|s| !s.is_finalized()));
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(clean_chunk("```html\n<div>x</div>\n```"), "<div>x</div>");
        assert_eq!(clean_chunk("```HTML<p>"), "<p>");
        assert_eq!(clean_chunk("<p>x</p>```"), "<p>x</p>");
    }

    #[test]
    fn json_escaped_text_is_decoded() {
        assert_eq!(clean_chunk(r#"line one\nline \"two\""#), "line one\nline \"two\"");
        assert_eq!(clean_chunk(r"col\tcol"), "col\tcol");
    }

    #[test]
    fn escapes_inside_html_are_left_alone() {
        let raw = r#"<div class=\"a\">x\ny</div>"#;
        assert_eq!(clean_chunk(raw), raw);
    }

    #[test]
    fn undecodable_escapes_fall_back_to_literal_replacement() {
        assert_eq!(clean_chunk(r#"bad \q escape\nnext \"q\""#), "bad \\q escape\nnext \"q\"");
    }
}
