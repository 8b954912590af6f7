//! Incremental `text/event-stream` framer.
//!
//! The framer accepts text in arbitrarily sized pieces and emits one
//! [`SseEvent`] per blank-line-terminated block. It knows nothing about the
//! payloads it carries.

use tracing::trace;

/// Event name used when a block carries no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// One framed server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (`message` unless the block set one).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last `id:` value in the block, if any.
    pub id: Option<String>,
    /// Reconnection hint in milliseconds; zero or invalid values are dropped.
    pub retry: Option<u64>,
}

impl Default for SseEvent {
    fn default() -> Self {
        Self {
            event: DEFAULT_EVENT_NAME.to_string(),
            data: String::new(),
            id: None,
            retry: None,
        }
    }
}

/// Whether a `feed` call is followed by more input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FeedMode {
    /// More input may follow; a trailing partial line stays buffered.
    #[default]
    Incremental,
    /// The stream has ended; buffered input is parsed and dispatched.
    Flush,
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: String,
    id: Option<String>,
    retry: Option<u64>,
}

impl PendingEvent {
    fn has_content(&self) -> bool {
        !self.data.is_empty() || self.id.is_some() || self.retry.is_some()
    }

    fn snapshot(&self) -> SseEvent {
        SseEvent {
            event: self
                .event
                .clone()
                .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
            data: self.data.clone(),
            id: self.id.clone(),
            retry: self.retry,
        }
    }
}

/// Stateful line-oriented SSE parser.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
    pending: PendingEvent,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event it completed, in order.
    pub fn feed(&mut self, chunk: &str, mode: FeedMode) -> Vec<SseEvent> {
        let mut events = Vec::new();
        self.feed_with(chunk, mode, |event| events.push(event));
        events
    }

    /// Feeds a chunk, calling `on_event` synchronously for each completed event.
    pub fn feed_with(&mut self, chunk: &str, mode: FeedMode, mut on_event: impl FnMut(SseEvent)) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.push_str(chunk);

        let mut consumed = 0;
        while let Some(offset) = buffer[consumed..].find('\n') {
            let end = consumed + offset;
            let line = &buffer[consumed..end];
            self.process_line(line.strip_suffix('\r').unwrap_or(line), &mut on_event);
            consumed = end + 1;
        }
        let rest = &buffer[consumed..];

        if mode == FeedMode::Flush {
            if !rest.is_empty() {
                self.process_line(rest.strip_suffix('\r').unwrap_or(rest), &mut on_event);
            }
            self.dispatch(&mut on_event);
            return;
        }
        self.buffer = rest.to_string();
    }

    /// Drops buffered input and any half-assembled event.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending = PendingEvent::default();
    }

    fn process_line(&mut self, line: &str, on_event: &mut impl FnMut(SseEvent)) {
        if line.is_empty() {
            self.dispatch(on_event);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.pending.event = Some(value.to_string()).filter(|name| !name.is_empty());
            }
            "data" => {
                if !self.pending.data.is_empty() {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
            }
            "id" => self.pending.id = Some(value.to_string()),
            "retry" => {
                self.pending.retry = value.trim().parse::<u64>().ok().filter(|ms| *ms > 0);
            }
            other => trace!(field = other, "ignoring unknown SSE field"),
        }
    }

    fn dispatch(&mut self, on_event: &mut impl FnMut(SseEvent)) {
        if self.pending.has_content() {
            on_event(self.pending.snapshot());
        }
        self.pending = PendingEvent::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str =
        "id: 1\nevent: delta\ndata: {\"a\":1}\n\n: keepalive\n\ndata: foo\ndata: bar\nretry: 1500\n\n";

    #[test]
    fn multi_line_data_is_joined_with_newlines() {
        let mut framer = SseFramer::new();
        let events = framer.feed("id: 1\ndata: foo\ndata: bar\n\n", FeedMode::Incremental);
        assert_eq!(
            events,
            vec![SseEvent {
                event: "message".into(),
                data: "foo\nbar".into(),
                id: Some("1".into()),
                retry: None,
            }]
        );
    }

    #[test]
    fn byte_by_byte_feeding_matches_single_feed() {
        let mut whole = SseFramer::new();
        let expected = whole.feed(WELL_FORMED, FeedMode::Incremental);

        let mut split = SseFramer::new();
        let mut actual = Vec::new();
        for ch in WELL_FORMED.chars() {
            actual.extend(split.feed(&ch.to_string(), FeedMode::Incremental));
        }

        assert_eq!(expected.len(), 2);
        assert_eq!(actual, expected);
        assert_eq!(expected[0].event, "delta");
        assert_eq!(expected[1].retry, Some(1500));
    }

    #[test]
    fn crlf_line_endings_are_supported() {
        let mut framer = SseFramer::new();
        let events = framer.feed("event: x\r\ndata: hi\r\n\r\n", FeedMode::Incremental);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "x");
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn flush_dispatches_unterminated_trailing_line() {
        let mut framer = SseFramer::new();
        assert!(framer.feed("data: partial", FeedMode::Incremental).is_empty());
        let events = framer.feed("", FeedMode::Flush);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn flush_dispatches_block_missing_its_blank_line() {
        let mut framer = SseFramer::new();
        assert!(framer.feed("data: a\n", FeedMode::Incremental).is_empty());
        let events = framer.feed("", FeedMode::Flush);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a");
    }

    #[test]
    fn blocks_without_data_id_or_retry_are_dropped() {
        let mut framer = SseFramer::new();
        let events = framer.feed("event: ping\n\n\n\n", FeedMode::Incremental);
        assert!(events.is_empty());
    }

    #[test]
    fn invalid_or_zero_retry_degrades_to_none() {
        let mut framer = SseFramer::new();
        let events = framer.feed(
            "data: a\nretry: soon\n\ndata: b\nretry: 0\n\n",
            FeedMode::Incremental,
        );
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.retry.is_none()));
    }

    #[test]
    fn only_one_leading_space_is_stripped_and_bare_fields_are_empty() {
        let mut framer = SseFramer::new();
        let events = framer.feed("data:  two\ndata\nid\n\n", FeedMode::Incremental);
        assert_eq!(events[0].data, " two\n");
        assert_eq!(events[0].id.as_deref(), Some(""));
    }

    #[test]
    fn event_name_resets_after_dispatch() {
        let mut framer = SseFramer::new();
        let events = framer.feed("event: a\ndata: 1\n\ndata: 2\n\n", FeedMode::Incremental);
        assert_eq!(events[0].event, "a");
        assert_eq!(events[1].event, DEFAULT_EVENT_NAME);
    }

    #[test]
    fn callback_form_sees_events_in_order() {
        let mut framer = SseFramer::new();
        let mut seen = Vec::new();
        framer.feed_with("data: 1\n\ndata: 2\n\n", FeedMode::Incremental, |e| {
            seen.push(e.data)
        });
        assert_eq!(seen, vec!["1", "2"]);
    }

    #[test]
    fn reset_discards_partial_state() {
        let mut framer = SseFramer::new();
        framer.feed("data: stale\nda", FeedMode::Incremental);
        framer.reset();
        let events = framer.feed("data: fresh\n\n", FeedMode::Incremental);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "fresh");
    }
}
