//! Server-Sent Events decoder, grounded in the `parse::aws_sse`/`parse::sse`
//! buffered-decoder pattern but hand-rolled against the text SSE grammar: events
//! separated by a blank line, only `event:`/`data:` are meaningful, multi-line `data:`
//! values are concatenated, comments (`:`-prefixed lines) and `ping` events are ignored,
//! and partial events are retained across calls until a terminating `\n\n`.

use bytes::{Buf, BytesMut};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
	pub event: Option<String>,
	pub data: String,
}

/// Backpressure bound: an event's buffer is capped at the largest legal single frame of
/// the incoming protocol, which for SSE is one event's worth of bytes.
const MAX_BUFFERED_EVENT_BYTES: usize = 1024 * 1024;

#[derive(Default)]
pub struct SseDecoder {
	buf: BytesMut,
}

impl SseDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feed more bytes in and drain as many complete events as are now available.
	/// Partial events (no terminating blank line yet) stay buffered for the next call,
	/// so feeding the same byte stream split at arbitrary boundaries yields the same
	/// sequence of logical events.
	pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, crate::error::TranslationError> {
		self.buf.extend_from_slice(chunk);
		if self.buf.len() > MAX_BUFFERED_EVENT_BYTES {
			return Err(crate::error::TranslationError::Framing(
				"SSE event exceeded maximum buffered size".to_string(),
			));
		}
		let mut events = Vec::new();
		loop {
			let Some(boundary) = find_double_newline(&self.buf) else {
				break;
			};
			let raw = self.buf.split_to(boundary);
			self.buf.advance(consume_separator_len(&self.buf));
			if let Some(event) = parse_event(&raw) {
				events.push(event);
			}
		}
		Ok(events)
	}
}

/// Find the first `\n\n` (also tolerating `\r\n\r\n`), returning the index right before
/// the blank line so the caller can split off the event body.
fn find_double_newline(buf: &BytesMut) -> Option<usize> {
	let s = buf.as_ref();
	let mut i = 0;
	while i + 1 < s.len() {
		if s[i] == b'\n' && s[i + 1] == b'\n' {
			return Some(i);
		}
		if i + 3 < s.len() && &s[i..i + 4] == b"\r\n\r\n" {
			return Some(i);
		}
		i += 1;
	}
	None
}

fn consume_separator_len(buf: &BytesMut) -> usize {
	if buf.starts_with(b"\r\n\r\n") {
		4
	} else if buf.starts_with(b"\n\n") {
		2
	} else {
		0
	}
}

fn parse_event(raw: &[u8]) -> Option<SseEvent> {
	let text = String::from_utf8_lossy(raw);
	let mut event_name: Option<String> = None;
	let mut data_lines: Vec<String> = Vec::new();
	for line in text.split(['\n']) {
		let line = line.strip_suffix('\r').unwrap_or(line);
		if line.is_empty() {
			continue;
		}
		if line.starts_with(':') {
			// Comment line, ignored per spec.
			continue;
		}
		if let Some(rest) = line.strip_prefix("event:") {
			event_name = Some(rest.trim_start().to_string());
		} else if let Some(rest) = line.strip_prefix("data:") {
			data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
		}
		// Other fields (id:, retry:) are not meaningful to this gateway and are dropped.
	}
	if event_name.as_deref() == Some("ping") {
		return None;
	}
	if data_lines.is_empty() && event_name.is_none() {
		return None;
	}
	Some(SseEvent {
		event: event_name,
		data: data_lines.join("\n"),
	})
}

/// Format a single logical event for the client's outgoing SSE framing.
pub fn format_event(data: &str) -> String {
	format!("data: {data}\n\n")
}

pub const DONE_EVENT: &str = "data: [DONE]\n\n";

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_single_event() {
		let mut dec = SseDecoder::new();
		let events = dec.push(b"data: hello\n\n").unwrap();
		assert_eq!(events, vec![SseEvent { event: None, data: "hello".into() }]);
	}

	#[test]
	fn concatenates_multiline_data() {
		let mut dec = SseDecoder::new();
		let events = dec.push(b"data: line1\ndata: line2\n\n").unwrap();
		assert_eq!(events[0].data, "line1\nline2");
	}

	#[test]
	fn ignores_comments_and_ping() {
		let mut dec = SseDecoder::new();
		let events = dec.push(b": keep-alive\n\nevent: ping\ndata: {}\n\n").unwrap();
		assert!(events.is_empty());
	}

	#[test]
	fn buffers_partial_event_across_calls() {
		let mut dec = SseDecoder::new();
		let first = dec.push(b"data: hel").unwrap();
		assert!(first.is_empty());
		let second = dec.push(b"lo\n\n").unwrap();
		assert_eq!(second[0].data, "hello");
	}

	#[test]
	fn arbitrary_split_boundaries_yield_same_events() {
		let full = b"event: message\ndata: a\n\ndata: b\n\n".to_vec();
		let whole = {
			let mut dec = SseDecoder::new();
			dec.push(&full).unwrap()
		};
		for split_at in 0..full.len() {
			let mut dec = SseDecoder::new();
			let mut out = dec.push(&full[..split_at]).unwrap();
			out.extend(dec.push(&full[split_at..]).unwrap());
			assert_eq!(out, whole, "split at {split_at} diverged");
		}
	}
}
