//! AWS binary event-stream decoder (used by Bedrock's streaming Converse/InvokeModel
//! APIs), grounded in `parse::aws_sse::EventStreamCodec`. Frames are
//! length-prefixed and CRC-validated by `aws-smithy-eventstream`; the decoder must not
//! advance past a partial frame, and skips frames whose payload does not parse as JSON.

use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use bytes::BytesMut;
use serde_json::Value;

#[derive(Default)]
pub struct AwsEventStreamDecoder {
	inner: MessageFrameDecoder,
	buf: BytesMut,
}

/// One decoded frame: the `:event-type`/`:message-type` header values (if present) plus
/// its JSON payload, already parsed. Frames with an unparseable payload are dropped
/// rather than surfaced.
pub struct DecodedEvent {
	pub event_type: Option<String>,
	pub payload: Value,
}

impl AwsEventStreamDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
		self.buf.extend_from_slice(chunk);
		let mut out = Vec::new();
		loop {
			match self.inner.decode_frame(&mut self.buf) {
				Ok(DecodedFrame::Complete(message)) => {
					if let Some(event) = to_decoded_event(&message) {
						out.push(event);
					}
				},
				Ok(DecodedFrame::Incomplete) => break,
				Err(_) => {
					// Malformed/CRC-invalid frame: drop what's been buffered for this
					// message and keep reading, rather than wedging the stream.
					self.buf.clear();
					break;
				},
			}
		}
		out
	}
}

fn to_decoded_event(message: &aws_smithy_types::event_stream::Message) -> Option<DecodedEvent> {
	let event_type = message
		.headers()
		.iter()
		.find(|h| h.name().as_str() == ":event-type")
		.and_then(|h| h.value().as_string().ok())
		.map(|s| s.as_str().to_string());
	let payload: Value = serde_json::from_slice(message.payload()).ok()?;
	Some(DecodedEvent { event_type, payload })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn incomplete_frame_is_buffered_not_dropped() {
		let mut dec = AwsEventStreamDecoder::new();
		// Feed a truncated length prefix; decoder must return no events and not panic.
		let events = dec.push(&[0u8, 0, 0]);
		assert!(events.is_empty());
	}
}
