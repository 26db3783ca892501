//! Streaming wire framings a translator may need to decode/encode: text SSE, AWS's
//! binary event-stream, and gzip-on-arrival decompression.

pub mod aws_event_stream;
pub mod gzip;
pub mod sse;

pub use aws_event_stream::AwsEventStreamDecoder;
pub use sse::{SseDecoder, SseEvent};
