//! Per-request state owned by one client processing stream, plus the registry that lets
//! a later upstream-attempt stream find the state its router-leg counterpart built.
//!
//! The router filter and each upstream filter are separate `Process` RPC streams,
//! served from two listeners within this same process (the proxy's filter chain runs
//! one `ext_proc` filter scoped to the client-facing leg with the request body
//! forwarded, and another per upstream attempt with only headers forwarded — a request
//! body phase must never reach an upstream filter). Since they're logically one client
//! request, they need to share the raw body, the span, and
//! the running token-usage total. The router filter generates a request id, stamps it
//! on the `x-ai-eg-request-id` header it is expected to forward upstream (alongside
//! `x-ai-eg-model`/`x-ai-eg-original-path`), and publishes its state into a process-wide
//! registry keyed by that id; the upstream filter reads the id back out of the incoming
//! request's headers to find it.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::Span;

use crate::endpoints::EndpointHandler;
use crate::metrics::RequestMetrics;
use crate::translators::Translator;

pub const REQUEST_ID_HEADER: &str = "x-ai-eg-request-id";
pub const MODEL_HEADER: &str = "x-ai-eg-model";
pub const ORIGINAL_PATH_HEADER: &str = "x-ai-eg-original-path";

/// Shared across the router filter and every upstream-attempt filter for one client
/// request. Guarded by a mutex rather than `PerRequestState` being literally
/// single-owner, since the two sides run as independent stream tasks; in practice
/// contention is negligible (each side only touches it at phase boundaries, never holds
/// the lock across a suspension point).
pub struct SharedRequestState {
	/// Retained for retry; updated once if the endpoint handler forced a body mutation
	/// (e.g. `stream_options.include_usage`), after which it is immutable for the rest of
	/// the stream's life.
	pub raw_body: Bytes,
	pub model_name: String,
	pub is_streaming: bool,
	pub endpoint_handler: Arc<dyn EndpointHandler>,
	pub span: Span,
	pub metrics: RequestMetrics,
	/// Incremented each time an upstream filter attaches (i.e. processes a
	/// `RequestHeaders` phase); a count > 1 signals a retry.
	pub attempt_count: u32,
}

/// Per-attempt state, owned exclusively by one `UpstreamFilter` instance. Not shared —
/// the translator accumulates partial-frame state across `ResponseBody` calls and must
/// not survive past this attempt.
pub struct AttemptState {
	pub translator: Box<dyn Translator>,
	pub backend_name: String,
	pub model_name_override: Option<String>,
	/// `:status` observed on the response-headers phase; `None` until then.
	pub upstream_status: Option<u16>,
	pub on_retry: bool,
	/// `content-encoding` observed on the response-headers phase, if any. Gzip is the only
	/// encoding this filter decompresses itself; any other value is left for the translator
	/// (or the client) to deal with.
	pub content_encoding: Option<String>,
	/// Raw (still-compressed) bytes accumulated across `ResponseBody` calls when
	/// `content_encoding` is gzip — a gzip stream only decodes correctly once its footer has
	/// arrived, so chunks must be buffered whole rather than fed to the translator piecemeal.
	pub gzip_buffer: BytesMut,
}

#[derive(Default, Clone)]
pub struct RequestRegistry {
	inner: Arc<Mutex<HashMap<String, Arc<Mutex<SharedRequestState>>>>>,
}

impl RequestRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, request_id: String, state: SharedRequestState) {
		self.inner.lock().insert(request_id, Arc::new(Mutex::new(state)));
	}

	pub fn get(&self, request_id: &str) -> Option<Arc<Mutex<SharedRequestState>>> {
		self.inner.lock().get(request_id).cloned()
	}

	/// Called once the response stream reaches end-of-stream (or the stream is
	/// cancelled), so the registry doesn't grow unboundedly across the life of the
	/// process.
	pub fn remove(&self, request_id: &str) {
		self.inner.lock().remove(request_id);
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.inner.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::endpoints::chat_completions::ChatCompletions;

	fn sample_state() -> SharedRequestState {
		SharedRequestState {
			raw_body: Bytes::from_static(b"{}"),
			model_name: "gpt-4o-mini".to_string(),
			is_streaming: false,
			endpoint_handler: Arc::new(ChatCompletions),
			span: Span::none(),
			metrics: RequestMetrics::default(),
			attempt_count: 0,
		}
	}

	#[test]
	fn insert_then_get_round_trips() {
		let registry = RequestRegistry::new();
		registry.insert("req-1".to_string(), sample_state());
		let found = registry.get("req-1").expect("present");
		assert_eq!(found.lock().model_name, "gpt-4o-mini");
	}

	#[test]
	fn remove_drops_the_entry() {
		let registry = RequestRegistry::new();
		registry.insert("req-1".to_string(), sample_state());
		registry.remove("req-1");
		assert!(registry.get("req-1").is_none());
		assert_eq!(registry.len(), 0);
	}
}
