//! The `Translator` contract: one implementation per (client-endpoint schema, backend
//! schema) pair. Grounded in the `llm::conversion::*` translate/translate_response
//! function-pair idiom, lifted into a trait object so the processor can select one at
//! request time without a giant match in the hot path.

pub mod anthropic_anthropic;
pub mod cohere_rerank;
pub mod gcp_anthropic;
pub mod openai_azure;
pub mod openai_bedrock_converse;
pub mod openai_bedrock_invoke;
pub mod openai_openai;
pub mod openai_vertex_gemini;

use bytes::Bytes;
use http::HeaderMap;

use crate::error::TranslationError;
use crate::metrics::TokenUsage;

/// Output of translating a client request body into the backend's wire format.
pub struct TranslatedRequest {
	pub body: Bytes,
	/// Extra headers the translator wants set on the outbound request (e.g. Anthropic's
	/// `anthropic-version`), beyond whatever header mutations the backend config adds.
	pub headers: Vec<(http::HeaderName, http::HeaderValue)>,
}

/// Output of translating one chunk of an upstream response back into the client's
/// schema. A translator may buffer partial frames internally and emit zero events for a
/// chunk that completed no logical frame yet.
#[derive(Default)]
pub struct TranslatedResponseChunk {
	/// Client-framed bytes ready to forward (already SSE-formatted for streaming
	/// endpoints).
	pub body: Bytes,
	/// Token usage observed in this chunk, if any — merged into the running total by the
	/// caller via [`TokenUsage::merge`].
	pub usage: Option<TokenUsage>,
	pub response_model: Option<String>,
}

/// Per-stream translator state. A fresh instance is created per upstream attempt (i.e.
/// per `UpstreamFilter`), since streaming translators accumulate partial-frame state
/// across `ResponseBody` calls and that state must not survive a retry onto a different
/// attempt.
pub trait Translator: Send {
	/// Translate the client's already-fully-buffered request body into the backend's
	/// wire format. Called once, from `RequestBody`, with end-of-stream buffering
	/// already done by the processor.
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError>;

	/// Inspect (and optionally rewrite) the upstream response headers before any body
	/// arrives — e.g. translating `content-type` from the backend's shape to the
	/// client's, or stripping `content-encoding` once the translator commits to
	/// decompressing the body itself.
	fn response_headers(&mut self, upstream_headers: &HeaderMap) -> Result<HeaderMap, TranslationError>;

	/// Translate one chunk of upstream response body. For non-streaming backends this is
	/// called once with the full buffered body; for streaming backends it's called per
	/// arriving chunk and the translator is responsible for any internal framing state.
	fn response_body(
		&mut self,
		upstream_chunk: &[u8],
		end_of_stream: bool,
	) -> Result<TranslatedResponseChunk, TranslationError>;

	/// Translate a non-2xx upstream response body into the client schema's error
	/// envelope. Called instead of `response_body` once the status line is known to be
	/// an error; still receives the (non-streaming) error body bytes.
	fn response_error(&mut self, status: u16, upstream_body: &[u8]) -> Result<Bytes, TranslationError>;
}
