//! OpenAI-schema client talking to an Azure OpenAI backend. The wire body is identical
//! to plain OpenAI; what differs is entirely in the URL (`/openai/deployments/{deployment}/...`
//! plus an `api-version` query parameter) and auth, both handled by the router/auth
//! layers rather than the translator. Delegates to [`super::openai_openai`] for the body.

use bytes::Bytes;
use http::HeaderMap;

use super::openai_openai::OpenAiToOpenAi;
use super::{TranslatedRequest, TranslatedResponseChunk, Translator};
use crate::error::TranslationError;

#[derive(Default)]
pub struct OpenAiToAzure {
	inner: OpenAiToOpenAi,
}

impl Translator for OpenAiToAzure {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		// Azure's deployment is named in the path, not the body; Azure still accepts (and
		// ignores) a `model` field, so forwarding the override keeps parity with the
		// plain-OpenAI translator rather than special-casing it away.
		self.inner.request_body(client_body, model_override)
	}

	fn response_headers(&mut self, upstream_headers: &HeaderMap) -> Result<HeaderMap, TranslationError> {
		self.inner.response_headers(upstream_headers)
	}

	fn response_body(
		&mut self,
		upstream_chunk: &[u8],
		end_of_stream: bool,
	) -> Result<TranslatedResponseChunk, TranslationError> {
		self.inner.response_body(upstream_chunk, end_of_stream)
	}

	fn response_error(&mut self, status: u16, upstream_body: &[u8]) -> Result<Bytes, TranslationError> {
		self.inner.response_error(status, upstream_body)
	}
}
