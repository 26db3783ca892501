//! OpenAI-schema client talking to an OpenAI-schema (or any OpenAI-compatible) backend:
//! the identity translator. The only real work is the model-name override and passing
//! streaming bytes straight through; grounded in the `Provider` pattern where
//! same-schema backends skip the `llm::conversion` pipeline entirely.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use super::{TranslatedRequest, TranslatedResponseChunk, Translator};
use crate::error::TranslationError;
use crate::metrics::TokenUsage;
use crate::types::openai::{ChatCompletionChunk, ChatCompletionResponse};

#[derive(Default)]
pub struct OpenAiToOpenAi {
	// Streaming responses arrive as SSE chunks that may split JSON objects across
	// `BodyChunk`s; the processor itself decodes SSE framing, so this translator only
	// needs to track whether the stream has usage already reported to avoid
	// double-counting a final synthetic chunk some backends send.
	usage_seen: bool,
}

impl Translator for OpenAiToOpenAi {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let body = match model_override {
			None => Bytes::copy_from_slice(client_body),
			Some(model) => {
				let mut value: Value =
					serde_json::from_slice(client_body).map_err(TranslationError::Encode)?;
				if let Some(obj) = value.as_object_mut() {
					obj.insert("model".to_string(), Value::String(model.to_string()));
				}
				Bytes::from(serde_json::to_vec(&value).map_err(TranslationError::Encode)?)
			},
		};
		Ok(TranslatedRequest { body, headers: vec![] })
	}

	fn response_headers(&mut self, upstream_headers: &HeaderMap) -> Result<HeaderMap, TranslationError> {
		Ok(upstream_headers.clone())
	}

	fn response_body(
		&mut self,
		upstream_chunk: &[u8],
		_end_of_stream: bool,
	) -> Result<TranslatedResponseChunk, TranslationError> {
		// Best-effort usage extraction for metrics/cost; the bytes themselves pass
		// through untouched since client and backend schemas already match.
		let usage = extract_usage_from_sse(upstream_chunk, &mut self.usage_seen);
		Ok(TranslatedResponseChunk {
			body: Bytes::copy_from_slice(upstream_chunk),
			usage,
			response_model: None,
		})
	}

	fn response_error(&mut self, _status: u16, upstream_body: &[u8]) -> Result<Bytes, TranslationError> {
		Ok(Bytes::copy_from_slice(upstream_body))
	}
}

fn extract_usage_from_sse(chunk: &[u8], usage_seen: &mut bool) -> Option<TokenUsage> {
	let text = std::str::from_utf8(chunk).ok()?;
	let mut found_any_data_line = false;
	for line in text.lines() {
		let Some(data) = line.strip_prefix("data: ") else {
			continue;
		};
		found_any_data_line = true;
		if data == "[DONE]" {
			continue;
		}
		if let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(data)
			&& let Some(usage) = parsed.usage
		{
			*usage_seen = true;
			return Some(to_token_usage(usage));
		}
	}
	if found_any_data_line {
		return None;
	}
	// Not SSE-framed at all: a non-streaming response is the whole body as one JSON
	// object with a top-level `usage`, not a `chat.completion.chunk` event.
	let parsed: ChatCompletionResponse = serde_json::from_str(text).ok()?;
	let usage = parsed.usage?;
	*usage_seen = true;
	Some(to_token_usage(usage))
}

fn to_token_usage(usage: crate::types::openai::Usage) -> TokenUsage {
	TokenUsage {
		input: usage.prompt_tokens,
		output: usage.completion_tokens,
		total: usage.total_tokens,
		cached_input: usage.prompt_tokens_details.map(|d| d.cached_tokens),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn model_override_rewrites_model_field() {
		let mut t = OpenAiToOpenAi::default();
		let out = t
			.request_body(br#"{"model":"gpt-4o","messages":[]}"#, Some("gpt-4o-mini"))
			.unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(v["model"], "gpt-4o-mini");
	}

	#[test]
	fn no_override_passes_body_through_unchanged() {
		let mut t = OpenAiToOpenAi::default();
		let raw = br#"{"model":"gpt-4o","messages":[]}"#;
		let out = t.request_body(raw, None).unwrap();
		assert_eq!(&out.body[..], raw);
	}

	#[test]
	fn usage_extracted_from_sse_chunk() {
		let mut t = OpenAiToOpenAi::default();
		let chunk = b"data: {\"id\":\"1\",\"model\":\"m\",\"object\":\"chat.completion.chunk\",\"created\":1,\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":5,\"total_tokens\":8}}\n\n";
		let out = t.response_body(chunk, false).unwrap();
		assert_eq!(out.usage.unwrap().total, 8);
	}

	#[test]
	fn usage_extracted_from_non_streaming_json_body() {
		let mut t = OpenAiToOpenAi::default();
		let body = br#"{"id":"1","model":"m","object":"chat.completion","created":1,"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#;
		let out = t.response_body(body, true).unwrap();
		assert_eq!(out.usage.unwrap().total, 8);
		assert_eq!(&out.body[..], &body[..]);
	}
}
