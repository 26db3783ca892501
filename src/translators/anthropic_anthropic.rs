//! Anthropic-native `/v1/messages` client talking directly to Anthropic's own API: the
//! identity translator for this schema pair, mirroring [`super::openai_openai`]'s
//! path-rewrite-only behavior for the OpenAI/OpenAI pair. Usage extraction mirrors
//! [`super::gcp_anthropic::AnthropicToGcpAnthropic`]'s same-schema peek, since both ends
//! of this pair carry the identical Messages wire format.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use super::{TranslatedRequest, TranslatedResponseChunk, Translator};
use crate::error::TranslationError;
use crate::framing::sse::SseDecoder;
use crate::metrics::TokenUsage;
use crate::types::anthropic as at;

#[derive(Default)]
pub struct AnthropicToAnthropic {
	decoder: SseDecoder,
	is_streaming: bool,
}

impl Translator for AnthropicToAnthropic {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let mut value: Value =
			serde_json::from_slice(client_body).map_err(|e| TranslationError::Decode(e.to_string()))?;
		self.is_streaming = value.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);
		if let Some(model) = model_override
			&& let Some(obj) = value.as_object_mut()
		{
			obj.insert("model".to_string(), Value::String(model.to_string()));
		}
		Ok(TranslatedRequest {
			body: Bytes::from(serde_json::to_vec(&value).map_err(TranslationError::Encode)?),
			headers: vec![],
		})
	}

	fn response_headers(&mut self, upstream_headers: &HeaderMap) -> Result<HeaderMap, TranslationError> {
		Ok(upstream_headers.clone())
	}

	fn response_body(
		&mut self,
		upstream_chunk: &[u8],
		end_of_stream: bool,
	) -> Result<TranslatedResponseChunk, TranslationError> {
		let usage = if self.is_streaming {
			let events = self.decoder.push(upstream_chunk)?;
			events.iter().find_map(|event| match serde_json::from_str(&event.data) {
				Ok(at::StreamEvent::MessageDelta { usage: u, .. }) => Some(TokenUsage {
					input: u.input_tokens,
					output: u.output_tokens,
					total: u.input_tokens + u.output_tokens,
					cached_input: None,
				}),
				_ => None,
			})
		} else if end_of_stream {
			serde_json::from_slice::<at::MessagesResponse>(upstream_chunk)
				.ok()
				.map(|resp| TokenUsage {
					input: resp.usage.input_tokens,
					output: resp.usage.output_tokens,
					total: resp.usage.input_tokens + resp.usage.output_tokens,
					cached_input: None,
				})
		} else {
			None
		};
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

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_override_passes_body_through_unchanged() {
		let mut t = AnthropicToAnthropic::default();
		let raw = br#"{"model":"claude-3-sonnet-20240229","messages":[]}"#;
		let out = t.request_body(raw, None).unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(v["model"], "claude-3-sonnet-20240229");
	}

	#[test]
	fn model_override_rewrites_model_field() {
		let mut t = AnthropicToAnthropic::default();
		let out = t
			.request_body(br#"{"model":"claude-3-haiku","messages":[]}"#, Some("claude-3-opus"))
			.unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(v["model"], "claude-3-opus");
	}

	#[test]
	fn non_streaming_response_extracts_usage_without_touching_body() {
		let mut t = AnthropicToAnthropic::default();
		t.request_body(br#"{"messages":[{"role":"user","content":"hi"}],"max_tokens":256,"stream":false}"#, None)
			.unwrap();
		let resp = at::MessagesResponse {
			id: "msg_1".to_string(),
			kind: "message".to_string(),
			role: at::Role::Assistant,
			model: "claude-3-sonnet-20240229".to_string(),
			content: vec![at::ContentBlock::Text {
				text: "hello there".to_string(),
			}],
			stop_reason: Some("end_turn".to_string()),
			stop_sequence: None,
			usage: at::Usage {
				input_tokens: 4,
				output_tokens: 6,
			},
		};
		let raw = serde_json::to_vec(&resp).unwrap();
		let out = t.response_body(&raw, true).unwrap();
		assert_eq!(out.usage.unwrap().total, 10);
		assert_eq!(&out.body[..], &raw[..]);
	}
}
