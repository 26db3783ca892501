//! Cohere Rerank client talking to the Cohere Rerank backend: same schema both sides, so
//! the only real work is an optional `model` override. Non-streaming only — Cohere's
//! Rerank API has no streaming form, so there is no event-stream/SSE framing to decode.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use super::{TranslatedRequest, TranslatedResponseChunk, Translator};
use crate::error::TranslationError;

#[derive(Default)]
pub struct CohereRerank;

impl Translator for CohereRerank {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let body = match model_override {
			None => Bytes::copy_from_slice(client_body),
			Some(model) => {
				let mut value: Value =
					serde_json::from_slice(client_body).map_err(|e| TranslationError::Decode(e.to_string()))?;
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
		Ok(TranslatedResponseChunk {
			body: Bytes::copy_from_slice(upstream_chunk),
			usage: None,
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
	fn model_override_rewrites_model_field() {
		let mut t = CohereRerank;
		let out = t
			.request_body(br#"{"model":"rerank-english-v3.0","query":"q","documents":["a","b"]}"#, Some("rerank-v4"))
			.unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(v["model"], "rerank-v4");
	}

	#[test]
	fn no_override_passes_body_through_unchanged() {
		let mut t = CohereRerank;
		let raw = br#"{"model":"rerank-english-v3.0","query":"q","documents":["a"]}"#;
		let out = t.request_body(raw, None).unwrap();
		assert_eq!(&out.body[..], raw);
	}
}
