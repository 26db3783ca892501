//! `/v1/images/generations`: `prompt`/`size`/`n`, optionally streaming (only
//! `gpt-image-1` supports partial-image streaming). Scoped to OpenAI-compatible
//! backends, same as embeddings — image generation has no Bedrock/Vertex/Anthropic
//! counterpart this gateway translates to.

use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{openai_azure::OpenAiToAzure, openai_openai::OpenAiToOpenAi, Translator};

const ENDPOINT_NAME: &str = "image generation";

pub struct ImageGeneration;

impl EndpointHandler for ImageGeneration {
	fn parse_body(&self, raw: &[u8]) -> Result<ParsedBody, ParseError> {
		let value: Value = serde_json::from_slice(raw)?;
		let model_name = value
			.get("model")
			.and_then(|m| m.as_str())
			.ok_or(ParseError::MissingField("model"))?
			.to_string();
		// Streaming partial images are only defined for gpt-image-1; any other model
		// requesting `stream: true` is treated as non-streaming rather than rejected here
		// — the backend itself will reject an unsupported combination.
		let is_streaming = model_name == "gpt-image-1" && value.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);
		Ok(ParsedBody {
			model_name,
			is_streaming,
			mutated_body: None,
		})
	}

	fn translator(&self, backend_schema: &str, _model_name_override: Option<&str>) -> Result<Box<dyn Translator>, TranslationError> {
		match backend_schema {
			schema::OPENAI => Ok(Box::<OpenAiToOpenAi>::default()),
			schema::AZURE_OPENAI => Ok(Box::<OpenAiToAzure>::default()),
			_ => Err(unsupported(ENDPOINT_NAME, backend_schema)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_gpt_image_1_honors_the_stream_flag() {
		let handler = ImageGeneration;
		let dalle = handler.parse_body(br#"{"model":"dall-e-3","prompt":"a cat","stream":true}"#).unwrap();
		assert!(!dalle.is_streaming);
		let gpt_image = handler.parse_body(br#"{"model":"gpt-image-1","prompt":"a cat","stream":true}"#).unwrap();
		assert!(gpt_image.is_streaming);
	}
}
