//! `/v1/responses`: `model` is required (no fallback), `input` carries either a string
//! prompt or a message-like array. Scoped to OpenAI-compatible backends only — it is
//! passed through rather than folded into the chat/completions translators.

use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{openai_azure::OpenAiToAzure, openai_openai::OpenAiToOpenAi, Translator};

const ENDPOINT_NAME: &str = "responses";

pub struct Responses;

impl EndpointHandler for Responses {
	fn parse_body(&self, raw: &[u8]) -> Result<ParsedBody, ParseError> {
		let value: Value = serde_json::from_slice(raw)?;
		let model_name = value
			.get("model")
			.and_then(|m| m.as_str())
			.ok_or(ParseError::MissingField("model"))?
			.to_string();
		let is_streaming = value.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);
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
	fn missing_model_is_a_parse_error() {
		let handler = Responses;
		assert!(matches!(
			handler.parse_body(br#"{"input":"hi"}"#),
			Err(ParseError::MissingField("model"))
		));
	}
}
