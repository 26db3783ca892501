//! Anthropic-native `/v1/messages`. `model` is a required top-level field (unlike
//! `realtime_client_secrets`, there is no fallback default here). Routable only to
//! genuinely Anthropic-shaped backends — a direct Anthropic backend (pass-through) or
//! GCP's Anthropic publisher endpoint.

use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{anthropic_anthropic::AnthropicToAnthropic, gcp_anthropic::AnthropicToGcpAnthropic, Translator};

const ENDPOINT_NAME: &str = "messages";

pub struct Messages;

impl EndpointHandler for Messages {
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
			schema::ANTHROPIC => Ok(Box::<AnthropicToAnthropic>::default()),
			schema::GCP_ANTHROPIC => Ok(Box::<AnthropicToGcpAnthropic>::default()),
			_ => Err(unsupported(ENDPOINT_NAME, backend_schema)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_model_is_a_parse_error() {
		let handler = Messages;
		assert!(matches!(
			handler.parse_body(br#"{"messages":[]}"#),
			Err(ParseError::MissingField("model"))
		));
	}

	#[test]
	fn bedrock_converse_is_unsupported_for_native_messages() {
		let handler = Messages;
		assert!(matches!(
			handler.translator(schema::BEDROCK_CONVERSE, None),
			Err(TranslationError::UnsupportedSchema { .. })
		));
	}
}
