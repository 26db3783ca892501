//! `/v1/realtime/client_secrets`: issues ephemeral session credentials for the Realtime
//! (WebSocket) API. Model is read from `session.model`, falling back to a configured
//! default rather than failing the request — the only endpoint in this table with that
//! fallback, per its own entry. Never streaming; there is no body mutation, since the
//! session config is opaque to this gateway's translators.

use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{openai_azure::OpenAiToAzure, openai_openai::OpenAiToOpenAi, Translator};

const ENDPOINT_NAME: &str = "realtime client-secrets";
const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

pub struct RealtimeClientSecrets;

impl EndpointHandler for RealtimeClientSecrets {
	fn parse_body(&self, raw: &[u8]) -> Result<ParsedBody, ParseError> {
		let value: Value = serde_json::from_slice(raw)?;
		let model_name = value
			.get("session")
			.and_then(|s| s.get("model"))
			.and_then(|m| m.as_str())
			.unwrap_or(DEFAULT_MODEL)
			.to_string();
		Ok(ParsedBody {
			model_name,
			is_streaming: false,
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
	fn falls_back_to_default_model_when_absent() {
		let handler = RealtimeClientSecrets;
		let parsed = handler.parse_body(br#"{"session":{}}"#).unwrap();
		assert_eq!(parsed.model_name, DEFAULT_MODEL);
	}

	#[test]
	fn reads_model_from_session_config() {
		let handler = RealtimeClientSecrets;
		let parsed = handler
			.parse_body(br#"{"session":{"model":"gpt-4o-mini-realtime-preview"}}"#)
			.unwrap();
		assert_eq!(parsed.model_name, "gpt-4o-mini-realtime-preview");
	}
}
