//! Legacy `/v1/completions`: `prompt`-based, no message list. Only OpenAI-compatible
//! backends implement this API; Bedrock/Vertex/Anthropic have no legacy-completions
//! counterpart, so other schemas are unsupported here.

use bytes::Bytes;
use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{openai_azure::OpenAiToAzure, openai_openai::OpenAiToOpenAi, Translator};

const ENDPOINT_NAME: &str = "completions";

pub struct Completions;

impl EndpointHandler for Completions {
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
