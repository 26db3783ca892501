//! `/v1/embeddings`: non-streaming, `input`-based. Scoped here to OpenAI-compatible
//! backends; Bedrock/Vertex embeddings use entirely different wire shapes
//! (`InvokeModel`/Predict bodies unrelated to the chat-completions families this crate's
//! translators cover) and are intentionally not implemented — see DESIGN.md.

use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{openai_azure::OpenAiToAzure, openai_openai::OpenAiToOpenAi, Translator};

const ENDPOINT_NAME: &str = "embeddings";

pub struct Embeddings;

impl EndpointHandler for Embeddings {
	fn parse_body(&self, raw: &[u8]) -> Result<ParsedBody, ParseError> {
		let value: Value = serde_json::from_slice(raw)?;
		let model_name = value
			.get("model")
			.and_then(|m| m.as_str())
			.ok_or(ParseError::MissingField("model"))?
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
	fn extracts_model_and_is_never_streaming() {
		let handler = Embeddings;
		let parsed = handler.parse_body(br#"{"model":"text-embedding-3-small","input":"hi"}"#).unwrap();
		assert_eq!(parsed.model_name, "text-embedding-3-small");
		assert!(!parsed.is_streaming);
	}
}
