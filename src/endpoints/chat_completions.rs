//! `/v1/chat/completions`: the widest-reach endpoint, routable to every backend schema
//! this gateway supports, including the `stream_options.include_usage` forcing behavior
//! needed for this gateway's own token-usage accounting on streaming responses.

use bytes::Bytes;
use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{
	gcp_anthropic::OpenAiToGcpAnthropic, openai_azure::OpenAiToAzure, openai_bedrock_converse::OpenAiToBedrockConverse,
	openai_bedrock_invoke::OpenAiToBedrockInvoke, openai_openai::OpenAiToOpenAi, openai_vertex_gemini::OpenAiToVertexGemini,
	Translator,
};

const ENDPOINT_NAME: &str = "chat/completions";

pub struct ChatCompletions;

impl EndpointHandler for ChatCompletions {
	fn parse_body(&self, raw: &[u8]) -> Result<ParsedBody, ParseError> {
		let mut value: Value = serde_json::from_slice(raw)?;
		let obj = value.as_object_mut().ok_or(ParseError::MissingField("model"))?;
		let model_name = obj
			.get("model")
			.and_then(|m| m.as_str())
			.ok_or(ParseError::MissingField("model"))?
			.to_string();
		let is_streaming = obj.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);

		// Token usage cannot otherwise be observed on a streaming response; force the flag
		// so the gateway's own accounting always has something to read, mutating the raw
		// body so the same flag survives a retry's re-translation.
		let mut mutated = false;
		if is_streaming {
			let needs_usage_flag = match obj.get("stream_options") {
				None => true,
				Some(Value::Object(so)) => !so.get("include_usage").and_then(|v| v.as_bool()).unwrap_or(false),
				Some(_) => true,
			};
			if needs_usage_flag {
				obj.insert(
					"stream_options".to_string(),
					serde_json::json!({ "include_usage": true }),
				);
				mutated = true;
			}
		}

		Ok(ParsedBody {
			model_name,
			is_streaming,
			mutated_body: if mutated {
				Some(Bytes::from(serde_json::to_vec(&value).map_err(ParseError::Malformed)?))
			} else {
				None
			},
		})
	}

	fn translator(&self, backend_schema: &str, _model_name_override: Option<&str>) -> Result<Box<dyn Translator>, TranslationError> {
		match backend_schema {
			schema::OPENAI => Ok(Box::<OpenAiToOpenAi>::default()),
			schema::AZURE_OPENAI => Ok(Box::<OpenAiToAzure>::default()),
			schema::BEDROCK_CONVERSE => Ok(Box::<OpenAiToBedrockConverse>::default()),
			schema::BEDROCK_INVOKE => Ok(Box::<OpenAiToBedrockInvoke>::default()),
			schema::VERTEX_GEMINI => Ok(Box::<OpenAiToVertexGemini>::default()),
			schema::GCP_ANTHROPIC => Ok(Box::<OpenAiToGcpAnthropic>::default()),
			// A direct (not GCP-fronted) Anthropic backend and Cohere Rerank have no
			// chat/completions counterpart; Anthropic-native clients use the `messages`
			// endpoint and rerank clients use `rerank`.
			_ => Err(unsupported(ENDPOINT_NAME, backend_schema)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_model_and_streaming_flag() {
		let handler = ChatCompletions;
		let parsed = handler
			.parse_body(br#"{"model":"gpt-4o-mini","messages":[],"stream":true}"#)
			.unwrap();
		assert_eq!(parsed.model_name, "gpt-4o-mini");
		assert!(parsed.is_streaming);
	}

	#[test]
	fn forces_include_usage_on_streaming_request_without_it() {
		let handler = ChatCompletions;
		let parsed = handler
			.parse_body(br#"{"model":"gpt-4o-mini","messages":[],"stream":true}"#)
			.unwrap();
		let mutated = parsed.mutated_body.expect("body should have been mutated");
		let v: Value = serde_json::from_slice(&mutated).unwrap();
		assert_eq!(v["stream_options"]["include_usage"], true);
	}

	#[test]
	fn leaves_non_streaming_request_unmutated() {
		let handler = ChatCompletions;
		let parsed = handler.parse_body(br#"{"model":"gpt-4o-mini","messages":[]}"#).unwrap();
		assert!(parsed.mutated_body.is_none());
	}

	#[test]
	fn respects_already_set_include_usage() {
		let handler = ChatCompletions;
		let raw = br#"{"model":"m","messages":[],"stream":true,"stream_options":{"include_usage":true}}"#;
		let parsed = handler.parse_body(raw).unwrap();
		assert!(parsed.mutated_body.is_none());
	}

	#[test]
	fn unknown_backend_schema_is_an_error() {
		let handler = ChatCompletions;
		assert!(matches!(
			handler.translator("made-up-schema", None),
			Err(TranslationError::UnsupportedSchema { .. })
		));
	}
}
