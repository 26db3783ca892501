//! `/v1/rerank`: Cohere's own schema, `query`/`documents`, non-streaming. The only
//! backend schema this endpoint knows how to reach is Cohere itself.

use serde_json::Value;

use super::{schema, unsupported, EndpointHandler, ParsedBody};
use crate::error::{ParseError, TranslationError};
use crate::translators::{cohere_rerank::CohereRerank, Translator};

const ENDPOINT_NAME: &str = "rerank";

pub struct Rerank;

impl EndpointHandler for Rerank {
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
			schema::COHERE => Ok(Box::<CohereRerank>::default()),
			_ => Err(unsupported(ENDPOINT_NAME, backend_schema)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_model_and_is_never_streaming() {
		let handler = Rerank;
		let parsed = handler
			.parse_body(br#"{"model":"rerank-english-v3.0","query":"q","documents":["a"]}"#)
			.unwrap();
		assert_eq!(parsed.model_name, "rerank-english-v3.0");
		assert!(!parsed.is_streaming);
	}
}
