//! GCP Vertex Gemini wire types (`generateContent`/`streamGenerateContent`). The rest of this
//! repo's `llm::gemini`/`llm::vertex` modules only cover the OpenAI-compatible Gemini
//! endpoint and the Vertex embeddings Predict API, so this module's shape is drawn from
//! the public Gemini API while keeping this crate's naming/flatten conventions
//! (camelCase wire fields, `#[serde(flatten)] rest` for passthrough).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GenerateContentRequest {
	pub contents: Vec<Content>,
	#[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
	pub system_instruction: Option<Content>,
	#[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
	pub generation_config: Option<GenerationConfig>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Content {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Part {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
	pub inline_data: Option<InlineData>,
	#[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
	pub function_call: Option<FunctionCall>,
	#[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
	pub function_response: Option<FunctionResponse>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InlineData {
	#[serde(rename = "mimeType")]
	pub mime_type: String,
	pub data: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCall {
	pub name: String,
	pub args: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionResponse {
	pub name: String,
	pub response: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GenerationConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u64>,
	#[serde(rename = "stopSequences", skip_serializing_if = "Vec::is_empty", default)]
	pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
	#[serde(rename = "functionDeclarations")]
	pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDeclaration {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerateContentResponse {
	pub candidates: Vec<Candidate>,
	#[serde(rename = "usageMetadata", skip_serializing_if = "Option::is_none")]
	pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Candidate {
	pub content: Content,
	#[serde(rename = "finishReason", skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
	#[serde(default)]
	pub index: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct UsageMetadata {
	#[serde(rename = "promptTokenCount", default)]
	pub prompt_token_count: u64,
	#[serde(rename = "candidatesTokenCount", default)]
	pub candidates_token_count: u64,
	#[serde(rename = "totalTokenCount", default)]
	pub total_token_count: u64,
}

/// Maps Gemini's `finishReason` vocabulary onto OpenAI's `finish_reason` strings.
pub fn finish_reason_to_openai(reason: &str) -> &'static str {
	match reason {
		"STOP" => "stop",
		"MAX_TOKENS" => "length",
		"SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => "content_filter",
		_ => "stop",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finish_reason_mapping_covers_safety_variants() {
		assert_eq!(finish_reason_to_openai("SAFETY"), "content_filter");
		assert_eq!(finish_reason_to_openai("STOP"), "stop");
		assert_eq!(finish_reason_to_openai("MAX_TOKENS"), "length");
	}
}
