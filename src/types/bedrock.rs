//! AWS Bedrock wire types: the Converse API (used to translate OpenAI chat/completions
//! and Anthropic messages onto most Bedrock-hosted models) plus the minimal InvokeModel
//! envelope used for Anthropic-on-Bedrock. Grounded field-for-field in
//! `llm::types::bedrock`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Copy, Clone, Deserialize, Serialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
	#[default]
	User,
	Assistant,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
	Text(String),
	Image(ImageBlock),
	ToolResult(ToolResultBlock),
	ToolUse(ToolUseBlock),
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlock {
	pub format: String,
	pub source: ImageSource,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
	pub bytes: String,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultBlock {
	pub tool_use_id: String,
	pub content: Vec<ToolResultContentBlock>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<ToolResultStatus>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultStatus {
	Error,
	Success,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultContentBlock {
	Text(String),
	Json(Value),
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlock {
	pub tool_use_id: String,
	pub name: String,
	pub input: Value,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(untagged)]
pub enum SystemContentBlock {
	Text { text: String },
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Message {
	pub role: Role,
	pub content: Vec<ContentBlock>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct InferenceConfiguration {
	#[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(rename = "stopSequences", skip_serializing_if = "Vec::is_empty", default)]
	pub stop_sequences: Vec<String>,
}

#[derive(Clone, Serialize, Debug)]
pub struct ConverseRequest {
	#[serde(rename = "modelId")]
	pub model_id: String,
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<Vec<SystemContentBlock>>,
	#[serde(rename = "inferenceConfig", skip_serializing_if = "Option::is_none")]
	pub inference_config: Option<InferenceConfiguration>,
	#[serde(rename = "toolConfig", skip_serializing_if = "Option::is_none")]
	pub tool_config: Option<ToolConfiguration>,
	#[serde(
		rename = "additionalModelRequestFields",
		skip_serializing_if = "Option::is_none"
	)]
	pub additional_model_request_fields: Option<Value>,
}

#[derive(Clone, Serialize, Debug)]
pub struct ToolConfiguration {
	pub tools: Vec<Tool>,
	#[serde(rename = "toolChoice", skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
}

#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
	ToolSpec(ToolSpecification),
}

#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecification {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
	pub input_schema: Option<ToolInputSchema>,
}

#[derive(Clone, Serialize, Debug)]
pub struct ToolInputSchema {
	pub json: Value,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolChoice {
	Any,
	Auto,
	Tool { name: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConverseResponse {
	pub output: Option<ConverseOutput>,
	#[serde(rename = "stopReason")]
	pub stop_reason: StopReason,
	pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConverseErrorResponse {
	#[serde(alias = "Message")]
	pub message: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ConverseOutput {
	Message(Message),
	#[serde(other)]
	Unknown,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
	#[serde(rename = "inputTokens")]
	pub input_tokens: u64,
	#[serde(rename = "outputTokens")]
	pub output_tokens: u64,
	#[serde(rename = "totalTokens")]
	pub total_tokens: u64,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
	ContentFiltered,
	EndTurn,
	GuardrailIntervened,
	MaxTokens,
	StopSequence,
	ToolUse,
	#[serde(other)]
	Unknown,
}

impl StopReason {
	/// Maps Bedrock's stop reason vocabulary onto OpenAI's `finish_reason` strings.
	pub fn to_openai_finish_reason(self) -> &'static str {
		match self {
			StopReason::EndTurn => "stop",
			StopReason::MaxTokens => "length",
			StopReason::StopSequence => "stop",
			StopReason::ToolUse => "tool_calls",
			StopReason::ContentFiltered | StopReason::GuardrailIntervened => "content_filter",
			StopReason::Unknown => "stop",
		}
	}
}

/// One event from the Converse streaming response, carried inside an AWS
/// event-stream frame's `:event-type` header.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum ConverseStreamEvent {
	MessageStart { role: Role },
	ContentBlockDelta { delta: ContentBlockDelta, #[serde(rename = "contentBlockIndex")] content_block_index: u32 },
	MessageStop { #[serde(rename = "stopReason")] stop_reason: StopReason },
	Metadata { usage: Option<TokenUsage> },
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentBlockDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
}

/// Minimal InvokeModel envelope, used for Anthropic-on-Bedrock where the request body is
/// the Anthropic Messages JSON and `accept`/`content-type` select the response shape.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct InvokeModelBody {
	pub body: Vec<u8>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stop_reason_maps_to_openai_finish_reason() {
		assert_eq!(StopReason::MaxTokens.to_openai_finish_reason(), "length");
		assert_eq!(StopReason::ToolUse.to_openai_finish_reason(), "tool_calls");
		assert_eq!(StopReason::EndTurn.to_openai_finish_reason(), "stop");
	}

	#[test]
	fn converse_request_omits_absent_optionals() {
		let req = ConverseRequest {
			model_id: "anthropic.claude-3-sonnet".into(),
			messages: vec![],
			system: None,
			inference_config: None,
			tool_config: None,
			additional_model_request_fields: None,
		};
		let v = serde_json::to_value(&req).unwrap();
		assert!(v.get("system").is_none());
		assert!(v.get("inferenceConfig").is_none());
	}
}
