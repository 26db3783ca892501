//! Anthropic Messages API wire types, grounded in the
//! `llm::types::messages::typed` module. Used both as the client-facing `/v1/messages`
//! schema and, unmodified apart from host/path, as the body shape GCP Vertex's Anthropic
//! publisher model endpoint expects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesRequest {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub messages: Vec<RequestMessage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<SystemPrompt>,
	pub max_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_sequences: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Value>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<Value>,
	#[serde(rename = "anthropic_version", skip_serializing_if = "Option::is_none")]
	pub anthropic_version: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
	Text(String),
	Blocks(Vec<SystemContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemContentBlock {
	#[serde(rename = "type")]
	pub kind: String,
	pub text: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestMessage {
	pub role: Role,
	pub content: MessageContent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text {
		text: String,
	},
	Image {
		source: Value,
	},
	ToolUse {
		id: String,
		name: String,
		input: Value,
	},
	ToolResult {
		tool_use_id: String,
		content: ToolResultContent,
		#[serde(skip_serializing_if = "Option::is_none")]
		is_error: Option<bool>,
	},
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesResponse {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub role: Role,
	pub model: String,
	pub content: Vec<ContentBlock>,
	pub stop_reason: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_sequence: Option<String>,
	pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct Usage {
	pub input_tokens: u64,
	pub output_tokens: u64,
}

/// One SSE event body from a streaming Messages response. Anthropic names its own event
/// types (`message_start`, `content_block_delta`, ...) in the SSE `event:` field, with
/// the JSON payload in `data:` carrying a matching `type` tag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
	MessageStart { message: MessagesResponse },
	ContentBlockStart { index: u32, content_block: ContentBlock },
	ContentBlockDelta { index: u32, delta: Delta },
	ContentBlockStop { index: u32 },
	MessageDelta { delta: MessageDeltaFields, usage: Usage },
	MessageStop,
	Ping,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
	TextDelta { text: String },
	InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageDeltaFields {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
	#[serde(rename = "type")]
	pub kind: String,
	pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
	#[serde(rename = "type")]
	pub kind: String,
	pub message: String,
}
