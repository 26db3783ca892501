//! OpenAI-schema chat/completions wire types (the client-facing schema, and also a
//! backend schema for OpenAI-compatible and Azure OpenAI backends). Grounded in the
//! `llm::conversion::completions` usage of `completions::Request`/
//! `RequestMessage`/`RequestToolMessage` and the flatten-the-rest idiom from
//! `llm::types::messages`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
	pub model: String,
	pub messages: Vec<RequestMessage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop: Option<StopSequences>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<Value>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub include_usage: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StopSequences {
	One(String),
	Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
	#[serde(rename = "type")]
	pub kind: String,
	pub function: ToolFunction,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolFunction {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RequestMessage {
	System {
		content: MessageContent,
		#[serde(flatten, default)]
		rest: Value,
	},
	User {
		content: MessageContent,
		#[serde(flatten, default)]
		rest: Value,
	},
	Assistant {
		#[serde(skip_serializing_if = "Option::is_none")]
		content: Option<MessageContent>,
		#[serde(skip_serializing_if = "Option::is_none")]
		tool_calls: Option<Vec<ToolCall>>,
		#[serde(flatten, default)]
		rest: Value,
	},
	Tool {
		content: MessageContent,
		tool_call_id: String,
		#[serde(flatten, default)]
		rest: Value,
	},
}

impl RequestMessage {
	pub fn role(&self) -> &'static str {
		match self {
			RequestMessage::System { .. } => "system",
			RequestMessage::User { .. } => "user",
			RequestMessage::Assistant { .. } => "assistant",
			RequestMessage::Tool { .. } => "tool",
		}
	}

	pub fn text(&self) -> Option<String> {
		let content = match self {
			RequestMessage::System { content, .. }
			| RequestMessage::User { content, .. }
			| RequestMessage::Tool { content, .. } => Some(content),
			RequestMessage::Assistant { content, .. } => content.as_ref(),
		}?;
		Some(content.as_text())
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Parts(Vec<ContentPart>),
}

impl MessageContent {
	pub fn as_text(&self) -> String {
		match self {
			MessageContent::Text(t) => t.clone(),
			MessageContent::Parts(parts) => parts
				.iter()
				.filter_map(|p| p.text.as_deref())
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentPart {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(rename = "image_url", skip_serializing_if = "Option::is_none")]
	pub image_url: Option<ImageUrl>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageUrl {
	pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCallFunction {
	pub name: String,
	pub arguments: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
	pub id: String,
	pub model: String,
	pub object: String,
	pub created: u64,
	pub choices: Vec<Choice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
	pub index: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<ResponseMessage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub delta: Option<ResponseMessage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseMessage {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Usage {
	pub prompt_tokens: u64,
	pub completion_tokens: u64,
	pub total_tokens: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PromptTokensDetails {
	#[serde(default)]
	pub cached_tokens: u64,
}

/// One `chat.completion.chunk` SSE event body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
	pub id: String,
	pub model: String,
	pub object: String,
	pub created: u64,
	pub choices: Vec<Choice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_request_fields_round_trip_via_rest() {
		let raw = serde_json::json!({
			"model": "gpt-4o-mini",
			"messages": [{"role": "user", "content": "hi"}],
			"logit_bias": {"50256": -100},
		});
		let req: ChatCompletionRequest = serde_json::from_value(raw.clone()).unwrap();
		let out = serde_json::to_value(&req).unwrap();
		assert_eq!(out["logit_bias"], raw["logit_bias"]);
	}

	#[test]
	fn message_content_array_joins_text_parts() {
		let content = MessageContent::Parts(vec![
			ContentPart {
				kind: "text".into(),
				text: Some("a".into()),
				image_url: None,
				rest: Value::Null,
			},
			ContentPart {
				kind: "text".into(),
				text: Some("b".into()),
				image_url: None,
				rest: Value::Null,
			},
		]);
		assert_eq!(content.as_text(), "a\nb");
	}
}
