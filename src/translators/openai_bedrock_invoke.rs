//! OpenAI-schema client talking to an Anthropic model hosted on Bedrock via
//! `InvokeModel`/`InvokeModelWithResponseStream` rather than Converse. The request/
//! response body *is* the Anthropic Messages JSON (with `anthropic_version` injected and
//! `model`/`stream` stripped, since those travel in the URL and API choice respectively),
//! wrapped only by the AWS event-stream framing on the way back when streaming.
//! Grounded in the InvokeModel envelope in `llm::types::bedrock`.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use super::{TranslatedRequest, TranslatedResponseChunk, Translator};
use crate::error::TranslationError;
use crate::framing::aws_event_stream::AwsEventStreamDecoder;
use crate::framing::sse;
use crate::metrics::TokenUsage;
use crate::types::anthropic as at;
use crate::types::openai as ot;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[derive(Default)]
pub struct OpenAiToBedrockInvoke {
	decoder: AwsEventStreamDecoder,
	response_model: Option<String>,
	is_streaming: bool,
	non_streaming_buffer: bytes::BytesMut,
}

impl Translator for OpenAiToBedrockInvoke {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let req: ot::ChatCompletionRequest =
			serde_json::from_slice(client_body).map_err(|e| TranslationError::Decode(e.to_string()))?;

		let mut system_text = String::new();
		let mut messages = Vec::new();
		for m in req.messages {
			let text = m.text().unwrap_or_default();
			if m.role() == "system" {
				if !system_text.is_empty() {
					system_text.push('\n');
				}
				system_text.push_str(&text);
				continue;
			}
			messages.push(at::RequestMessage {
				role: if m.role() == "assistant" {
					at::Role::Assistant
				} else {
					at::Role::User
				},
				content: at::MessageContent::Text(text),
			});
		}

		self.is_streaming = req.stream.unwrap_or(false);
		let model = model_override.map(str::to_string).unwrap_or(req.model.clone());
		self.response_model = Some(model);

		let body = at::MessagesRequest {
			model: None, // travels in the InvokeModel URL, not the body
			messages,
			system: if system_text.is_empty() {
				None
			} else {
				Some(at::SystemPrompt::Text(system_text))
			},
			max_tokens: req.max_tokens.or(req.max_completion_tokens).unwrap_or(4096),
			temperature: req.temperature,
			top_p: req.top_p,
			top_k: None,
			stop_sequences: match req.stop {
				Some(ot::StopSequences::One(s)) => Some(vec![s]),
				Some(ot::StopSequences::Many(v)) => Some(v),
				None => None,
			},
			stream: None, // selected by which Bedrock API is invoked, not a body field
			tools: None,
			tool_choice: None,
			anthropic_version: Some(ANTHROPIC_VERSION.to_string()),
			rest: Value::Null,
		};

		Ok(TranslatedRequest {
			body: Bytes::from(serde_json::to_vec(&body).map_err(TranslationError::Encode)?),
			headers: vec![],
		})
	}

	fn response_headers(&mut self, upstream_headers: &HeaderMap) -> Result<HeaderMap, TranslationError> {
		let mut headers = upstream_headers.clone();
		headers.remove(http::header::CONTENT_ENCODING);
		if self.is_streaming {
			headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/event-stream"));
		} else {
			headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
		}
		Ok(headers)
	}

	fn response_body(
		&mut self,
		upstream_chunk: &[u8],
		end_of_stream: bool,
	) -> Result<TranslatedResponseChunk, TranslationError> {
		if !self.is_streaming {
			self.non_streaming_buffer.extend_from_slice(upstream_chunk);
			if !end_of_stream {
				return Ok(TranslatedResponseChunk::default());
			}
			let resp: at::MessagesResponse =
				serde_json::from_slice(&self.non_streaming_buffer).map_err(|e| TranslationError::Decode(e.to_string()))?;
			let usage = TokenUsage {
				input: resp.usage.input_tokens,
				output: resp.usage.output_tokens,
				total: resp.usage.input_tokens + resp.usage.output_tokens,
				cached_input: None,
			};
			let translated = translate_non_streaming(&resp);
			return Ok(TranslatedResponseChunk {
				body: Bytes::from(serde_json::to_vec(&translated).map_err(TranslationError::Encode)?),
				usage: Some(usage),
				response_model: Some(translated.model.clone()),
			});
		}

		let events = self.decoder.push(upstream_chunk);
		let mut out = String::new();
		let mut usage = None;
		for event in events {
			let Ok(stream_event) = serde_json::from_value::<at::StreamEvent>(event.payload) else {
				continue;
			};
			match stream_event {
				at::StreamEvent::ContentBlockDelta {
					delta: at::Delta::TextDelta { text },
					..
				} => out.push_str(&sse::format_event(&chunk_json(self.response_model.as_deref(), &text, None))),
				at::StreamEvent::MessageDelta { delta, usage: u } => {
					usage = Some(TokenUsage {
						input: 0,
						output: u.output_tokens,
						total: u.output_tokens,
						cached_input: None,
					});
					if let Some(reason) = delta.stop_reason {
						out.push_str(&sse::format_event(&chunk_json(
							self.response_model.as_deref(),
							"",
							Some(anthropic_stop_reason_to_openai(&reason)),
						)));
					}
				},
				_ => {},
			}
		}
		if end_of_stream {
			out.push_str(sse::DONE_EVENT);
		}
		Ok(TranslatedResponseChunk {
			body: Bytes::from(out),
			usage,
			response_model: self.response_model.clone(),
		})
	}

	fn response_error(&mut self, _status: u16, upstream_body: &[u8]) -> Result<Bytes, TranslationError> {
		let err: at::ErrorResponse =
			serde_json::from_slice(upstream_body).map_err(|e| TranslationError::Decode(e.to_string()))?;
		let envelope = serde_json::json!({ "error": { "message": err.error.message, "type": err.error.kind } });
		Ok(Bytes::from(serde_json::to_vec(&envelope).map_err(TranslationError::Encode)?))
	}
}

pub fn translate_non_streaming(resp: &at::MessagesResponse) -> ot::ChatCompletionResponse {
	let text = resp
		.content
		.iter()
		.filter_map(|c| match c {
			at::ContentBlock::Text { text } => Some(text.clone()),
			_ => None,
		})
		.collect::<Vec<_>>()
		.join("");
	ot::ChatCompletionResponse {
		id: resp.id.clone(),
		model: resp.model.clone(),
		object: "chat.completion".to_string(),
		created: 0,
		choices: vec![ot::Choice {
			index: 0,
			message: Some(ot::ResponseMessage {
				role: Some("assistant".to_string()),
				content: Some(text),
				tool_calls: None,
				rest: Value::Null,
			}),
			delta: None,
			finish_reason: resp
				.stop_reason
				.as_deref()
				.map(anthropic_stop_reason_to_openai)
				.map(str::to_string),
			rest: Value::Null,
		}],
		usage: Some(ot::Usage {
			prompt_tokens: resp.usage.input_tokens,
			completion_tokens: resp.usage.output_tokens,
			total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
			prompt_tokens_details: None,
		}),
		rest: Value::Null,
	}
}

fn anthropic_stop_reason_to_openai(reason: &str) -> &'static str {
	match reason {
		"max_tokens" => "length",
		"tool_use" => "tool_calls",
		_ => "stop",
	}
}

fn chunk_json(model: Option<&str>, text: &str, finish_reason: Option<&str>) -> String {
	let chunk = ot::ChatCompletionChunk {
		id: "bedrock-invoke-stream".to_string(),
		model: model.unwrap_or_default().to_string(),
		object: "chat.completion.chunk".to_string(),
		created: 0,
		choices: vec![ot::Choice {
			index: 0,
			message: None,
			delta: Some(ot::ResponseMessage {
				role: None,
				content: if text.is_empty() { None } else { Some(text.to_string()) },
				tool_calls: None,
				rest: Value::Null,
			}),
			finish_reason: finish_reason.map(str::to_string),
			rest: Value::Null,
		}],
		usage: None,
		rest: Value::Null,
	};
	serde_json::to_string(&chunk).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_strips_model_and_injects_anthropic_version() {
		let mut t = OpenAiToBedrockInvoke::default();
		let raw = br#"{"model":"claude-3","messages":[{"role":"user","content":"hi"}]}"#;
		let out = t.request_body(raw, None).unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert!(v.get("model").is_none());
		assert_eq!(v["anthropic_version"], ANTHROPIC_VERSION);
	}

	#[test]
	fn non_streaming_request_decodes_plain_json_response_body() {
		let mut t = OpenAiToBedrockInvoke::default();
		t.request_body(
			br#"{"model":"claude-3","messages":[{"role":"user","content":"hi"}],"stream":false}"#,
			None,
		)
		.unwrap();
		let resp = at::MessagesResponse {
			id: "msg_1".to_string(),
			kind: "message".to_string(),
			role: at::Role::Assistant,
			model: "claude-3".to_string(),
			content: vec![at::ContentBlock::Text {
				text: "hello there".to_string(),
			}],
			stop_reason: Some("end_turn".to_string()),
			stop_sequence: None,
			usage: at::Usage {
				input_tokens: 4,
				output_tokens: 6,
			},
		};
		let raw = serde_json::to_vec(&resp).unwrap();
		let out = t.response_body(&raw, true).unwrap();
		assert_eq!(out.usage.unwrap().total, 10);
		let openai: ot::ChatCompletionResponse = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(
			openai.choices[0].message.as_ref().unwrap().content.as_deref(),
			Some("hello there")
		);
	}
}
