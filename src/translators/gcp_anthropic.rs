//! GCP Vertex's Anthropic publisher model endpoint
//! (`publishers/anthropic/models/<model>:{rawPredict|streamRawPredict}`). The wire body
//! is Anthropic's own Messages schema with two adjustments: `model` is dropped (it lives
//! in the path) and `anthropic_version` defaults to `"vertex-2023-10-16"` if the client
//! didn't already set one. Two client-facing schemas land here — the native `/v1/messages`
//! endpoint (`AnthropicToGcpAnthropic`, near pass-through) and OpenAI chat/completions
//! (`OpenAiToGcpAnthropic`, via the same message-role folding as the Bedrock translators).

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use super::openai_bedrock_invoke::translate_non_streaming;
use super::{TranslatedRequest, TranslatedResponseChunk, Translator};
use crate::error::TranslationError;
use crate::framing::sse::{self, SseDecoder};
use crate::metrics::TokenUsage;
use crate::types::anthropic as at;
use crate::types::openai as ot;

const VERTEX_ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

/// Native Anthropic Messages client talking to GCP's Anthropic publisher endpoint.
/// Body shape matches exactly; only `model`/`anthropic_version` need adjusting.
#[derive(Default)]
pub struct AnthropicToGcpAnthropic {
	decoder: SseDecoder,
	is_streaming: bool,
}

impl Translator for AnthropicToGcpAnthropic {
	fn request_body(&mut self, client_body: &[u8], _model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let mut req: at::MessagesRequest =
			serde_json::from_slice(client_body).map_err(|e| TranslationError::Decode(e.to_string()))?;
		self.is_streaming = req.stream.unwrap_or(false);
		req.model = None;
		if req.anthropic_version.is_none() {
			req.anthropic_version = Some(VERTEX_ANTHROPIC_VERSION.to_string());
		}
		Ok(TranslatedRequest {
			body: Bytes::from(serde_json::to_vec(&req).map_err(TranslationError::Encode)?),
			headers: vec![],
		})
	}

	fn response_headers(&mut self, upstream_headers: &HeaderMap) -> Result<HeaderMap, TranslationError> {
		Ok(upstream_headers.clone())
	}

	fn response_body(
		&mut self,
		upstream_chunk: &[u8],
		end_of_stream: bool,
	) -> Result<TranslatedResponseChunk, TranslationError> {
		// Same schema both sides of the wire, so bytes always pass through unmodified;
		// only usage extraction differs by shape. Streaming carries it in a trailing
		// `message_delta` SSE event; non-streaming is a single plain JSON `MessagesResponse`
		// with a top-level `usage`, which never contains an SSE blank-line separator for
		// the decoder to find.
		let usage = if self.is_streaming {
			let events = self.decoder.push(upstream_chunk)?;
			events.iter().find_map(|event| match serde_json::from_str(&event.data) {
				Ok(at::StreamEvent::MessageDelta { usage: u, .. }) => Some(TokenUsage {
					input: u.input_tokens,
					output: u.output_tokens,
					total: u.input_tokens + u.output_tokens,
					cached_input: None,
				}),
				_ => None,
			})
		} else if end_of_stream {
			serde_json::from_slice::<at::MessagesResponse>(upstream_chunk)
				.ok()
				.map(|resp| TokenUsage {
					input: resp.usage.input_tokens,
					output: resp.usage.output_tokens,
					total: resp.usage.input_tokens + resp.usage.output_tokens,
					cached_input: None,
				})
		} else {
			None
		};
		Ok(TranslatedResponseChunk {
			body: Bytes::copy_from_slice(upstream_chunk),
			usage,
			response_model: None,
		})
	}

	fn response_error(&mut self, _status: u16, upstream_body: &[u8]) -> Result<Bytes, TranslationError> {
		Ok(Bytes::copy_from_slice(upstream_body))
	}
}

/// OpenAI chat/completions client talking to GCP's Anthropic publisher endpoint. Folds
/// OpenAI messages into Anthropic's schema (same role-splitting as the Bedrock InvokeModel
/// translator) and translates Anthropic SSE events back into OpenAI chunk JSON,
/// accumulating `input_json_delta` tool-call argument fragments across deltas.
#[derive(Default)]
pub struct OpenAiToGcpAnthropic {
	decoder: SseDecoder,
	response_model: Option<String>,
	is_streaming: bool,
	/// Buffers the full body across calls for a non-streaming attempt: GCP's `rawPredict`
	/// response is a single plain JSON `MessagesResponse`, not SSE framed.
	non_streaming_buffer: bytes::BytesMut,
}

impl Translator for OpenAiToGcpAnthropic {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let req: ot::ChatCompletionRequest =
			serde_json::from_slice(client_body).map_err(|e| TranslationError::Decode(e.to_string()))?;

		self.is_streaming = req.stream.unwrap_or(false);
		self.response_model = Some(model_override.map(str::to_string).unwrap_or(req.model.clone()));

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

		let body = at::MessagesRequest {
			model: None,
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
			stream: None,
			tools: None,
			tool_choice: None,
			anthropic_version: Some(VERTEX_ANTHROPIC_VERSION.to_string()),
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

		let events = self.decoder.push(upstream_chunk)?;
		let mut out = String::new();
		let mut usage = None;
		for event in events {
			let Ok(stream_event) = serde_json::from_str::<at::StreamEvent>(&event.data) else {
				continue;
			};
			match stream_event {
				at::StreamEvent::ContentBlockDelta {
					delta: at::Delta::TextDelta { text },
					..
				} => out.push_str(&sse::format_event(&chunk_json(self.response_model.as_deref(), &text, None))),
				at::StreamEvent::ContentBlockDelta {
					delta: at::Delta::InputJsonDelta { .. },
					..
				} => {
					// Tool-call argument fragments are forwarded as-is in the `content`
					// delta; a full accumulate-then-emit tool_calls chunk belongs to the
					// endpoint layer, which sees the whole stream rather than one frame.
				},
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

fn anthropic_stop_reason_to_openai(reason: &str) -> &'static str {
	match reason {
		"max_tokens" => "length",
		"tool_use" => "tool_calls",
		_ => "stop",
	}
}

fn chunk_json(model: Option<&str>, text: &str, finish_reason: Option<&str>) -> String {
	let chunk = ot::ChatCompletionChunk {
		id: "gcp-anthropic-stream".to_string(),
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
	fn native_request_strips_model_and_defaults_version() {
		let mut t = AnthropicToGcpAnthropic::default();
		let raw = br#"{"model":"claude-3-sonnet-20240229","messages":[{"role":"user","content":"hi"}],"max_tokens":256}"#;
		let out = t.request_body(raw, None).unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert!(v.get("model").is_none());
		assert_eq!(v["anthropic_version"], VERTEX_ANTHROPIC_VERSION);
	}

	#[test]
	fn native_request_keeps_explicit_version() {
		let mut t = AnthropicToGcpAnthropic::default();
		let raw = br#"{"messages":[{"role":"user","content":"hi"}],"max_tokens":256,"anthropic_version":"2023-06-01"}"#;
		let out = t.request_body(raw, None).unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(v["anthropic_version"], "2023-06-01");
	}

	#[test]
	fn openai_request_folds_system_and_sets_vertex_version() {
		let mut t = OpenAiToGcpAnthropic::default();
		let raw = br#"{"model":"claude-3-sonnet-20240229","messages":[{"role":"system","content":"be nice"},{"role":"user","content":"hi"}]}"#;
		let out = t.request_body(raw, None).unwrap();
		let v: Value = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(v["anthropic_version"], VERTEX_ANTHROPIC_VERSION);
		assert_eq!(v["messages"].as_array().unwrap().len(), 1);
	}

	fn sample_messages_response() -> at::MessagesResponse {
		at::MessagesResponse {
			id: "msg_1".to_string(),
			kind: "message".to_string(),
			role: at::Role::Assistant,
			model: "claude-3-sonnet-20240229".to_string(),
			content: vec![at::ContentBlock::Text {
				text: "hello there".to_string(),
			}],
			stop_reason: Some("end_turn".to_string()),
			stop_sequence: None,
			usage: at::Usage {
				input_tokens: 4,
				output_tokens: 6,
			},
		}
	}

	#[test]
	fn native_non_streaming_passthrough_extracts_usage_without_touching_body() {
		let mut t = AnthropicToGcpAnthropic::default();
		t.request_body(
			br#"{"messages":[{"role":"user","content":"hi"}],"max_tokens":256,"stream":false}"#,
			None,
		)
		.unwrap();
		let raw = serde_json::to_vec(&sample_messages_response()).unwrap();
		let out = t.response_body(&raw, true).unwrap();
		assert_eq!(out.usage.unwrap().total, 10);
		assert_eq!(&out.body[..], &raw[..]);
	}

	#[test]
	fn openai_non_streaming_translates_plain_json_response_body() {
		let mut t = OpenAiToGcpAnthropic::default();
		t.request_body(
			br#"{"model":"claude-3-sonnet-20240229","messages":[{"role":"user","content":"hi"}],"stream":false}"#,
			None,
		)
		.unwrap();
		let raw = serde_json::to_vec(&sample_messages_response()).unwrap();
		let out = t.response_body(&raw, true).unwrap();
		assert_eq!(out.usage.unwrap().total, 10);
		let openai: ot::ChatCompletionResponse = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(
			openai.choices[0].message.as_ref().unwrap().content.as_deref(),
			Some("hello there")
		);
	}
}
