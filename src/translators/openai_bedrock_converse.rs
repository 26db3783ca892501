//! OpenAI-schema client talking to an AWS Bedrock Converse backend. Grounded in the
//! `llm::conversion::bedrock::from_completions` translate function: message
//! role mapping, image decode, stop-sequence/tool_choice mapping on the way in; finish
//! reason and streaming event mapping on the way out via `aws-smithy-eventstream` binary
//! framing (see `framing::aws_event_stream`).

use bytes::Bytes;
use http::HeaderMap;

use crate::error::TranslationError;
use crate::framing::aws_event_stream::AwsEventStreamDecoder;
use crate::framing::sse;
use crate::metrics::TokenUsage;
use crate::types::bedrock as bt;
use crate::types::openai as ot;

use super::{TranslatedRequest, TranslatedResponseChunk, Translator};

#[derive(Default)]
pub struct OpenAiToBedrockConverse {
	decoder: AwsEventStreamDecoder,
	response_model: Option<String>,
	is_streaming: bool,
	/// Buffers the full body across calls for a non-streaming attempt, since Bedrock's
	/// non-streaming `Converse` response is a single JSON object, not event-stream framed,
	/// and must be decoded whole rather than incrementally.
	non_streaming_buffer: bytes::BytesMut,
}

impl Translator for OpenAiToBedrockConverse {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let req: ot::ChatCompletionRequest =
			serde_json::from_slice(client_body).map_err(|e| TranslationError::Decode(e.to_string()))?;
		self.is_streaming = req.stream.unwrap_or(false);

		let model_id = model_override.map(str::to_string).unwrap_or(req.model.clone());

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
			if text.trim().is_empty() {
				continue;
			}
			let role = if m.role() == "assistant" {
				bt::Role::Assistant
			} else {
				bt::Role::User
			};
			messages.push(bt::Message {
				role,
				content: vec![bt::ContentBlock::Text(text)],
			});
		}

		let system = if system_text.is_empty() {
			None
		} else {
			Some(vec![bt::SystemContentBlock::Text { text: system_text }])
		};

		let stop_sequences = match req.stop {
			Some(ot::StopSequences::One(s)) => vec![s],
			Some(ot::StopSequences::Many(v)) => v,
			None => vec![],
		};

		let inference_config = bt::InferenceConfiguration {
			max_tokens: req.max_tokens.or(req.max_completion_tokens),
			temperature: req.temperature,
			top_p: req.top_p,
			stop_sequences,
		};

		let tool_config = req.tools.map(|tools| bt::ToolConfiguration {
			tools: tools
				.into_iter()
				.map(|t| {
					bt::Tool::ToolSpec(bt::ToolSpecification {
						name: t.function.name,
						description: t.function.description,
						input_schema: t.function.parameters.map(|json| bt::ToolInputSchema { json }),
					})
				})
				.collect(),
			tool_choice: req.tool_choice.as_ref().and_then(tool_choice_from_openai),
		});

		let converse = bt::ConverseRequest {
			model_id,
			messages,
			system,
			inference_config: Some(inference_config),
			tool_config,
			additional_model_request_fields: None,
		};

		let body = Bytes::from(serde_json::to_vec(&converse).map_err(TranslationError::Encode)?);
		self.response_model = Some(converse.model_id);
		Ok(TranslatedRequest { body, headers: vec![] })
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
			let resp: bt::ConverseResponse =
				serde_json::from_slice(&self.non_streaming_buffer).map_err(|e| TranslationError::Decode(e.to_string()))?;
			let model = self.response_model.clone().unwrap_or_default();
			let usage = resp.usage.map(|u| TokenUsage {
				input: u.input_tokens,
				output: u.output_tokens,
				total: u.total_tokens,
				cached_input: None,
			});
			let translated = translate_non_streaming(&resp, &model);
			return Ok(TranslatedResponseChunk {
				body: Bytes::from(serde_json::to_vec(&translated).map_err(TranslationError::Encode)?),
				usage,
				response_model: Some(model),
			});
		}

		let events = self.decoder.push(upstream_chunk);
		let mut out = String::new();
		let mut usage = None;
		for event in events {
			match event.event_type.as_deref() {
				Some("contentBlockDelta") => {
					if let Some(text) = event.payload.get("delta").and_then(|d| d.get("text")).and_then(|t| t.as_str()) {
						out.push_str(&sse::format_event(&chunk_json(self.response_model.as_deref(), text, None)));
					}
				},
				Some("messageStop") => {
					let reason = event
						.payload
						.get("stopReason")
						.and_then(|v| v.as_str())
						.unwrap_or("end_turn");
					out.push_str(&sse::format_event(&chunk_json(
						self.response_model.as_deref(),
						"",
						Some(stop_reason_str_to_openai(reason)),
					)));
				},
				Some("metadata") => {
					if let Some(u) = event.payload.get("usage") {
						usage = Some(TokenUsage {
							input: u.get("inputTokens").and_then(|v| v.as_u64()).unwrap_or(0),
							output: u.get("outputTokens").and_then(|v| v.as_u64()).unwrap_or(0),
							total: u.get("totalTokens").and_then(|v| v.as_u64()).unwrap_or(0),
							cached_input: None,
						});
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
		let err: bt::ConverseErrorResponse =
			serde_json::from_slice(upstream_body).map_err(|e| TranslationError::Decode(e.to_string()))?;
		let envelope = serde_json::json!({
			"error": { "message": err.message, "type": "upstream_error" }
		});
		Ok(Bytes::from(serde_json::to_vec(&envelope).map_err(TranslationError::Encode)?))
	}
}

/// Translates a single non-streaming `ConverseResponse` into an OpenAI
/// `ChatCompletionResponse`. Used by callers that buffer the whole non-streaming body
/// before translating, rather than going through `response_body`.
pub fn translate_non_streaming(resp: &bt::ConverseResponse, model: &str) -> ot::ChatCompletionResponse {
	let text = match &resp.output {
		Some(bt::ConverseOutput::Message(m)) => m
			.content
			.iter()
			.filter_map(|c| match c {
				bt::ContentBlock::Text(t) => Some(t.clone()),
				_ => None,
			})
			.collect::<Vec<_>>()
			.join(""),
		_ => String::new(),
	};
	let usage = resp.usage.map(|u| ot::Usage {
		prompt_tokens: u.input_tokens,
		completion_tokens: u.output_tokens,
		total_tokens: u.total_tokens,
		prompt_tokens_details: None,
	});
	ot::ChatCompletionResponse {
		id: uuid::Uuid::new_v4().to_string(),
		model: model.to_string(),
		object: "chat.completion".to_string(),
		created: 0,
		choices: vec![ot::Choice {
			index: 0,
			message: Some(ot::ResponseMessage {
				role: Some("assistant".to_string()),
				content: Some(text),
				tool_calls: None,
				rest: serde_json::Value::Null,
			}),
			delta: None,
			finish_reason: Some(resp.stop_reason.to_openai_finish_reason().to_string()),
			rest: serde_json::Value::Null,
		}],
		usage,
		rest: serde_json::Value::Null,
	}
}

fn tool_choice_from_openai(v: &serde_json::Value) -> Option<bt::ToolChoice> {
	match v {
		serde_json::Value::String(s) if s == "auto" => Some(bt::ToolChoice::Auto),
		serde_json::Value::String(s) if s == "required" => Some(bt::ToolChoice::Any),
		serde_json::Value::String(s) if s == "none" => None,
		serde_json::Value::Object(obj) => obj
			.get("function")
			.and_then(|f| f.get("name"))
			.and_then(|n| n.as_str())
			.map(|name| bt::ToolChoice::Tool { name: name.to_string() }),
		_ => None,
	}
}

fn stop_reason_str_to_openai(reason: &str) -> &'static str {
	match reason {
		"max_tokens" => "length",
		"tool_use" => "tool_calls",
		"content_filtered" | "guardrail_intervened" => "content_filter",
		_ => "stop",
	}
}

fn chunk_json(model: Option<&str>, text: &str, finish_reason: Option<&str>) -> String {
	let chunk = ot::ChatCompletionChunk {
		id: "bedrock-stream".to_string(),
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
				rest: serde_json::Value::Null,
			}),
			finish_reason: finish_reason.map(str::to_string),
			rest: serde_json::Value::Null,
		}],
		usage: None,
		rest: serde_json::Value::Null,
	};
	serde_json::to_string(&chunk).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_maps_system_and_user_messages() {
		let mut t = OpenAiToBedrockConverse::default();
		let raw = br#"{"model":"claude","messages":[{"role":"system","content":"be nice"},{"role":"user","content":"hi"}]}"#;
		let out = t.request_body(raw, None).unwrap();
		let converse: bt::ConverseRequest = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(converse.system.unwrap().len(), 1);
		assert_eq!(converse.messages.len(), 1);
	}

	#[test]
	fn non_streaming_request_decodes_plain_json_response_body() {
		let mut t = OpenAiToBedrockConverse::default();
		t.request_body(br#"{"model":"claude","messages":[{"role":"user","content":"hi"}]}"#, None).unwrap();
		let resp = bt::ConverseResponse {
			output: Some(bt::ConverseOutput::Message(bt::Message {
				role: bt::Role::Assistant,
				content: vec![bt::ContentBlock::Text("hello there".into())],
			})),
			stop_reason: bt::StopReason::EndTurn,
			usage: Some(bt::TokenUsage {
				input_tokens: 4,
				output_tokens: 6,
				total_tokens: 10,
			}),
		};
		let raw = serde_json::to_vec(&resp).unwrap();
		let out = t.response_body(&raw, true).unwrap();
		assert_eq!(out.usage.unwrap().total, 10);
		let openai: ot::ChatCompletionResponse = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(openai.choices[0].message.as_ref().unwrap().content.as_deref(), Some("hello there"));
	}

	#[test]
	fn non_streaming_response_maps_finish_reason() {
		let resp = bt::ConverseResponse {
			output: Some(bt::ConverseOutput::Message(bt::Message {
				role: bt::Role::Assistant,
				content: vec![bt::ContentBlock::Text("hello".into())],
			})),
			stop_reason: bt::StopReason::MaxTokens,
			usage: Some(bt::TokenUsage {
				input_tokens: 1,
				output_tokens: 2,
				total_tokens: 3,
			}),
		};
		let out = translate_non_streaming(&resp, "claude");
		assert_eq!(out.choices[0].finish_reason.as_deref(), Some("length"));
		assert_eq!(out.choices[0].message.as_ref().unwrap().content.as_deref(), Some("hello"));
	}
}
