//! OpenAI-schema client talking to a GCP Vertex Gemini backend
//! (`generateContent`/`streamGenerateContent?alt=sse`). Unlike Bedrock, Vertex's streaming
//! transport is already client-facing-style SSE, just carrying full `GenerateContentResponse`
//! objects per event rather than OpenAI deltas, so this translator decodes with
//! [`crate::framing::sse::SseDecoder`] rather than a binary event-stream.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use super::{TranslatedRequest, TranslatedResponseChunk, Translator};
use crate::error::TranslationError;
use crate::framing::sse::{self, SseDecoder};
use crate::metrics::TokenUsage;
use crate::types::gemini as gt;
use crate::types::openai as ot;

#[derive(Default)]
pub struct OpenAiToVertexGemini {
	decoder: SseDecoder,
	response_model: Option<String>,
	is_streaming: bool,
	/// Buffers the full body across calls for a non-streaming attempt: Vertex's
	/// non-streaming `generateContent` response is one plain JSON object, not SSE framed.
	non_streaming_buffer: bytes::BytesMut,
}

impl Translator for OpenAiToVertexGemini {
	fn request_body(&mut self, client_body: &[u8], model_override: Option<&str>) -> Result<TranslatedRequest, TranslationError> {
		let req: ot::ChatCompletionRequest =
			serde_json::from_slice(client_body).map_err(|e| TranslationError::Decode(e.to_string()))?;

		self.is_streaming = req.stream.unwrap_or(false);
		self.response_model = Some(model_override.map(str::to_string).unwrap_or(req.model.clone()));

		let mut system_instruction = None;
		let mut contents = Vec::new();
		for m in req.messages {
			let text = m.text().unwrap_or_default();
			if m.role() == "system" {
				system_instruction = Some(gt::Content {
					role: None,
					parts: vec![gt::Part {
						text: Some(text),
						inline_data: None,
						function_call: None,
						function_response: None,
					}],
				});
				continue;
			}
			let role = if m.role() == "assistant" { "model" } else { "user" };
			contents.push(gt::Content {
				role: Some(role.to_string()),
				parts: vec![gt::Part {
					text: Some(text),
					inline_data: None,
					function_call: None,
					function_response: None,
				}],
			});
		}

		let generation_config = gt::GenerationConfig {
			temperature: req.temperature,
			top_p: req.top_p,
			max_output_tokens: req.max_tokens.or(req.max_completion_tokens),
			stop_sequences: match req.stop {
				Some(ot::StopSequences::One(s)) => vec![s],
				Some(ot::StopSequences::Many(v)) => v,
				None => vec![],
			},
		};

		let tools = req.tools.map(|tools| {
			vec![gt::Tool {
				function_declarations: tools
					.into_iter()
					.map(|t| gt::FunctionDeclaration {
						name: t.function.name,
						description: t.function.description,
						parameters: t.function.parameters,
					})
					.collect(),
			}]
		});

		let body = gt::GenerateContentRequest {
			contents,
			system_instruction,
			generation_config: Some(generation_config),
			tools,
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
			let resp: gt::GenerateContentResponse =
				serde_json::from_slice(&self.non_streaming_buffer).map_err(|e| TranslationError::Decode(e.to_string()))?;
			let model = self.response_model.clone().unwrap_or_default();
			let usage = resp.usage_metadata.map(|u| TokenUsage {
				input: u.prompt_token_count,
				output: u.candidates_token_count,
				total: u.total_token_count,
				cached_input: None,
			});
			let translated = translate_non_streaming(&resp, &model);
			return Ok(TranslatedResponseChunk {
				body: Bytes::from(serde_json::to_vec(&translated).map_err(TranslationError::Encode)?),
				usage,
				response_model: Some(model),
			});
		}

		let events = self.decoder.push(upstream_chunk)?;
		let mut out = String::new();
		let mut usage = None;
		for event in events {
			let Ok(resp) = serde_json::from_str::<gt::GenerateContentResponse>(&event.data) else {
				continue;
			};
			if let Some(u) = resp.usage_metadata {
				usage = Some(TokenUsage {
					input: u.prompt_token_count,
					output: u.candidates_token_count,
					total: u.total_token_count,
					cached_input: None,
				});
			}
			for candidate in resp.candidates {
				let text = candidate
					.content
					.parts
					.iter()
					.filter_map(|p| p.text.as_deref())
					.collect::<Vec<_>>()
					.join("");
				let finish_reason = candidate.finish_reason.as_deref().map(gt::finish_reason_to_openai);
				out.push_str(&sse::format_event(&chunk_json(self.response_model.as_deref(), &text, finish_reason)));
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
		let value: Value =
			serde_json::from_slice(upstream_body).map_err(|e| TranslationError::Decode(e.to_string()))?;
		let message = value
			.get("error")
			.and_then(|e| e.get("message"))
			.and_then(|m| m.as_str())
			.unwrap_or("upstream error")
			.to_string();
		let envelope = serde_json::json!({ "error": { "message": message, "type": "upstream_error" } });
		Ok(Bytes::from(serde_json::to_vec(&envelope).map_err(TranslationError::Encode)?))
	}
}

/// Translates a single non-streaming `GenerateContentResponse` into an OpenAI
/// `ChatCompletionResponse`, used for the buffer-then-translate non-streaming path.
pub fn translate_non_streaming(resp: &gt::GenerateContentResponse, model: &str) -> ot::ChatCompletionResponse {
	let choices = resp
		.candidates
		.iter()
		.map(|c| {
			let text = c
				.content
				.parts
				.iter()
				.filter_map(|p| p.text.as_deref())
				.collect::<Vec<_>>()
				.join("");
			ot::Choice {
				index: c.index,
				message: Some(ot::ResponseMessage {
					role: Some("assistant".to_string()),
					content: Some(text),
					tool_calls: None,
					rest: Value::Null,
				}),
				delta: None,
				finish_reason: c.finish_reason.as_deref().map(gt::finish_reason_to_openai).map(str::to_string),
				rest: Value::Null,
			}
		})
		.collect();
	let usage = resp.usage_metadata.map(|u| ot::Usage {
		prompt_tokens: u.prompt_token_count,
		completion_tokens: u.candidates_token_count,
		total_tokens: u.total_token_count,
		prompt_tokens_details: None,
	});
	ot::ChatCompletionResponse {
		id: uuid::Uuid::new_v4().to_string(),
		model: model.to_string(),
		object: "chat.completion".to_string(),
		created: 0,
		choices,
		usage,
		rest: Value::Null,
	}
}

fn chunk_json(model: Option<&str>, text: &str, finish_reason: Option<&str>) -> String {
	let chunk = ot::ChatCompletionChunk {
		id: "vertex-gemini-stream".to_string(),
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
	fn request_splits_system_instruction_from_contents() {
		let mut t = OpenAiToVertexGemini::default();
		let raw = br#"{"model":"gemini-1.5-pro","messages":[{"role":"system","content":"be nice"},{"role":"user","content":"hi"}]}"#;
		let out = t.request_body(raw, None).unwrap();
		let req: gt::GenerateContentRequest = serde_json::from_slice(&out.body).unwrap();
		assert!(req.system_instruction.is_some());
		assert_eq!(req.contents.len(), 1);
		assert_eq!(req.contents[0].role.as_deref(), Some("user"));
	}

	#[test]
	fn response_body_maps_sse_candidate_to_openai_chunk() {
		let mut t = OpenAiToVertexGemini::default();
		t.response_model = Some("gemini-1.5-pro".to_string());
		let payload = serde_json::json!({
			"candidates": [{"content": {"role": "model", "parts": [{"text": "hi"}]}, "finishReason": "STOP", "index": 0}],
		});
		let chunk = format!("data: {payload}\n\n");
		let out = t.response_body(chunk.as_bytes(), true).unwrap();
		let text = String::from_utf8(out.body.to_vec()).unwrap();
		assert!(text.contains("\"content\":\"hi\""));
		assert!(text.ends_with(sse::DONE_EVENT));
	}

	#[test]
	fn non_streaming_request_decodes_plain_json_response_body() {
		let mut t = OpenAiToVertexGemini::default();
		t.request_body(
			br#"{"model":"gemini-1.5-pro","messages":[{"role":"user","content":"hi"}],"stream":false}"#,
			None,
		)
		.unwrap();
		let payload = serde_json::json!({
			"candidates": [{"content": {"role": "model", "parts": [{"text": "hello there"}]}, "finishReason": "STOP", "index": 0}],
			"usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10},
		});
		let raw = serde_json::to_vec(&payload).unwrap();
		let out = t.response_body(&raw, true).unwrap();
		assert_eq!(out.usage.unwrap().total, 10);
		let openai: ot::ChatCompletionResponse = serde_json::from_slice(&out.body).unwrap();
		assert_eq!(
			openai.choices[0].message.as_ref().unwrap().content.as_deref(),
			Some("hello there")
		);
	}
}
