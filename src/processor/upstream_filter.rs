//! The upstream-facing phase handler: one instance per upstream attempt. Resolves the
//! backend the proxy's router selected, translates the client body into that backend's
//! wire format, signs/authenticates the outbound request, and translates the response
//! back into the client's schema.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};

use super::state::{AttemptState, RequestRegistry, SharedRequestState};
use super::{header_str, BodyMutation, CommonStatus, Header, HeaderMutation, Phase, PhaseResponse, ResponseBodyMode, StreamPhase};
use crate::auth::{self, AuthContext};
use crate::config::{Backend, RuntimeConfig};
use crate::endpoints;
use crate::error::{ConfigError, ProcessorError};
use crate::framing::gzip;
use crate::metrics::{compute_costs, CelCostContext, DynamicMetadata, MetricsSink};
use crate::translators::{TranslatedResponseChunk, Translator};

const BACKEND_NAME_ATTRIBUTE: &str = "backend_name";

pub struct UpstreamFilter {
	config: Arc<RuntimeConfig>,
	registry: RequestRegistry,
	phase: StreamPhase,
	request_id: Option<String>,
	shared: Option<Arc<parking_lot::Mutex<SharedRequestState>>>,
	attempt: Option<AttemptState>,
}

impl UpstreamFilter {
	pub fn new(config: Arc<RuntimeConfig>, registry: RequestRegistry) -> Self {
		Self {
			config,
			registry,
			phase: StreamPhase::default(),
			request_id: None,
			shared: None,
			attempt: None,
		}
	}

	pub async fn handle(&mut self, phase: Phase) -> Result<PhaseResponse, ProcessorError> {
		self.phase = self.phase.advance(&phase, false)?;
		match phase {
			Phase::RequestHeaders { headers, attributes, .. } => self.on_request_headers(&headers, &attributes).await,
			Phase::RequestBody { .. } => unreachable!("rejected by StreamPhase::advance"),
			Phase::ResponseHeaders { headers, .. } => self.on_response_headers(&headers),
			Phase::ResponseBody { body, end_of_stream } => self.on_response_body(body, end_of_stream),
		}
	}

	async fn on_request_headers(
		&mut self,
		headers: &[Header],
		attributes: &std::collections::HashMap<String, String>,
	) -> Result<PhaseResponse, ProcessorError> {
		let request_id = header_str(headers, super::state::REQUEST_ID_HEADER)
			.ok_or(ProcessorError::ProtocolViolation("upstream filter saw no request id header"))?
			.to_string();
		let backend_name = attributes
			.get(BACKEND_NAME_ATTRIBUTE)
			.ok_or(ProcessorError::ProtocolViolation("upstream filter attached with no backend_name attribute"))?;

		let shared = self
			.registry
			.get(&request_id)
			.ok_or(ProcessorError::ProtocolViolation("no shared request state for this request id"))?;

		let backend = self
			.config
			.backend(backend_name)
			.cloned()
			.ok_or_else(|| ConfigError::UnknownBackend(backend_name.clone()))?;

		let (raw_body, model_name, is_streaming, endpoint_handler, on_retry) = {
			let mut state = shared.lock();
			state.attempt_count += 1;
			state.metrics.set_backend(&backend.name);
			(
				state.raw_body.clone(),
				state.model_name.clone(),
				state.is_streaming,
				state.endpoint_handler.clone(),
				state.attempt_count > 1,
			)
		};

		let mut translator = endpoint_handler.translator(&backend.schema.name, backend.model_name_override.as_deref())?;
		let translated = translator.request_body(&raw_body, backend.model_name_override.as_deref())?;

		let (path, host) = endpoints::upstream_path_and_host(&backend, &model_name, is_streaming);

		let mut outbound = HeaderMap::new();
		for (name, value) in &translated.headers {
			outbound.insert(name.clone(), value.clone());
		}
		if let Some(mutation_cfg) = &backend.header_mutation {
			for (name, value) in &mutation_cfg.set {
				let name = HeaderName::try_from(name.as_str()).map_err(|_| ProcessorError::ProtocolViolation("invalid configured header name"))?;
				let value = HeaderValue::try_from(value.as_str()).map_err(|_| ProcessorError::ProtocolViolation("invalid configured header value"))?;
				outbound.insert(name, value);
			}
			for name in &mutation_cfg.remove {
				if let Ok(name) = HeaderName::try_from(name.as_str()) {
					outbound.remove(name);
				}
			}
		}

		auth::apply(
			backend.auth.as_ref(),
			AuthContext {
				headers: &mut outbound,
				body: &translated.body,
			},
		)
		.await?;

		let mut mutation = HeaderMutation::default()
			.with_set(":path", path.into_bytes())
			.with_set("content-length", translated.body.len().to_string().into_bytes());
		if let Some(host) = host {
			mutation = mutation.with_set(":authority", host.into_bytes());
		}
		for (name, value) in outbound.iter() {
			mutation = mutation.with_set(name.as_str().to_string(), value.as_bytes().to_vec());
		}

		self.request_id = Some(request_id);
		self.shared = Some(shared);
		self.attempt = Some(AttemptState {
			translator,
			backend_name: backend.name.clone(),
			model_name_override: backend.model_name_override.clone(),
			upstream_status: None,
			on_retry,
			content_encoding: None,
			gzip_buffer: BytesMut::new(),
		});

		Ok(PhaseResponse {
			header_mutation: Some(mutation),
			body_mutation: Some(BodyMutation::Replace(translated.body)),
			clear_route_cache: false,
			status: Some(CommonStatus::ContinueAndReplace),
			mode_override: None,
			dynamic_metadata: None,
		})
	}

	fn on_response_headers(&mut self, headers: &[Header]) -> Result<PhaseResponse, ProcessorError> {
		let attempt = self
			.attempt
			.as_mut()
			.ok_or(ProcessorError::ProtocolViolation("response headers with no attempt state"))?;
		let status: u16 = header_str(headers, ":status").and_then(|s| s.parse().ok()).unwrap_or(0);
		attempt.upstream_status = Some(status);

		let mut upstream_map = HeaderMap::new();
		for h in headers {
			if h.name.starts_with(':') {
				continue;
			}
			if let (Ok(name), Ok(value)) = (HeaderName::try_from(h.name.as_str()), HeaderValue::from_bytes(&h.value)) {
				upstream_map.insert(name, value);
			}
		}
		attempt.content_encoding = upstream_map
			.get(http::header::CONTENT_ENCODING)
			.and_then(|v| v.to_str().ok())
			.map(str::to_string);

		let mut rewritten = attempt.translator.response_headers(&upstream_map)?;
		// The body this filter forwards is always a replacement (decompressed, and
		// possibly re-translated) — whatever content-encoding the upstream declared no
		// longer describes it.
		rewritten.remove(http::header::CONTENT_ENCODING);

		// Non-streaming translators (e.g. Bedrock Converse, Vertex Gemini) decode their
		// whole response in one shot and expect exactly one `ResponseBody` call carrying
		// the complete bytes; telling the proxy to buffer rather than stream is what makes
		// that guarantee hold.
		let is_streaming = self.shared.as_ref().map(|s| s.lock().is_streaming).unwrap_or(false);
		let mode_override = Some(if is_streaming { ResponseBodyMode::Streamed } else { ResponseBodyMode::None });

		let mut mutation = HeaderMutation::default().with_remove(http::header::CONTENT_ENCODING.as_str());
		for (name, value) in rewritten.iter() {
			mutation = mutation.with_set(name.as_str().to_string(), value.as_bytes().to_vec());
		}
		Ok(PhaseResponse {
			header_mutation: Some(mutation),
			mode_override,
			..PhaseResponse::unmodified()
		})
	}

	fn on_response_body(&mut self, body: Bytes, end_of_stream: bool) -> Result<PhaseResponse, ProcessorError> {
		let attempt = self
			.attempt
			.as_mut()
			.ok_or(ProcessorError::ProtocolViolation("response body with no attempt state"))?;
		let status = attempt.upstream_status.unwrap_or(0);

		let out_body = if status >= 400 {
			attempt.translator.response_error(status, &body)?
		} else {
			let is_gzip = gzip::is_gzip_encoded(attempt.content_encoding.as_deref());
			let chunk = if is_gzip {
				// A gzip stream only decodes correctly once its footer has arrived, so
				// every chunk is buffered whole and handed to the translator in one shot
				// at end-of-stream rather than as it arrives.
				attempt.gzip_buffer.extend_from_slice(&body);
				if end_of_stream {
					let decompressed = gzip::decompress(&attempt.gzip_buffer)?;
					attempt.translator.response_body(&decompressed, true)?
				} else {
					TranslatedResponseChunk::default()
				}
			} else {
				attempt.translator.response_body(&body, end_of_stream)?
			};
			if let Some(shared) = &self.shared {
				let mut state = shared.lock();
				if let Some(usage) = chunk.usage {
					state.metrics.record_token_usage(usage);
				}
				if let Some(model) = &chunk.response_model {
					state.metrics.set_response_model(model);
				}
				if state.is_streaming {
					state.metrics.record_token_latency(None, None);
				}
			}
			chunk.body
		};

		let dynamic_metadata = if end_of_stream { self.finish(status < 400)? } else { None };

		Ok(PhaseResponse {
			body_mutation: Some(BodyMutation::Replace(out_body)),
			dynamic_metadata,
			..PhaseResponse::unmodified()
		})
	}

	/// Computes end-of-stream cost/latency metadata, records completion, and drops this
	/// attempt's shared state out of the registry. Returns the metadata as JSON for the
	/// caller to attach to the final `ResponseBody` phase response.
	fn finish(&mut self, success: bool) -> Result<Option<serde_json::Value>, ProcessorError> {
		let request_id = match self.request_id.take() {
			Some(id) => id,
			None => return Ok(None),
		};
		let attempt = self.attempt.take();
		let metadata = if let Some(shared) = self.shared.take() {
			let mut state = shared.lock();
			let usage = state.metrics.usage();
			let backend_name = attempt.as_ref().map(|a| a.backend_name.clone()).unwrap_or_default();
			let model_override = attempt.as_ref().and_then(|a| a.model_name_override.clone());
			let ctx = CelCostContext {
				input_tokens: usage.input,
				output_tokens: usage.output,
				total_tokens: usage.total,
				backend: &backend_name,
				model: &state.model_name,
			};
			let costs = compute_costs(&self.config, usage, &ctx);
			let metadata = DynamicMetadata {
				backend_name,
				model_name_override: model_override,
				costs,
				token_latency_ttft: state.metrics.time_to_first_token_ms(),
				token_latency_itl: state.metrics.inter_token_latency_ms(),
			};
			state.metrics.record_request_completion(success);
			serde_json::to_value(&metadata).ok()
		} else {
			None
		};
		self.registry.remove(&request_id);
		Ok(metadata)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{BackendAuth, RouteRule, SchemaRef};
	use crate::endpoints::chat_completions::ChatCompletions;
	use crate::processor::state::{SharedRequestState, MODEL_HEADER, REQUEST_ID_HEADER};

	fn sample_config() -> Arc<RuntimeConfig> {
		Arc::new(RuntimeConfig {
			input_schema: SchemaRef {
				name: "openai".into(),
				version: "v1".into(),
			},
			model_name_header_key: MODEL_HEADER.to_string(),
			selected_backend_header_key: "x-ai-eg-selected-backend".into(),
			backends: vec![Backend {
				name: "openai-primary".to_string(),
				schema: SchemaRef {
					name: "openai".into(),
					version: "v1".into(),
				},
				model_name_override: None,
				header_mutation: None,
				auth: Some(BackendAuth::None),
				host_override: Some("api.openai.example.com".to_string()),
				gcp_project_id: None,
			}],
			rules: vec![] as Vec<RouteRule>,
			models: vec![],
			request_costs: vec![],
			metadata_namespace: "io.aigw".into(),
			uuid: None,
		})
	}

	fn headers(pairs: &[(&str, &str)]) -> Vec<Header> {
		pairs
			.iter()
			.map(|(n, v)| Header {
				name: n.to_string(),
				value: v.as_bytes().to_vec(),
			})
			.collect()
	}

	#[tokio::test]
	async fn resolves_backend_and_replaces_body_on_request_headers() {
		let registry = RequestRegistry::new();
		registry.insert(
			"req-1".to_string(),
			SharedRequestState {
				raw_body: Bytes::from_static(br#"{"model":"gpt-4o-mini","messages":[]}"#),
				model_name: "gpt-4o-mini".to_string(),
				is_streaming: false,
				endpoint_handler: Arc::new(ChatCompletions),
				span: tracing::Span::none(),
				metrics: crate::metrics::RequestMetrics::default(),
				attempt_count: 0,
			},
		);
		let mut filter = UpstreamFilter::new(sample_config(), registry);
		let mut attributes = std::collections::HashMap::new();
		attributes.insert(BACKEND_NAME_ATTRIBUTE.to_string(), "openai-primary".to_string());
		let resp = filter
			.handle(Phase::RequestHeaders {
				headers: headers(&[(REQUEST_ID_HEADER, "req-1")]),
				end_of_stream: true,
				attributes,
			})
			.await
			.unwrap();
		assert_eq!(resp.status, Some(CommonStatus::ContinueAndReplace));
		assert!(matches!(resp.body_mutation, Some(BodyMutation::Replace(_))));
	}

	#[tokio::test]
	async fn non_streaming_response_headers_request_buffered_delivery() {
		let registry = RequestRegistry::new();
		registry.insert(
			"req-1".to_string(),
			SharedRequestState {
				raw_body: Bytes::from_static(br#"{"model":"gpt-4o-mini","messages":[]}"#),
				model_name: "gpt-4o-mini".to_string(),
				is_streaming: false,
				endpoint_handler: Arc::new(ChatCompletions),
				span: tracing::Span::none(),
				metrics: crate::metrics::RequestMetrics::default(),
				attempt_count: 0,
			},
		);
		let mut filter = UpstreamFilter::new(sample_config(), registry);
		let mut attributes = std::collections::HashMap::new();
		attributes.insert(BACKEND_NAME_ATTRIBUTE.to_string(), "openai-primary".to_string());
		filter
			.handle(Phase::RequestHeaders {
				headers: headers(&[(REQUEST_ID_HEADER, "req-1")]),
				end_of_stream: true,
				attributes,
			})
			.await
			.unwrap();
		let resp = filter
			.handle(Phase::ResponseHeaders {
				headers: headers(&[(":status", "200")]),
				end_of_stream: false,
			})
			.await
			.unwrap();
		assert_eq!(resp.mode_override, Some(ResponseBodyMode::None));
	}

	#[tokio::test]
	async fn gzip_encoded_response_is_decompressed_and_content_encoding_stripped() {
		use std::io::Write;

		use flate2::write::GzEncoder;
		use flate2::Compression;

		let registry = RequestRegistry::new();
		registry.insert(
			"req-1".to_string(),
			SharedRequestState {
				raw_body: Bytes::from_static(br#"{"model":"gpt-4o-mini","messages":[]}"#),
				model_name: "gpt-4o-mini".to_string(),
				is_streaming: false,
				endpoint_handler: Arc::new(ChatCompletions),
				span: tracing::Span::none(),
				metrics: crate::metrics::RequestMetrics::default(),
				attempt_count: 0,
			},
		);
		let mut filter = UpstreamFilter::new(sample_config(), registry);
		let mut attributes = std::collections::HashMap::new();
		attributes.insert(BACKEND_NAME_ATTRIBUTE.to_string(), "openai-primary".to_string());
		filter
			.handle(Phase::RequestHeaders {
				headers: headers(&[(REQUEST_ID_HEADER, "req-1")]),
				end_of_stream: true,
				attributes,
			})
			.await
			.unwrap();

		let header_resp = filter
			.handle(Phase::ResponseHeaders {
				headers: headers(&[(":status", "200"), ("content-encoding", "gzip")]),
				end_of_stream: false,
			})
			.await
			.unwrap();
		let mutation = header_resp.header_mutation.expect("header mutation present");
		assert!(mutation.remove.iter().any(|n| n.eq_ignore_ascii_case("content-encoding")));
		assert!(!mutation.set.iter().any(|h| h.name.eq_ignore_ascii_case("content-encoding")));

		let plain = br#"{"id":"1","model":"m","object":"chat.completion","created":1,"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#;
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(plain).unwrap();
		let compressed = encoder.finish().unwrap();

		let body_resp = filter
			.handle(Phase::ResponseBody {
				body: Bytes::from(compressed),
				end_of_stream: true,
			})
			.await
			.unwrap();
		let Some(BodyMutation::Replace(out)) = body_resp.body_mutation else {
			panic!("expected a replaced body");
		};
		assert_eq!(&out[..], &plain[..]);
	}

	#[tokio::test]
	async fn missing_backend_attribute_is_a_protocol_violation() {
		let registry = RequestRegistry::new();
		let mut filter = UpstreamFilter::new(sample_config(), registry);
		let err = filter
			.handle(Phase::RequestHeaders {
				headers: headers(&[(REQUEST_ID_HEADER, "req-1")]),
				end_of_stream: true,
				attributes: Default::default(),
			})
			.await
			.unwrap_err();
		assert!(matches!(err, ProcessorError::ProtocolViolation(_)));
	}
}
